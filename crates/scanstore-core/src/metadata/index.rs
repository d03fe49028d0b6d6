//! JSON-backed metadata index keyed by asset filename.
//!
//! The index is loaded lazily and kept in memory as an immutable snapshot.
//! All mutations go through one dedicated writer thread, which performs the
//! whole load, mutate, write, publish sequence per request, so concurrent
//! callers can never interleave read-modify-write cycles or tear the file.
//! Readers only clone the current `Arc` snapshot.

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::metadata::atomic::{atomic_read_json, atomic_write_json};
use crate::metadata::types::{AssetMetadataRecord, IndexDocument};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// A single change requested of the writer.
#[derive(Debug)]
enum Mutation {
    Replace(IndexDocument),
    Upsert {
        filename: String,
        record: AssetMetadataRecord,
    },
    Remove {
        filename: String,
    },
    RenameKey {
        from: String,
        to: String,
    },
    Retain {
        existing: HashSet<String>,
    },
}

/// What a mutation did to the document.
#[derive(Debug, Default)]
struct Applied {
    changed: bool,
    removed: Vec<String>,
}

impl Mutation {
    fn apply(self, doc: &mut IndexDocument) -> Applied {
        match self {
            Mutation::Replace(replacement) => {
                *doc = replacement;
                Applied {
                    changed: true,
                    removed: Vec::new(),
                }
            }
            Mutation::Upsert { filename, record } => {
                doc.records.insert(filename, record);
                Applied {
                    changed: true,
                    removed: Vec::new(),
                }
            }
            Mutation::Remove { filename } => match doc.records.remove(&filename) {
                Some(_) => Applied {
                    changed: true,
                    removed: vec![filename],
                },
                None => Applied::default(),
            },
            Mutation::RenameKey { from, to } => {
                if from == to {
                    return Applied::default();
                }
                match doc.records.remove(&from) {
                    Some(record) => {
                        doc.records.insert(to, record);
                        Applied {
                            changed: true,
                            removed: vec![from],
                        }
                    }
                    None => Applied::default(),
                }
            }
            Mutation::Retain { existing } => {
                let removed: Vec<String> = doc
                    .records
                    .keys()
                    .filter(|key| !existing.contains(*key))
                    .cloned()
                    .collect();
                for key in &removed {
                    doc.records.remove(key);
                }
                Applied {
                    changed: !removed.is_empty(),
                    removed,
                }
            }
        }
    }
}

struct WriteRequest {
    mutation: Mutation,
    reply: oneshot::Sender<Result<Applied>>,
}

/// State shared between the handle and the writer thread.
struct IndexState {
    path: PathBuf,
    cached: RwLock<Option<Arc<IndexDocument>>>,
    /// Held while reading from disk and while publishing, so a slow disk
    /// read can never overwrite a newer published snapshot.
    load_lock: Mutex<()>,
}

impl IndexState {
    fn cached(&self) -> Option<Arc<IndexDocument>> {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn load_blocking(&self) -> Arc<IndexDocument> {
        if let Some(doc) = self.cached() {
            return doc;
        }

        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(doc) = self.cached() {
            return doc;
        }

        let doc = Arc::new(self.read_or_recover());
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&doc));
        doc
    }

    fn read_or_recover(&self) -> IndexDocument {
        match atomic_read_json::<IndexDocument>(&self.path) {
            Ok(Some(doc)) => {
                if doc.version != StoreConfig::INDEX_VERSION {
                    warn!(
                        "Metadata index {} has version {}, expected {}",
                        self.path.display(),
                        doc.version,
                        StoreConfig::INDEX_VERSION
                    );
                }
                debug!(
                    "Loaded metadata index {} ({} records)",
                    self.path.display(),
                    doc.len()
                );
                doc
            }
            Ok(None) => {
                debug!("No metadata index at {}, starting empty", self.path.display());
                IndexDocument::default()
            }
            Err(e) => {
                let corrupt = StoreError::CorruptIndex {
                    path: self.path.clone(),
                    message: e.to_string(),
                };
                warn!("{}", corrupt);
                match quarantine(&self.path) {
                    Ok(backup) => warn!(
                        "Preserved unreadable index as {}, continuing with an empty index",
                        backup.display()
                    ),
                    Err(e) => warn!("Failed to preserve unreadable index: {}", e),
                }
                IndexDocument::default()
            }
        }
    }

    fn publish(&self, doc: IndexDocument) {
        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(doc));
    }

    fn invalidate(&self) {
        let _guard = self.load_lock.lock().unwrap_or_else(PoisonError::into_inner);
        *self.cached.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn apply(&self, mutation: Mutation) -> Result<Applied> {
        let current = self.load_blocking();
        let mut doc = (*current).clone();
        let applied = mutation.apply(&mut doc);

        if applied.changed {
            atomic_write_json(&self.path, &doc)?;
            self.publish(doc);
        }

        Ok(applied)
    }
}

/// Copy an unreadable index aside as `<index>.<timestamp>.backup`.
fn quarantine(path: &Path) -> Result<PathBuf> {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%3f");
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| StoreConfig::INDEX_FILENAME.to_string());
    let backup = path.with_file_name(format!(
        "{}.{}.{}",
        file_name,
        stamp,
        StoreConfig::BACKUP_EXTENSION
    ));

    std::fs::copy(path, &backup).map_err(|e| StoreError::io_with_path(e, &backup))?;
    Ok(backup)
}

fn run_writer(state: Arc<IndexState>, requests: mpsc::Receiver<WriteRequest>) {
    for request in requests {
        let result = state.apply(request.mutation);
        if let Err(e) = &result {
            warn!("Metadata index write failed: {}", e);
        }
        // The caller may have stopped waiting
        let _ = request.reply.send(result);
    }
    debug!("Metadata writer for {} stopped", state.path.display());
}

/// Durable filename → record map with a serialized writer.
pub struct MetadataIndex {
    state: Arc<IndexState>,
    writer: mpsc::Sender<WriteRequest>,
}

impl MetadataIndex {
    /// Open the index stored at `path` and start its writer thread.
    ///
    /// Nothing is read from disk until the first access.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let state = Arc::new(IndexState {
            path: path.into(),
            cached: RwLock::new(None),
            load_lock: Mutex::new(()),
        });

        let (writer, requests) = mpsc::channel();
        let worker_state = Arc::clone(&state);
        thread::Builder::new()
            .name("metadata-writer".to_string())
            .spawn(move || run_writer(worker_state, requests))
            .map_err(|e| StoreError::Io {
                message: "Failed to start metadata writer".to_string(),
                path: Some(state.path.clone()),
                source: Some(e),
            })?;

        Ok(Self { state, writer })
    }

    /// Path of the backing JSON file.
    pub fn path(&self) -> &Path {
        &self.state.path
    }

    /// Current snapshot of the index, reading disk only on the first call.
    ///
    /// An unreadable file is preserved as a backup and replaced by an empty
    /// index, so this never fails.
    pub async fn load(&self) -> Arc<IndexDocument> {
        if let Some(doc) = self.state.cached() {
            return doc;
        }

        let state = Arc::clone(&self.state);
        match tokio::task::spawn_blocking(move || state.load_blocking()).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Metadata index load task failed: {}", e);
                Arc::new(IndexDocument::default())
            }
        }
    }

    /// Whether a snapshot is currently held in memory.
    pub fn is_loaded(&self) -> bool {
        self.state.cached().is_some()
    }

    /// Drop the in-memory snapshot; the next access re-reads disk.
    pub fn invalidate(&self) {
        self.state.invalidate();
    }

    pub async fn get(&self, filename: &str) -> Option<AssetMetadataRecord> {
        self.load().await.get(filename).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.load().await.records.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.load().await.len()
    }

    /// Replace the whole document.
    pub async fn save(&self, doc: IndexDocument) -> Result<()> {
        self.submit(Mutation::Replace(doc)).await.map(|_| ())
    }

    /// Insert or overwrite the record for `filename`.
    pub async fn upsert(&self, filename: &str, record: AssetMetadataRecord) -> Result<()> {
        self.submit(Mutation::Upsert {
            filename: filename.to_string(),
            record,
        })
        .await
        .map(|_| ())
    }

    /// Remove the record for `filename`. Returns whether one existed.
    pub async fn remove(&self, filename: &str) -> Result<bool> {
        let applied = self
            .submit(Mutation::Remove {
                filename: filename.to_string(),
            })
            .await?;
        Ok(applied.changed)
    }

    /// Move the record under `from` to `to`, overwriting any record at `to`.
    ///
    /// Returns `false` without writing when `from` has no record.
    pub async fn rename_key(&self, from: &str, to: &str) -> Result<bool> {
        let applied = self
            .submit(Mutation::RenameKey {
                from: from.to_string(),
                to: to.to_string(),
            })
            .await?;
        Ok(applied.changed)
    }

    /// Drop every record whose key is not in `existing`.
    ///
    /// Returns the removed keys; the file is only rewritten if any were.
    pub async fn reconcile(&self, existing: &HashSet<String>) -> Result<Vec<String>> {
        let applied = self
            .submit(Mutation::Retain {
                existing: existing.clone(),
            })
            .await?;
        if !applied.removed.is_empty() {
            info!(
                "Removed {} orphaned metadata records",
                applied.removed.len()
            );
        }
        Ok(applied.removed)
    }

    async fn submit(&self, mutation: Mutation) -> Result<Applied> {
        let (reply, response) = oneshot::channel();
        self.writer
            .send(WriteRequest { mutation, reply })
            .map_err(|_| StoreError::Other("Metadata writer is not running".to_string()))?;

        response
            .await
            .map_err(|_| StoreError::Other("Metadata writer dropped the request".to_string()))?
    }
}

impl std::fmt::Debug for MetadataIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataIndex")
            .field("path", &self.state.path)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
