//! Scanstore CLI - command line front end for the local asset store.
//!
//! Thin wrapper over scanstore-core for operators and scripts. Structured
//! output (show, stats, reconcile) is printed as JSON on stdout; logs go to
//! stderr.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use scanstore_core::{AssetCategory, AssetMetadataRecord, AssetService};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "scanstore")]
#[command(about = "Local store for scanned rooms and furniture")]
struct Cli {
    /// Store root directory (defaults to <data dir>/scanstore)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy a capture into the store
    Save {
        /// Source file to import
        source: PathBuf,

        /// furniture or room
        #[arg(short, long, value_parser = parse_category)]
        category: AssetCategory,

        /// Base name for the stored file
        #[arg(short, long)]
        name: Option<String>,

        /// Annotation label (e.g. "chair", "kitchen")
        #[arg(long)]
        label: Option<String>,

        #[arg(long)]
        subtype: Option<String>,

        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// List stored assets
    List {
        /// Restrict to one category
        #[arg(short, long, value_parser = parse_category)]
        category: Option<AssetCategory>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Rename an asset, keeping its extension
    Rename { asset: PathBuf, new_name: String },

    /// Delete an asset with its thumbnail and metadata
    Delete { asset: PathBuf },

    /// Create or update the annotation of an asset
    Tag {
        asset: PathBuf,

        #[arg(long)]
        label: Option<String>,

        #[arg(long)]
        subtype: Option<String>,

        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long)]
        notes: Option<String>,
    },

    /// Print the annotation of an asset
    Show { asset: PathBuf },

    /// Print asset count and total size
    Stats {
        #[arg(short, long, value_parser = parse_category)]
        category: Option<AssetCategory>,
    },

    /// Drop metadata and thumbnails whose asset no longer exists
    Reconcile,
}

fn parse_category(value: &str) -> std::result::Result<AssetCategory, String> {
    AssetCategory::from_str(value)
        .ok_or_else(|| format!("unknown category '{}' (expected furniture or room)", value))
}

fn default_root() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("scanstore"))
        .ok_or_else(|| anyhow!("No data directory on this platform, pass --root"))
}

/// Accept either a path or a bare filename that lives in a category folder.
fn resolve_asset(root: &Path, asset: &Path) -> PathBuf {
    if asset.exists() || asset.components().count() > 1 {
        return asset.to_path_buf();
    }
    AssetCategory::ALL
        .iter()
        .map(|category| root.join(category.folder_name()).join(asset))
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| asset.to_path_buf())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let root = match cli.root {
        Some(path) => path,
        None => default_root()?,
    };
    info!("Store root: {}", root.display());

    let service = AssetService::open(&root)
        .await
        .with_context(|| format!("Failed to open store at {}", root.display()))?;

    run(&service, &root, cli.command).await
}

async fn run(service: &AssetService, root: &Path, command: Command) -> Result<()> {
    match command {
        Command::Save {
            source,
            category,
            name,
            label,
            subtype,
            tags,
        } => {
            let metadata = label.map(|label| {
                let mut record = AssetMetadataRecord::new(label).with_tags(tags);
                record.subtype = subtype;
                record
            });
            let asset = service
                .save_asset(&source, category, name.as_deref(), metadata)
                .await?;
            println!("{}", asset.path.display());
        }

        Command::List { category, json } => {
            let categories = match category {
                Some(category) => vec![category],
                None => AssetCategory::ALL.to_vec(),
            };
            let mut assets = Vec::new();
            for category in categories {
                for entry in service.list_assets(category).await? {
                    assets.push((entry.asset, entry.metadata));
                }
            }

            if json {
                let rows: Vec<_> = assets
                    .iter()
                    .map(|(asset, metadata)| {
                        serde_json::json!({ "asset": asset, "metadata": metadata })
                    })
                    .collect();
                print_json(&rows)?;
            } else {
                for (asset, metadata) in &assets {
                    println!(
                        "{:<9} {:>10}  {}  {}{}",
                        asset.category.as_str(),
                        asset.size_bytes,
                        asset
                            .created_at
                            .with_timezone(&chrono::Local)
                            .format("%Y-%m-%d %H:%M"),
                        asset.filename,
                        metadata
                            .as_ref()
                            .map(|m| format!("  [{}]", m.category))
                            .unwrap_or_default(),
                    );
                }
            }
        }

        Command::Rename { asset, new_name } => {
            let path = resolve_asset(root, &asset);
            let renamed = service.rename_asset(&path, &new_name).await?;
            println!("{}", renamed.display());
        }

        Command::Delete { asset } => {
            let path = resolve_asset(root, &asset);
            service.delete_asset(&path).await?;
            info!("Deleted {}", path.display());
        }

        Command::Tag {
            asset,
            label,
            subtype,
            tags,
            notes,
        } => {
            let path = resolve_asset(root, &asset);
            let mut record = match (service.get_metadata(&path).await, label) {
                (Some(mut existing), label) => {
                    if let Some(label) = label {
                        existing.category = label;
                    }
                    existing
                }
                (None, Some(label)) => AssetMetadataRecord::new(label),
                (None, None) => {
                    return Err(anyhow!(
                        "{} has no metadata yet, pass --label",
                        path.display()
                    ))
                }
            };
            if subtype.is_some() {
                record.subtype = subtype;
            }
            if !tags.is_empty() {
                record.tags = tags;
            }
            if notes.is_some() {
                record.notes = notes;
            }
            service.set_metadata(&path, record.clone()).await?;
            print_json(&record)?;
        }

        Command::Show { asset } => {
            let path = resolve_asset(root, &asset);
            match service.get_metadata(&path).await {
                Some(record) => print_json(&record)?,
                None => println!("null"),
            }
        }

        Command::Stats { category } => {
            let stats = match category {
                Some(category) => service.storage_stats(category).await?,
                None => service.storage_stats_all().await?,
            };
            print_json(&stats)?;
        }

        Command::Reconcile => {
            let report = service.reconcile().await?;
            if report.is_clean() {
                info!("Store is consistent");
            }
            print_json(&report)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_save() {
        let cli = Cli::try_parse_from([
            "scanstore",
            "--root",
            "/tmp/store",
            "save",
            "capture.usdz",
            "--category",
            "rooms",
            "--name",
            "Kitchen",
            "--tag",
            "draft",
            "--tag",
            "ground-floor",
        ])
        .unwrap();

        assert_eq!(cli.root, Some(PathBuf::from("/tmp/store")));
        match cli.command {
            Command::Save {
                category,
                name,
                tags,
                ..
            } => {
                assert_eq!(category, AssetCategory::Room);
                assert_eq!(name.as_deref(), Some("Kitchen"));
                assert_eq!(tags, vec!["draft", "ground-floor"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_category_rejected() {
        let result = Cli::try_parse_from(["scanstore", "stats", "--category", "garden"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_bare_filename() {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path().join("rooms");
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("room_Den_1.usdz"), b"mesh").unwrap();

        let resolved = resolve_asset(temp_dir.path(), Path::new("room_Den_1.usdz"));
        assert_eq!(resolved, folder.join("room_Den_1.usdz"));

        let missing = resolve_asset(temp_dir.path(), Path::new("nope.usdz"));
        assert_eq!(missing, PathBuf::from("nope.usdz"));
    }
}
