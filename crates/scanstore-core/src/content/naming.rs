//! Filesystem-safe naming for stored assets and their thumbnail siblings.

use crate::config::{AssetCategory, StoreConfig, ThumbnailConfig};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::LazyLock;

/// Maximum length, in characters, of a sanitized base name.
const MAX_NAME_LENGTH: usize = 96;

/// Characters reserved on NTFS (and `/` everywhere) that must be removed.
const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Regex for runs of underscores.
static CONSECUTIVE_UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_{2,}").expect("valid regex"));

/// Last timestamp handed out by [`next_timestamp_millis`].
static LAST_TIMESTAMP: AtomicI64 = AtomicI64::new(0);

/// Sanitize a user-supplied name for use as a file base name.
///
/// Case is preserved. Spaces become underscores, reserved and control
/// characters are dropped, and leading dots are trimmed so a name can never
/// become hidden or climb out of its folder.
///
/// # Examples
///
/// ```
/// use scanstore_core::content::sanitize_base_name;
///
/// assert_eq!(sanitize_base_name("Chair Scan"), "Chair_Scan");
/// assert_eq!(sanitize_base_name("../etc/passwd"), "etcpasswd");
/// ```
pub fn sanitize_base_name(name: &str) -> String {
    let mut result: String = name
        .trim()
        .chars()
        .filter(|c| !RESERVED_CHARS.contains(c) && !c.is_control())
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();

    result = CONSECUTIVE_UNDERSCORES.replace_all(&result, "_").to_string();
    result = result.trim_matches(|c| c == '_' || c == '.').to_string();

    if result.chars().count() > MAX_NAME_LENGTH {
        result = result.chars().take(MAX_NAME_LENGTH).collect();
        result = result.trim_end_matches(|c| c == '_' || c == '.').to_string();
    }

    if result.is_empty() {
        result = StoreConfig::FALLBACK_BASE_NAME.to_string();
    }

    result
}

/// Strip a trailing `.ext` from `name` if it matches `ext` case-insensitively.
pub fn strip_extension<'a>(name: &'a str, ext: &str) -> &'a str {
    let suffix_len = ext.len() + 1;
    if name.len() > suffix_len && name.is_char_boundary(name.len() - suffix_len) {
        let (stem, suffix) = name.split_at(name.len() - suffix_len);
        if suffix.starts_with('.') && suffix[1..].eq_ignore_ascii_case(ext) {
            return stem;
        }
    }
    name
}

/// Milliseconds since the epoch, strictly increasing within this process.
///
/// Two saves started in the same millisecond still get distinct suffixes.
pub fn next_timestamp_millis() -> i64 {
    let now = chrono::Utc::now().timestamp_millis();
    let mut last = LAST_TIMESTAMP.load(Ordering::Relaxed);
    loop {
        let next = if now > last { now } else { last + 1 };
        match LAST_TIMESTAMP.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Build a stored asset filename: `<category>_<name>_<timestamp>.<ext>`.
pub fn asset_filename(
    category: AssetCategory,
    desired_name: &str,
    timestamp_millis: i64,
    ext: &str,
) -> String {
    format!(
        "{}_{}_{}.{}",
        category.as_str(),
        sanitize_base_name(desired_name),
        timestamp_millis,
        ext.to_lowercase()
    )
}

/// Path of the thumbnail sibling for an asset: `<stem>_thumb.png` in the
/// same folder.
pub fn thumbnail_path(asset_path: &Path) -> PathBuf {
    let stem = asset_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    asset_path.with_file_name(format!(
        "{}{}.{}",
        stem,
        ThumbnailConfig::SUFFIX,
        ThumbnailConfig::EXTENSION
    ))
}

/// For a thumbnail sibling, the asset stem it belongs to.
pub fn thumbnail_owner_stem(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if !ext.eq_ignore_ascii_case(ThumbnailConfig::EXTENSION) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    stem.strip_suffix(ThumbnailConfig::SUFFIX)
        .filter(|owner| !owner.is_empty())
        .map(String::from)
}
