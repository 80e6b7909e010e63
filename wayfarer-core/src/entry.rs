//! Directory listing entries.

use std::fs::Metadata;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;
use unicode_normalization::UnicodeNormalization;

/// Kind of filesystem item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Directory,
    File,
    Link,
    Unknown,
}

/// One filesystem item as surfaced to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(rename = "type")]
    pub kind: EntryType,
    pub mime: String,
    pub path: String,
    pub dir: String,
    pub name: String,
    pub ext: String,
    pub size: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub birthtime: i64,
    /// Set only on the synthetic entry standing for the watched directory's
    /// parent.
    pub parent: bool,
}

/// Knobs that affect how entries are built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryOptions {
    /// Resolve `mime` from the file extension.
    pub sniff_mime: bool,
}

impl Entry {
    /// Stat `path` and build its entry.
    ///
    /// Never fails: if the item cannot be stat'ed (it vanished between listing
    /// and stating, or it is a dangling link) the entry is `unknown` with all
    /// numeric fields zeroed.
    pub async fn read(path: &Path, parent: bool, options: EntryOptions) -> Self {
        let mut entry = Self::unresolved(path, parent);

        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(err) => {
                trace!(path = %path.display(), error = %err, "entry stat failed");
                return entry;
            }
        };

        let is_link = tokio::fs::symlink_metadata(path)
            .await
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);

        entry.kind = if is_link {
            EntryType::Link
        } else if metadata.is_dir() {
            EntryType::Directory
        } else if metadata.is_file() {
            EntryType::File
        } else {
            EntryType::Unknown
        };

        if metadata.is_dir() {
            entry.name.push_str(&entry.ext);
            entry.ext.clear();
        } else if options.sniff_mime {
            entry.mime = mime_guess::from_path(path)
                .first()
                .map(|mime| mime.essence_str().to_string())
                .unwrap_or_default();
        }

        entry.size = metadata.len();
        entry.atime = epoch_millis(metadata.accessed());
        entry.mtime = epoch_millis(metadata.modified());
        entry.ctime = change_millis(&metadata);
        entry.birthtime = epoch_millis(metadata.created());
        entry
    }

    /// Path-derived fields only; type `unknown`, numbers zero.
    pub fn unresolved(path: &Path, parent: bool) -> Self {
        let name = path
            .file_stem()
            .map(|stem| nfc(&stem.to_string_lossy()))
            .unwrap_or_default();
        let ext = path
            .extension()
            .map(|ext| format!(".{}", nfc(&ext.to_string_lossy())))
            .unwrap_or_default();
        let dir = path.parent().unwrap_or(path);

        Self {
            kind: EntryType::Unknown,
            mime: String::new(),
            path: nfc(&path.to_string_lossy()),
            dir: nfc(&dir.to_string_lossy()),
            name,
            ext,
            size: 0,
            atime: 0,
            mtime: 0,
            ctime: 0,
            birthtime: 0,
            parent,
        }
    }
}

fn nfc(value: &str) -> String {
    value.nfc().collect()
}

fn epoch_millis(time: io::Result<SystemTime>) -> i64 {
    time.map(|time| DateTime::<Utc>::from(time).timestamp_millis())
        .unwrap_or(0)
}

#[cfg(unix)]
fn change_millis(metadata: &Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    metadata.ctime() * 1000 + metadata.ctime_nsec() / 1_000_000
}

#[cfg(not(unix))]
fn change_millis(metadata: &Metadata) -> i64 {
    epoch_millis(metadata.modified())
}
