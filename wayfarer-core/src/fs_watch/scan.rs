use std::io;
use std::path::Path;

use futures::future::join_all;

use crate::entry::{Entry, EntryOptions};
use crate::fs_watch::path::parent_of;

/// List the direct children of `directory`.
///
/// The synthetic parent entry comes first unless `directory` is a root.
/// Only a failure to read the directory itself is an error; children that
/// cannot be stat'ed come back as `unknown` entries.
pub async fn read_directory(directory: &Path, options: EntryOptions) -> io::Result<Vec<Entry>> {
    let mut reader = tokio::fs::read_dir(directory).await?;
    let mut children = Vec::new();
    while let Some(child) = reader.next_entry().await? {
        children.push(child.path());
    }

    let mut entries = Vec::with_capacity(children.len() + 1);
    if let Some(parent) = parent_of(directory) {
        entries.push(Entry::read(parent, true, options).await);
    }

    let listed = join_all(
        children
            .iter()
            .map(|child| Entry::read(child, false, options)),
    )
    .await;
    entries.extend(listed);

    Ok(entries)
}
