use std::path::{Component, Path, PathBuf};

use crate::error::WatchError;

/// Validate a client-supplied directory path and turn it into the registry key.
///
/// Equivalent spellings (`/a/./b/`, `/a/c/../b`) map to the same key. The
/// filesystem is not consulted, so symlinks are not resolved.
pub fn canonical_key(raw: &str) -> Result<PathBuf, WatchError> {
    let path = Path::new(raw);
    if !path.is_absolute() {
        return Err(WatchError::Validation(raw.to_string()));
    }
    Ok(normalize(path))
}

fn normalize(path: &Path) -> PathBuf {
    let mut anchor = PathBuf::new();
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => anchor.push(normalize_prefix(prefix.as_os_str())),
            Component::RootDir => anchor.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop();
            }
            Component::Normal(segment) => parts.push(segment),
        }
    }

    let mut normalized = anchor;
    for part in parts {
        normalized.push(part);
    }
    normalized
}

/// Drive letters are upper-cased so `c:\` and `C:\` share a key.
fn normalize_prefix(prefix: &std::ffi::OsStr) -> String {
    let text = prefix.to_string_lossy();
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), Some(':')) if letter.is_ascii_alphabetic() => {
            format!("{}{}", letter.to_ascii_uppercase(), &text[1..])
        }
        _ => text.into_owned(),
    }
}

/// The synthetic parent entry is omitted for filesystem roots.
pub fn parent_of(key: &Path) -> Option<&Path> {
    key.parent()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_relative_paths() {
        let err = canonical_key("tmp/a").unwrap_err();
        assert!(matches!(err, WatchError::Validation(ref raw) if raw == "tmp/a"));
        assert!(canonical_key("").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn collapses_dots_and_trailing_separators() {
        assert_eq!(canonical_key("/tmp/./a/").unwrap(), PathBuf::from("/tmp/a"));
        assert_eq!(canonical_key("/tmp/b/../a").unwrap(), PathBuf::from("/tmp/a"));
        assert_eq!(canonical_key("//tmp//a").unwrap(), PathBuf::from("/tmp/a"));
    }

    #[cfg(unix)]
    #[test]
    fn parent_segments_stop_at_root() {
        assert_eq!(canonical_key("/../..").unwrap(), PathBuf::from("/"));
        assert_eq!(canonical_key("/tmp/../../etc").unwrap(), PathBuf::from("/etc"));
    }

    #[cfg(unix)]
    #[test]
    fn root_has_no_parent() {
        let root = canonical_key("/").unwrap();
        assert!(parent_of(&root).is_none());
        assert_eq!(parent_of(Path::new("/tmp")), Some(Path::new("/")));
    }

    #[test]
    fn drive_letters_are_upper_cased() {
        assert_eq!(normalize_prefix(std::ffi::OsStr::new("c:")), "C:");
        assert_eq!(normalize_prefix(std::ffi::OsStr::new(r"\\server\share")), r"\\server\share");
    }
}
