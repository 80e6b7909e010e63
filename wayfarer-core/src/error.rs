use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the directory watch multiplexer.
///
/// `Validation` and `Access` are returned synchronously to the registering
/// session. `Scan` and `PathInvalidated` tear the whole subscription down and
/// are broadcast to every subscriber.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("{0} is not an absolute path.")]
    Validation(String),

    #[error("{path}: {source}")]
    Access {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} not available.", .0.display())]
    PathInvalidated(PathBuf),
}

/// Errors raised while wiring up the core itself.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Hub is no longer running")]
    HubClosed,
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_matches_wire_text() {
        let err = WatchError::Validation("relative/dir".into());
        assert_eq!(err.to_string(), "relative/dir is not an absolute path.");
    }

    #[test]
    fn invalidated_message_names_the_path() {
        let err = WatchError::PathInvalidated(PathBuf::from("/tmp/gone"));
        assert_eq!(err.to_string(), "/tmp/gone not available.");
    }
}
