//! The `worker` subcommand: runs exactly one operation and exits.
//!
//! Invoked as `wayfarer-server worker <command> <parameters-json>`. The
//! result is one JSON line on stdout. Filesystem failures are reported in
//! band with exit code 0; an unknown command, unparsable parameters or any
//! other failure exits with code 1 and nothing on stdout.

use serde_json::Value;
use thiserror::Error;
use wayfarer_core::{CommandResult, StaticCatalogue};

pub mod commands;

pub use commands::WorkerCommand;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("invalid parameters: {0}")]
    InvalidParameters(#[source] serde_json::Error),
}

/// The names the hub may hand to this worker.
pub fn catalogue() -> StaticCatalogue {
    StaticCatalogue::new(WorkerCommand::ALL.map(WorkerCommand::name))
}

/// Parse and run one operation.
pub async fn run(command: &str, raw_parameters: &str) -> Result<CommandResult, WorkerError> {
    let command = WorkerCommand::from_name(command)
        .ok_or_else(|| WorkerError::UnknownCommand(command.to_string()))?;
    let parameters: Value =
        serde_json::from_str(raw_parameters).map_err(WorkerError::InvalidParameters)?;
    command.execute(parameters).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use wayfarer_core::{CommandCatalogue, CommandStatus};

    #[test]
    fn catalogue_lists_every_command() {
        let catalogue = catalogue();
        for command in WorkerCommand::ALL {
            assert!(catalogue.contains(command.name()));
        }
        assert!(!catalogue.contains("watch"));
        assert!(!catalogue.contains("exec"));
    }

    #[tokio::test]
    async fn unknown_command_and_bad_json_fail() {
        assert!(matches!(
            run("zip", "{}").await,
            Err(WorkerError::UnknownCommand(name)) if name == "zip"
        ));
        assert!(matches!(
            run("mkdir", "{not json").await,
            Err(WorkerError::InvalidParameters(_))
        ));
    }

    #[tokio::test]
    async fn mimetype_runs_end_to_end() {
        let result = run("mimetype", r#"{"sourcePath":"/a/b.json"}"#).await.unwrap();
        assert_eq!(result.status, CommandStatus::Finish);
        assert_eq!(result.fields["mime"], "application/json");
    }
}
