use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde_json::Value;
use tokio::process::Command;

use crate::error::Result;

/// How operation processes are started.
///
/// Every run is `<program> <args…> <command> <parameters-json>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl WorkerLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-execute the running binary with a leading `subcommand`.
    pub fn current_exe(subcommand: &str) -> Result<Self> {
        let program = std::env::current_exe()?;
        Ok(Self::new(program, vec![subcommand.to_string()]))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn command(&self, name: &str, parameters: &Value) -> Result<Command> {
        let parameters = serde_json::to_string(parameters)?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(name)
            .arg(parameters)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}
