//! One child process per operation.
//!
//! The supervisor keeps the request id → [`CommandRun`] registry. Each run is
//! watched by its own task which forwards stdout results straight to the
//! owning session and posts a [`RunExit`] when the process is gone; the
//! terminal `error`/`abort` message is emitted here, after the run has been
//! removed.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

mod launcher;
mod run;

pub use launcher::WorkerLauncher;
pub use run::{CommandRun, RunExit, RunId, RunOutcome, classify_exit};

use crate::message::{CommandResult, OutboundMessage, UNEXPECTED_ERROR};
use crate::session::{Session, SessionId};

/// Registry of live operation processes keyed by request id.
#[derive(Debug)]
pub struct ProcessSupervisor {
    launcher: WorkerLauncher,
    runs: HashMap<String, CommandRun>,
    exits: mpsc::UnboundedSender<RunExit>,
    next_id: u64,
}

impl ProcessSupervisor {
    pub fn new(launcher: WorkerLauncher, exits: mpsc::UnboundedSender<RunExit>) -> Self {
        Self {
            launcher,
            runs: HashMap::new(),
            exits,
            next_id: 0,
        }
    }

    /// Start `command` for `session` under `request_id`.
    ///
    /// Nothing is returned; every outcome reaches the session as a `command`
    /// message for `request_id`. A request whose id is already running is
    /// dropped without a reply.
    pub fn register(
        &mut self,
        session: &Session,
        command: &str,
        request_id: &str,
        parameters: Value,
    ) {
        // At most one terminal result per request id.
        if self.runs.contains_key(request_id) {
            warn!(
                request_id = %request_id,
                command = %command,
                "request id already running, dropping request"
            );
            return;
        }

        let mut cmd = match self.launcher.command(command, &parameters) {
            Ok(cmd) => cmd,
            Err(err) => {
                warn!(
                    request_id = %request_id,
                    command = %command,
                    error = %err,
                    "could not build operation command"
                );
                session.send(OutboundMessage::command(
                    request_id,
                    CommandResult::error(UNEXPECTED_ERROR),
                ));
                return;
            }
        };

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(
                    request_id = %request_id,
                    command = %command,
                    program = %self.launcher.program().display(),
                    error = %err,
                    "failed to spawn operation process"
                );
                session.send(OutboundMessage::command(
                    request_id,
                    CommandResult::error(UNEXPECTED_ERROR),
                ));
                return;
            }
        };

        self.next_id += 1;
        let id = RunId(self.next_id);
        let entry = CommandRun::new(id, session.clone(), command.to_string());
        info!(request_id = %request_id, command = %command, pid = ?child.id(), "operation started");

        tokio::spawn(run::supervise(
            child,
            request_id.to_string(),
            id,
            session.clone(),
            entry.cancel_token(),
            self.exits.clone(),
        ));
        self.runs.insert(request_id.to_string(), entry);
    }

    /// Request termination of `request_id`. Unknown ids are ignored.
    pub fn abort(&mut self, request_id: &str) {
        match self.runs.get(request_id) {
            Some(run) => {
                debug!(request_id = %request_id, command = %run.command(), "abort requested");
                run.abort();
            }
            None => debug!(request_id = %request_id, "abort for unknown request id"),
        }
    }

    /// Abort every run owned by `session`.
    pub fn disconnect(&mut self, session: SessionId) {
        for (request_id, run) in &self.runs {
            if run.session().id() == session {
                debug!(
                    request_id = %request_id,
                    session = %session,
                    "aborting run of closed session"
                );
                run.abort();
            }
        }
    }

    /// Remove a finished run and emit its terminal message.
    pub fn handle_exit(&mut self, exit: RunExit) {
        let RunExit {
            request_id,
            run,
            outcome,
        } = exit;

        let current = self
            .runs
            .get(&request_id)
            .is_some_and(|entry| entry.id() == run);
        if !current {
            debug!(request_id = %request_id, "exit for a run that is no longer registered");
            return;
        }
        let Some(entry) = self.runs.remove(&request_id) else {
            return;
        };

        match outcome {
            RunOutcome::Success => {
                info!(
                    request_id = %request_id,
                    command = %entry.command(),
                    elapsed = ?entry.elapsed(),
                    "operation finished"
                );
            }
            RunOutcome::Failure(diagnostic) => {
                warn!(
                    request_id = %request_id,
                    command = %entry.command(),
                    diagnostic = %diagnostic,
                    "operation failed"
                );
                entry.session().send(OutboundMessage::command(
                    &request_id,
                    CommandResult::error(UNEXPECTED_ERROR),
                ));
            }
            RunOutcome::Killed => {
                info!(request_id = %request_id, command = %entry.command(), "operation aborted");
                entry
                    .session()
                    .send(OutboundMessage::command(&request_id, CommandResult::abort()));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn active_runs(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.runs.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Abort every live run.
    pub fn shutdown(&mut self) {
        for run in self.runs.values() {
            run.abort();
        }
    }
}
