//! The single task that owns every registry.
//!
//! Sessions talk to the hub through a cloneable [`HubHandle`]. The loop
//! multiplexes session commands, watcher signals and scan results, process
//! exits and debounce expiries, so no registry is ever shared or locked.
//! Dropping the last handle ends the loop, aborting every run and dropping
//! every OS watch.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::catalogue::CommandCatalogue;
use crate::config::HubConfig;
use crate::error::{CoreError, Result};
use crate::fs_watch::{Registration, SubscriptionInfo, WatchEvent, WatchMultiplexer, watch_reply};
use crate::message::{
    ABORT_COMMAND, CommandResult, InboundRequest, OutboundMessage, UNWATCH_COMMAND, WATCH_COMMAND,
    WatchParameters,
};
use crate::process::{ProcessSupervisor, RunExit};
use crate::session::{Session, SessionId};

/// Point-in-time view of both registries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubSnapshot {
    /// Live subscriptions, sorted by path.
    pub subscriptions: Vec<SubscriptionInfo>,
    /// Request ids with a live process, sorted.
    pub active_runs: Vec<String>,
}

#[derive(Debug)]
enum HubCommand {
    Dispatch {
        session: Session,
        request: InboundRequest,
    },
    Disconnect {
        session: SessionId,
    },
    Inspect {
        reply: oneshot::Sender<HubSnapshot>,
    },
}

/// Cloneable entry point into a running [`Hub`].
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    /// Queue one request from `session`. Replies arrive on the session channel.
    pub fn dispatch(&self, session: &Session, request: InboundRequest) -> Result<()> {
        self.commands
            .send(HubCommand::Dispatch {
                session: session.clone(),
                request,
            })
            .map_err(|_| CoreError::HubClosed)
    }

    /// Abort the session's runs, then drop it from every subscription.
    pub fn disconnect(&self, session: SessionId) -> Result<()> {
        self.commands
            .send(HubCommand::Disconnect { session })
            .map_err(|_| CoreError::HubClosed)
    }

    /// Snapshot both registries as seen by the loop.
    pub async fn inspect(&self) -> Result<HubSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(HubCommand::Inspect { reply })
            .map_err(|_| CoreError::HubClosed)?;
        rx.await.map_err(|_| CoreError::HubClosed)
    }

    /// Whether the hub loop has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// Owner of the watch multiplexer and the process supervisor.
pub struct Hub {
    commands: mpsc::UnboundedReceiver<HubCommand>,
    watch_events: mpsc::UnboundedReceiver<WatchEvent>,
    exits: mpsc::UnboundedReceiver<RunExit>,
    multiplexer: WatchMultiplexer,
    supervisor: ProcessSupervisor,
    catalogue: Arc<dyn CommandCatalogue>,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("subscriptions", &self.multiplexer.len())
            .field("runs", &self.supervisor.len())
            .field("catalogue", &self.catalogue)
            .finish()
    }
}

impl Hub {
    /// Build a hub and the first handle to it. Nothing runs until [`Hub::run`].
    pub fn new(config: HubConfig, catalogue: Arc<dyn CommandCatalogue>) -> (Self, HubHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = mpsc::unbounded_channel();

        let hub = Self {
            commands: command_rx,
            watch_events: event_rx,
            exits: exit_rx,
            multiplexer: WatchMultiplexer::new(&config.watch, event_tx),
            supervisor: ProcessSupervisor::new(config.launcher, exit_tx),
            catalogue,
        };
        (
            hub,
            HubHandle {
                commands: command_tx,
            },
        )
    }

    /// Build a hub and run it on the current runtime.
    pub fn spawn(
        config: HubConfig,
        catalogue: Arc<dyn CommandCatalogue>,
    ) -> (HubHandle, JoinHandle<()>) {
        let (hub, handle) = Self::new(config, catalogue);
        let task = tokio::spawn(hub.run());
        (handle, task)
    }

    /// Serve until every [`HubHandle`] is dropped.
    pub async fn run(mut self) {
        info!(commands = ?self.catalogue.names(), "hub started");

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },

                Some(event) = self.watch_events.recv() => {
                    self.multiplexer.handle_event(event);
                }

                Some(exit) = self.exits.recv() => {
                    self.supervisor.handle_exit(exit);
                }

                Some(path) = self.multiplexer.next_due() => {
                    debug!(path = %path.display(), "debounce window elapsed");
                    self.multiplexer.rescan(path);
                }
            }
        }

        self.supervisor.shutdown();
        self.multiplexer.shutdown();
        info!("hub stopped");
    }

    fn handle_command(&mut self, command: HubCommand) {
        match command {
            HubCommand::Dispatch { session, request } => self.dispatch(session, request),
            HubCommand::Disconnect { session } => {
                debug!(session = %session, "session disconnected");
                self.supervisor.disconnect(session);
                self.multiplexer.close(session);
            }
            HubCommand::Inspect { reply } => {
                let snapshot = HubSnapshot {
                    subscriptions: self.multiplexer.subscriptions(),
                    active_runs: self.supervisor.active_runs(),
                };
                let _ = reply.send(snapshot);
            }
        }
    }

    fn dispatch(&mut self, session: Session, request: InboundRequest) {
        let InboundRequest {
            command,
            request_id,
            parameters,
        } = request;

        match command.as_str() {
            WATCH_COMMAND => {
                let result = match directory_path(&parameters) {
                    Ok(path) => match self.multiplexer.register(&session, &request_id, &path) {
                        Ok(Registration::Joined(key)) => Some(watch_reply(&key)),
                        // The access check replies when it lands.
                        Ok(Registration::Pending(_)) => None,
                        Err(err) => Some(CommandResult::error(err.to_string())),
                    },
                    Err(message) => Some(CommandResult::error(message)),
                };
                if let Some(result) = result {
                    session.send(OutboundMessage::command(request_id, result));
                }
            }
            UNWATCH_COMMAND => {
                let result = match directory_path(&parameters) {
                    Ok(path) => match self.multiplexer.unregister(session.id(), &path) {
                        Ok(()) => CommandResult::finish(),
                        Err(err) => CommandResult::error(err.to_string()),
                    },
                    Err(message) => CommandResult::error(message),
                };
                session.send(OutboundMessage::command(request_id, result));
            }
            ABORT_COMMAND => self.supervisor.abort(&request_id),
            name if self.catalogue.contains(name) => {
                self.supervisor.register(&session, name, &request_id, parameters);
            }
            name => {
                debug!(command = %name, request_id = %request_id, "ignoring unknown command");
            }
        }
    }
}

fn directory_path(parameters: &Value) -> std::result::Result<String, String> {
    serde_json::from_value::<WatchParameters>(parameters.clone())
        .map(|parameters| parameters.directory_path)
        .map_err(|err| format!("Invalid parameters: {err}."))
}
