//! Shared harness for hub integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use wayfarer_core::{
    Entry, Hub, HubConfig, HubHandle, InboundRequest, OutboundMessage, Session, StaticCatalogue,
    WorkerLauncher,
};

/// How long to wait for a message that must arrive.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Stand-in worker: `$1` is the command name, `$2` the JSON parameters.
pub const WORKER_SCRIPT: &str = r#"
case "$1" in
  echo) printf '%s\n' '{"status":"finish","echo":true}' ;;
  emit) printf 'not json\n{"status":"finish","step":1}\n' ;;
  params) printf '{"status":"finish","params":%s}\n' "$2" ;;
  fail) echo "worker exploded" >&2; exit 3 ;;
  sleep) exec sleep 5 ;;
  *) exit 1 ;;
esac
"#;

pub const WORKER_COMMANDS: [&str; 6] = ["echo", "emit", "params", "fail", "sleep", "unlisted"];

pub fn script_launcher() -> WorkerLauncher {
    WorkerLauncher::new(
        "sh",
        vec!["-c".into(), WORKER_SCRIPT.into(), "worker".into()],
    )
}

pub struct TestHub {
    pub handle: HubHandle,
    task: JoinHandle<()>,
}

impl TestHub {
    pub fn start() -> Self {
        Self::with_launcher(script_launcher())
    }

    pub fn with_launcher(launcher: WorkerLauncher) -> Self {
        // "unlisted" is handled by the script's fallback but kept out of the catalogue.
        let catalogue =
            StaticCatalogue::new(WORKER_COMMANDS.into_iter().filter(|c| *c != "unlisted"));
        let (handle, task) = Hub::spawn(HubConfig::new(launcher), Arc::new(catalogue));
        Self { handle, task }
    }

    pub fn client(&self) -> Client {
        let (session, rx) = Session::channel();
        Client {
            handle: self.handle.clone(),
            session,
            rx,
        }
    }

    /// Clients keep handles alive, so the loop is stopped outright.
    pub async fn stop(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

pub struct Client {
    handle: HubHandle,
    pub session: Session,
    rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl Client {
    pub fn send(&self, command: &str, request_id: &str, parameters: Value) {
        self.handle
            .dispatch(&self.session, InboundRequest::new(command, request_id, parameters))
            .expect("hub running");
    }

    pub fn watch(&self, request_id: &str, path: &Path) {
        self.send(
            "watch",
            request_id,
            json!({ "directoryPath": path.to_string_lossy() }),
        );
    }

    pub fn unwatch(&self, request_id: &str, path: &Path) {
        self.send(
            "unwatch",
            request_id,
            json!({ "directoryPath": path.to_string_lossy() }),
        );
    }

    pub fn disconnect(&self) {
        self.handle
            .disconnect(self.session.id())
            .expect("hub running");
    }

    pub async fn next(&mut self) -> OutboundMessage {
        tokio::time::timeout(RECV_TIMEOUT, self.rx.recv())
            .await
            .expect("timed out waiting for a message")
            .expect("session channel closed")
    }

    /// Next `command` message, returning `(requestId, result)`.
    pub async fn next_command(&mut self) -> (String, Value) {
        match self.next().await {
            OutboundMessage::Command { request_id, result } => (request_id, result),
            other => panic!("expected command message, got {other:?}"),
        }
    }

    /// Next `directoryUpdate` message, returning its entries.
    pub async fn next_update(&mut self) -> Vec<Entry> {
        match self.next().await {
            OutboundMessage::DirectoryUpdate { entries, .. } => entries,
            other => panic!("expected directoryUpdate, got {other:?}"),
        }
    }

    /// Skip ahead to the next `directoryUpdate`, ignoring command replies.
    pub async fn skip_to_update(&mut self) -> Vec<Entry> {
        loop {
            if let OutboundMessage::DirectoryUpdate { entries, .. } = self.next().await {
                return entries;
            }
        }
    }

    /// Assert nothing arrives for `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Ok(message) = tokio::time::timeout(window, self.rx.recv()).await {
            panic!("expected silence, got {message:?}");
        }
    }
}

pub fn names(entries: &[Entry]) -> Vec<String> {
    let mut names: Vec<_> = entries
        .iter()
        .filter(|entry| !entry.parent)
        .map(|entry| format!("{}{}", entry.name, entry.ext))
        .collect();
    names.sort();
    names
}
