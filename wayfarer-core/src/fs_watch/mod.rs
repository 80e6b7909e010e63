//! Shared directory watches.
//!
//! One [`WatchSubscription`] exists per canonical directory no matter how many
//! sessions look at it. Raw `notify` events are classified on the watcher
//! thread: removal or rename of the watched directory itself tears the
//! subscription down right away, everything else feeds a per-path
//! [`Debouncer`] whose expiry triggers a single rescan. Access checks for new
//! registrations and scans run on spawned tasks and report back through the
//! event channel, so the multiplexer itself is only ever touched from the hub
//! loop and never waits on the filesystem.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

pub mod debounce;
pub mod path;
pub mod scan;
pub mod subscription;

pub use debounce::{DebounceState, Debouncer};
pub use path::canonical_key;
pub use subscription::{WatchId, WatchSubscription};

use crate::config::WatchConfig;
use crate::entry::{Entry, EntryOptions};
use crate::error::WatchError;
use crate::message::{CommandResult, OutboundMessage};
use crate::session::{Session, SessionId};

/// What the watcher thread makes of one raw notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchSignal {
    /// Something inside the directory changed.
    Changed,
    /// The watched directory itself was removed or renamed away.
    Invalidated,
    /// The watch backend reported an error; a rescan decides what it means.
    BackendError(String),
}

/// Messages posted back to the hub loop by watchers and background tasks.
#[derive(Debug)]
pub enum WatchEvent {
    /// A classified notification from the watcher of `path`.
    Signal {
        path: PathBuf,
        watch: WatchId,
        signal: WatchSignal,
    },
    /// Outcome of the access check behind a pending registration.
    AccessChecked {
        check: u64,
        key: PathBuf,
        session: Session,
        request_id: String,
        result: io::Result<()>,
    },
    /// A finished listing of `path`, numbered by `seq`.
    Scanned {
        path: PathBuf,
        watch: WatchId,
        seq: u64,
        result: io::Result<Vec<Entry>>,
    },
}

/// Read-only view of one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInfo {
    /// Canonical directory path.
    pub path: PathBuf,
    /// Subscribed sessions, sorted.
    pub sessions: Vec<SessionId>,
    /// Whether a listing has been broadcast yet.
    pub has_snapshot: bool,
    /// A debounce window is armed or a scan is in flight.
    pub rescan_pending: bool,
}

/// How a `watch` request was taken in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// Joined a live subscription; the caller replies right away.
    Joined(PathBuf),
    /// The access check is running; its [`WatchEvent::AccessChecked`]
    /// delivers the reply.
    Pending(PathBuf),
}

impl Registration {
    /// Canonical path of the registration.
    pub fn path(&self) -> &Path {
        match self {
            Registration::Joined(path) | Registration::Pending(path) => path,
        }
    }
}

/// Successful `watch` reply for `key`.
pub fn watch_reply(key: &Path) -> CommandResult {
    CommandResult::finish().with_field("directoryPath", key.to_string_lossy().into_owned())
}

/// Owns the path → subscription registry.
#[derive(Debug)]
pub struct WatchMultiplexer {
    subscriptions: HashMap<PathBuf, WatchSubscription>,
    debouncer: Debouncer<PathBuf>,
    options: EntryOptions,
    events: mpsc::UnboundedSender<WatchEvent>,
    pending_checks: HashMap<u64, SessionId>,
    next_id: u64,
    next_check: u64,
}

impl WatchMultiplexer {
    pub fn new(config: &WatchConfig, events: mpsc::UnboundedSender<WatchEvent>) -> Self {
        Self {
            subscriptions: HashMap::new(),
            debouncer: Debouncer::new(config.debounce_window),
            options: config.entry_options(),
            events,
            pending_checks: HashMap::new(),
            next_id: 0,
            next_check: 0,
        }
    }

    /// Subscribe `session` to `directory_path`.
    ///
    /// Joining an existing subscription replays its last snapshot to the new
    /// session and returns [`Registration::Joined`]. Otherwise the directory's
    /// accessibility is checked on a spawned task and the subscription is
    /// created, or joined if another registration won the race, when the
    /// [`WatchEvent::AccessChecked`] comes back. That event also carries the
    /// reply for `request_id`.
    pub fn register(
        &mut self,
        session: &Session,
        request_id: &str,
        directory_path: &str,
    ) -> Result<Registration, WatchError> {
        let key = canonical_key(directory_path)?;

        if let Some(subscription) = self.subscriptions.get_mut(&key) {
            subscription.add_session(session);
            subscription.send_last_entries(session);
            debug!(path = %key.display(), session = %session.id(), "joined existing watch");
            return Ok(Registration::Joined(key));
        }

        self.next_check += 1;
        let check = self.next_check;
        self.pending_checks.insert(check, session.id());

        let events = self.events.clone();
        let session = session.clone();
        let request_id = request_id.to_string();
        let path = key.clone();
        tokio::spawn(async move {
            let result = tokio::fs::metadata(&path).await.map(|_| ());
            let event = WatchEvent::AccessChecked {
                check,
                key: path,
                session,
                request_id,
                result,
            };
            if events.send(event).is_err() {
                trace!("hub gone before access check was delivered");
            }
        });

        Ok(Registration::Pending(key))
    }

    /// Join or create the subscription for an accessible `key`.
    fn subscribe(&mut self, session: &Session, key: &Path) -> Result<(), WatchError> {
        if let Some(subscription) = self.subscriptions.get_mut(key) {
            subscription.add_session(session);
            subscription.send_last_entries(session);
            debug!(path = %key.display(), session = %session.id(), "joined existing watch");
            return Ok(());
        }

        self.next_id += 1;
        let id = WatchId(self.next_id);
        let watcher =
            start_watcher(key, id, self.events.clone()).map_err(|err| WatchError::Access {
                path: key.to_path_buf(),
                source: io::Error::other(err.to_string()),
            })?;

        self.subscriptions.insert(
            key.to_path_buf(),
            WatchSubscription::new(id, key.to_path_buf(), watcher, session),
        );
        self.debouncer.touch(&key.to_path_buf());
        info!(path = %key.display(), session = %session.id(), "watching directory");
        Ok(())
    }

    /// Remove `session` from the subscription for `directory_path`.
    ///
    /// Succeeds whether or not such a subscription or membership existed.
    pub fn unregister(
        &mut self,
        session: SessionId,
        directory_path: &str,
    ) -> Result<(), WatchError> {
        let key = canonical_key(directory_path)?;
        self.unregister_key(session, &key);
        Ok(())
    }

    /// Drop `session` from every subscription it belongs to, and forget its
    /// pending registrations.
    pub fn close(&mut self, session: SessionId) {
        self.pending_checks.retain(|_, owner| *owner != session);
        let keys: Vec<PathBuf> = self
            .subscriptions
            .iter()
            .filter(|(_, subscription)| subscription.has_session(session))
            .map(|(key, _)| key.clone())
            .collect();

        for key in keys {
            self.unregister_key(session, &key);
        }
    }

    fn unregister_key(&mut self, session: SessionId, key: &Path) {
        let Some(subscription) = self.subscriptions.get_mut(key) else {
            return;
        };
        subscription.remove_session(session);
        if subscription.is_empty() {
            self.destroy(key);
            info!(path = %key.display(), "stopped watching directory");
        }
    }

    fn destroy(&mut self, key: &Path) -> Option<WatchSubscription> {
        self.debouncer.cancel(&key.to_path_buf());
        self.subscriptions.remove(key)
    }

    /// Tear down a subscription after a scan or invalidation failure.
    fn fail(&mut self, key: &Path, error: WatchError) {
        if let Some(subscription) = self.destroy(key) {
            warn!(path = %key.display(), error = %error, "watch torn down");
            subscription.broadcast_error(&error.to_string());
        }
    }

    /// Resolve once the debounce window of some path elapses.
    pub async fn next_due(&mut self) -> Option<PathBuf> {
        self.debouncer.next_due().await
    }

    /// Start a rescan of `key` on a background task.
    pub fn rescan(&mut self, key: PathBuf) {
        let Some(subscription) = self.subscriptions.get_mut(&key) else {
            return;
        };
        let seq = subscription.issue_scan();
        let watch = subscription.id();
        let events = self.events.clone();
        let options = self.options;

        tokio::spawn(async move {
            let result = scan::read_directory(&key, options).await;
            if events
                .send(WatchEvent::Scanned {
                    path: key,
                    watch,
                    seq,
                    result,
                })
                .is_err()
            {
                trace!("hub gone before scan result was delivered");
            }
        });
    }

    /// Apply one event posted by a watcher or a background task.
    pub fn handle_event(&mut self, event: WatchEvent) {
        match event {
            WatchEvent::AccessChecked {
                check,
                key,
                session,
                request_id,
                result,
            } => {
                if self.pending_checks.remove(&check).is_none() {
                    trace!(path = %key.display(), "access check for a closed session");
                    return;
                }
                let subscribed = result
                    .map_err(|source| WatchError::Access {
                        path: key.clone(),
                        source,
                    })
                    .and_then(|()| self.subscribe(&session, &key));
                let reply = match subscribed {
                    Ok(()) => watch_reply(&key),
                    Err(err) => CommandResult::error(err.to_string()),
                };
                session.send(OutboundMessage::command(request_id, reply));
            }
            WatchEvent::Signal {
                path,
                watch,
                signal,
            } => {
                if !self.is_current(&path, watch) {
                    return;
                }
                match signal {
                    WatchSignal::Changed => self.debouncer.touch(&path),
                    WatchSignal::BackendError(message) => {
                        warn!(path = %path.display(), error = %message, "watch backend error");
                        self.debouncer.touch(&path);
                    }
                    WatchSignal::Invalidated => {
                        let error = WatchError::PathInvalidated(path.clone());
                        self.fail(&path, error);
                    }
                }
            }
            WatchEvent::Scanned {
                path,
                watch,
                seq,
                result,
            } => {
                if !self.is_current(&path, watch) {
                    trace!(path = %path.display(), "scan finished after teardown");
                    return;
                }
                match result {
                    Ok(entries) => {
                        if let Some(subscription) = self.subscriptions.get_mut(&path) {
                            subscription.apply_scan(seq, entries);
                        }
                    }
                    Err(source) => {
                        let error = WatchError::Scan {
                            path: path.clone(),
                            source,
                        };
                        self.fail(&path, error);
                    }
                }
            }
        }
    }

    fn is_current(&self, path: &Path, watch: WatchId) -> bool {
        self.subscriptions
            .get(path)
            .is_some_and(|subscription| subscription.id() == watch)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        let mut infos: Vec<_> = self
            .subscriptions
            .values()
            .map(|subscription| SubscriptionInfo {
                path: subscription.path().to_path_buf(),
                sessions: subscription.session_ids(),
                has_snapshot: subscription.has_snapshot(),
                rescan_pending: subscription.scan_in_flight()
                    || self.debouncer.state(&subscription.path().to_path_buf())
                        != DebounceState::Idle,
            })
            .collect();
        infos.sort_by(|a, b| a.path.cmp(&b.path));
        infos
    }

    /// Drop every subscription without notifying anyone.
    pub fn shutdown(&mut self) {
        self.pending_checks.clear();
        let keys: Vec<PathBuf> = self.subscriptions.keys().cloned().collect();
        for key in keys {
            self.destroy(&key);
        }
    }
}

fn start_watcher(
    path: &Path,
    watch: WatchId,
    events: mpsc::UnboundedSender<WatchEvent>,
) -> notify::Result<RecommendedWatcher> {
    let root = path.to_path_buf();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            let signal = match res {
                Ok(event) => match classify_event(&root, &event) {
                    Some(signal) => signal,
                    None => return,
                },
                Err(err) => WatchSignal::BackendError(err.to_string()),
            };
            if events
                .send(WatchEvent::Signal {
                    path: root.clone(),
                    watch,
                    signal,
                })
                .is_err()
            {
                trace!(path = %root.display(), "hub gone, dropping watch signal");
            }
        },
        NotifyConfig::default(),
    )?;
    watcher.watch(path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// Fast, undebounced check run on every raw event.
///
/// Access notifications are dropped: listing the directory opens it, and
/// counting that as a change would rescan forever. A rename of the root
/// invalidates even if the path already exists again, since the OS watch
/// follows the moved directory.
pub fn classify_event(root: &Path, event: &Event) -> Option<WatchSignal> {
    if matches!(event.kind, EventKind::Access(_)) {
        return None;
    }

    let touches_root = event.paths.iter().any(|path| path == root);
    if touches_root {
        match event.kind {
            EventKind::Remove(_) => return Some(WatchSignal::Invalidated),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {}
            EventKind::Modify(ModifyKind::Name(_)) => return Some(WatchSignal::Invalidated),
            _ => {}
        }
    }

    Some(WatchSignal::Changed)
}
