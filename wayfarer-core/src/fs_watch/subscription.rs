use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use notify::RecommendedWatcher;
use tracing::debug;

use crate::entry::Entry;
use crate::message::OutboundMessage;
use crate::session::{Session, SessionId};

/// Distinguishes successive subscriptions on the same path so late watcher
/// signals and scan results from a torn-down subscription are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// Live state of one canonical directory.
pub struct WatchSubscription {
    id: WatchId,
    path: PathBuf,
    // Dropping the watcher stops the OS watch.
    _watcher: RecommendedWatcher,
    sessions: HashMap<SessionId, Session>,
    last_entries: Option<Vec<Entry>>,
    issued_scans: u64,
    applied_scan: u64,
}

impl fmt::Debug for WatchSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSubscription")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("session_count", &self.sessions.len())
            .field("has_snapshot", &self.last_entries.is_some())
            .field("issued_scans", &self.issued_scans)
            .field("applied_scan", &self.applied_scan)
            .finish()
    }
}

impl WatchSubscription {
    pub fn new(id: WatchId, path: PathBuf, watcher: RecommendedWatcher, session: &Session) -> Self {
        let mut sessions = HashMap::new();
        sessions.insert(session.id(), session.clone());
        Self {
            id,
            path,
            _watcher: watcher,
            sessions,
            last_entries: None,
            issued_scans: 0,
            applied_scan: 0,
        }
    }

    pub fn id(&self) -> WatchId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add_session(&mut self, session: &Session) {
        self.sessions.insert(session.id(), session.clone());
    }

    pub fn remove_session(&mut self, session: SessionId) -> bool {
        self.sessions.remove(&session).is_some()
    }

    pub fn has_session(&self, session: SessionId) -> bool {
        self.sessions.contains_key(&session)
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn has_snapshot(&self) -> bool {
        self.last_entries.is_some()
    }

    pub fn scan_in_flight(&self) -> bool {
        self.issued_scans > self.applied_scan
    }

    /// Reserve the sequence number for a new scan.
    pub fn issue_scan(&mut self) -> u64 {
        self.issued_scans += 1;
        self.issued_scans
    }

    /// Store and fan out a completed scan.
    ///
    /// Results that finish after a newer scan was already applied are stale
    /// and dropped; returns whether the snapshot was broadcast.
    pub fn apply_scan(&mut self, seq: u64, entries: Vec<Entry>) -> bool {
        if seq <= self.applied_scan {
            debug!(
                path = %self.path.display(),
                seq,
                applied = self.applied_scan,
                "discarding stale scan"
            );
            return false;
        }
        self.applied_scan = seq;
        self.broadcast_entries(entries);
        true
    }

    fn broadcast_entries(&mut self, entries: Vec<Entry>) {
        for session in self.sessions.values() {
            session.send(OutboundMessage::DirectoryUpdate {
                path: self.path.clone(),
                entries: entries.clone(),
            });
        }
        self.last_entries = Some(entries);
    }

    /// Replay the last snapshot to one session, if a scan has completed.
    pub fn send_last_entries(&self, session: &Session) {
        if let Some(entries) = &self.last_entries {
            session.send(OutboundMessage::DirectoryUpdate {
                path: self.path.clone(),
                entries: entries.clone(),
            });
        }
    }

    pub fn broadcast_error(&self, message: &str) {
        for session in self.sessions.values() {
            session.send(OutboundMessage::Error {
                path: self.path.clone(),
                message: message.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::Watcher;

    fn idle_watcher() -> RecommendedWatcher {
        RecommendedWatcher::new(
            |_: notify::Result<notify::Event>| {},
            notify::Config::default(),
        )
        .unwrap()
    }

    fn listing(name: &str) -> Vec<Entry> {
        vec![Entry::unresolved(&Path::new("/srv").join(name), false)]
    }

    #[test]
    fn older_scans_are_discarded() {
        let (session, mut out) = Session::channel();
        let mut subscription =
            WatchSubscription::new(WatchId(1), PathBuf::from("/srv"), idle_watcher(), &session);

        let first = subscription.issue_scan();
        let second = subscription.issue_scan();
        assert!(subscription.scan_in_flight());

        assert!(subscription.apply_scan(second, listing("new.txt")));
        assert!(!subscription.apply_scan(first, listing("old.txt")));
        assert!(!subscription.scan_in_flight());

        match out.try_recv().unwrap() {
            OutboundMessage::DirectoryUpdate { entries, .. } => {
                assert_eq!(entries, listing("new.txt"));
            }
            other => panic!("unexpected message {other:?}"),
        }
        assert!(out.try_recv().is_err());

        // Late joiners see the newer listing too.
        let (late, mut late_out) = Session::channel();
        subscription.send_last_entries(&late);
        match late_out.try_recv().unwrap() {
            OutboundMessage::DirectoryUpdate { entries, .. } => {
                assert_eq!(entries, listing("new.txt"));
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn no_replay_before_the_first_scan() {
        let (session, _out) = Session::channel();
        let subscription =
            WatchSubscription::new(WatchId(1), PathBuf::from("/srv"), idle_watcher(), &session);
        let (late, mut late_out) = Session::channel();
        subscription.send_last_entries(&late);
        assert!(late_out.try_recv().is_err());
        assert!(!subscription.has_snapshot());
    }
}
