use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::message::OutboundMessage;

/// Opaque identity of a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A client as seen by the core: an identity and an outbound channel.
///
/// Sessions are created by the transport. The channel is unbounded so the hub
/// never waits on a slow client; messages to a closed session are dropped.
#[derive(Clone)]
pub struct Session {
    id: SessionId,
    sender: mpsc::UnboundedSender<OutboundMessage>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("channel_closed", &self.sender.is_closed())
            .finish()
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Session {}

impl Session {
    pub fn new(sender: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self::with_id(SessionId::new(), sender)
    }

    pub fn with_id(id: SessionId, sender: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self { id, sender }
    }

    /// Build a session together with the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Emit a message to this client. Returns `false` if the transport is gone.
    pub fn send(&self, message: OutboundMessage) -> bool {
        match self.sender.send(message) {
            Ok(()) => true,
            Err(_) => {
                debug!(session = %self.id, "dropping message for closed session");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::CommandResult;

    #[test]
    fn sessions_compare_by_identity() {
        let (a, _rx_a) = Session::channel();
        let (b, _rx_b) = Session::channel();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn send_reports_closed_transport() {
        let (session, rx) = Session::channel();
        drop(rx);
        assert!(session.is_closed());
        assert!(!session.send(OutboundMessage::command("r1", CommandResult::finish())));
    }
}
