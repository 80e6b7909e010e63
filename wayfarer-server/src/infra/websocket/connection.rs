use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use wayfarer_core::{OutboundMessage, Session, SessionId};

/// One WebSocket client as seen by the hub.
#[derive(Clone)]
pub struct Connection {
    session: Session,
    /// Peer address, when the listener exposes it
    pub remote: Option<SocketAddr>,
    pub connected_at: DateTime<Utc>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.session.id())
            .field("remote", &self.remote)
            .field("channel_closed", &self.session.is_closed())
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

impl Connection {
    /// Create a connection and the receiver its writer task drains.
    pub fn open(remote: Option<SocketAddr>) -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (session, rx) = Session::channel();
        (
            Self {
                session,
                remote,
                connected_at: Utc::now(),
            },
            rx,
        )
    }

    pub fn id(&self) -> SessionId {
        self.session.id()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}
