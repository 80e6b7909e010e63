//! Live-state core for Wayfarer.
//!
//! Two registries sit behind one [`Hub`]:
//!
//! - [`fs_watch::WatchMultiplexer`] shares one OS watch per canonical
//!   directory across any number of sessions and fans debounced listings out
//!   as `directoryUpdate` messages.
//! - [`process::ProcessSupervisor`] runs each operation in its own child
//!   process, correlated by the caller's request id, and reports
//!   finish/error/abort.
//!
//! The crate knows nothing about transports. A [`Session`] is an opaque
//! identity plus a channel of [`OutboundMessage`]s; the server crate maps
//! those onto WebSocket frames.

pub mod catalogue;
pub mod config;
pub mod entry;
pub mod error;
pub mod fs_watch;
pub mod hub;
pub mod message;
pub mod process;
pub mod session;

pub use catalogue::{CommandCatalogue, StaticCatalogue};
pub use config::{DEFAULT_DEBOUNCE_WINDOW, HubConfig, WatchConfig};
pub use entry::{Entry, EntryOptions, EntryType};
pub use error::{CoreError, Result, WatchError};
pub use hub::{Hub, HubHandle, HubSnapshot};
pub use message::{CommandResult, CommandStatus, InboundRequest, OutboundMessage};
pub use process::{RunOutcome, WorkerLauncher};
pub use session::{Session, SessionId};
