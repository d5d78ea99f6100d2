//! # fteqw-bridge
//!
//! OS-facing bridge to FTE/Quake dedicated servers:
//! - `ServerSupervisor`: spawn/kill lifecycle for the server process,
//!   with its byte output framed into lines and published to subscribers
//! - `RconClient`: the connectionless UDP remote console protocol
//! - `EmbeddedEngine` trait and the transport adapters wiring either
//!   command path into a `ConsoleSession`
//! - `FsSnapshotStore`: save-file lookup under the Quake base directory

pub mod engine;
pub mod framing;
pub mod process;
pub mod rcon;
pub mod store;

pub use engine::{EmbeddedEngine, EmbeddedTransport, RconTransport};
pub use framing::LineFramer;
pub use process::{ProtocolFlavor, ServerSupervisor, SpawnConfig};
pub use rcon::{RconClient, RconConfig};
pub use store::FsSnapshotStore;
