//! Transport abstractions for the control loop
//!
//! The session does not know how commands reach the engine. External
//! servers are driven over the UDP remote console; an embedded engine
//! takes direct command injection. Both paths implement `CommandTransport`.

use async_trait::async_trait;
use quake_console_core::Result;

/// A command path to the engine console.
#[async_trait]
pub trait CommandTransport: Send + Sync {
    /// Execute a console command.
    ///
    /// `Ok(None)` is the explicit no-response value: the exchange timed
    /// out or the engine produced no output. Callers must distinguish it
    /// from `Ok(Some(""))`. `Err` means the command could not be
    /// delivered at all.
    async fn execute(&self, command: &str) -> Result<Option<String>>;

    /// Whether the engine is currently able to take commands. Status
    /// polling is skipped while this is false.
    fn is_ready(&self) -> bool;
}

/// Best-effort lookup of written save content by candidate key.
///
/// Engines differ in where a `save` lands (game directory, engine
/// subdirectory, archive keys); the session probes a fixed priority list
/// of keys against one of these stores.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Content for one candidate key, `None` if absent or unreadable.
    async fn read(&self, key: &str) -> Option<String>;
}
