//! Command-path adapters for the console session
//!
//! Two ways to drive an engine console: the UDP remote console of an
//! external dedicated server, or direct injection into an embedded
//! engine running in-process. Both are exposed to the session as
//! `CommandTransport`.

use crate::process::ServerSupervisor;
use crate::rcon::RconClient;
use async_trait::async_trait;
use quake_console::{CommandTransport, SnapshotStore};
use quake_console_core::Result;
use std::sync::Arc;

/// An engine hosted inside this process.
///
/// Commands go straight into the console buffer instead of over the
/// wire, and save content is read back from the engine's own storage.
#[async_trait]
pub trait EmbeddedEngine: Send + Sync {
    /// Inject a console command; any immediate console output comes back.
    async fn execute(&self, command: &str) -> Result<Option<String>>;

    /// Whether the engine is initialized and accepting commands.
    fn is_active(&self) -> bool;

    /// Read save content the engine wrote under `key`, if present.
    async fn read_save(&self, key: &str) -> Option<String>;

    /// Tear the engine down to a pristine state, releasing its world and
    /// listeners. Unlike a host reload this leaves the process intact.
    async fn reset(&self) -> Result<()>;
}

/// External-process command path: remote console plus the supervisor's
/// liveness.
pub struct RconTransport {
    client: Arc<RconClient>,
    supervisor: Arc<ServerSupervisor>,
}

impl RconTransport {
    pub fn new(client: Arc<RconClient>, supervisor: Arc<ServerSupervisor>) -> Self {
        Self { client, supervisor }
    }
}

#[async_trait]
impl CommandTransport for RconTransport {
    async fn execute(&self, command: &str) -> Result<Option<String>> {
        self.client.send(command).await
    }

    fn is_ready(&self) -> bool {
        self.supervisor.is_running()
    }
}

/// Embedded-engine command path.
pub struct EmbeddedTransport {
    engine: Arc<dyn EmbeddedEngine>,
}

impl EmbeddedTransport {
    pub fn new(engine: Arc<dyn EmbeddedEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl CommandTransport for EmbeddedTransport {
    async fn execute(&self, command: &str) -> Result<Option<String>> {
        self.engine.execute(command).await
    }

    fn is_ready(&self) -> bool {
        self.engine.is_active()
    }
}

#[async_trait]
impl SnapshotStore for EmbeddedTransport {
    async fn read(&self, key: &str) -> Option<String> {
        self.engine.read_save(key).await
    }
}
