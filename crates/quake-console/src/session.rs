//! Console session: the single serialization point for user commands and
//! the periodic status poll.
//!
//! All command traffic to the engine funnels through one
//! `ConsoleSession`. The `busy` and `polling` flags are advisory mutual
//! exclusion: a poll tick that finds either set is dropped, never queued.
//! A caller that talks to the transport directly can still race the
//! session; ownership of the transport is the real discipline.

use crate::transport::{CommandTransport, SnapshotStore};
use quake_console_core::{
    CommandHistory, LineRing, ServerStatus, SnapshotEntity, decode_savegame,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Console transcript capacity in lines
    pub transcript_capacity: usize,
    /// Period of the status poll
    pub poll_interval: Duration,
    /// How long to wait after issuing `save` before reading the file.
    /// The engine gives no completion signal, so this is a settle delay;
    /// tests override it.
    pub snapshot_settle: Duration,
    /// Save name used for snapshot capture
    pub snapshot_name: String,
    /// Candidate keys probed against the snapshot store, in priority order
    pub snapshot_keys: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            transcript_capacity: quake_console_core::ring::DEFAULT_LINE_CAPACITY,
            poll_interval: Duration::from_millis(1000),
            snapshot_settle: Duration::from_millis(1000),
            snapshot_name: "snapshot".to_string(),
            snapshot_keys: default_snapshot_keys("id1", "snapshot"),
        }
    }
}

impl SessionConfig {
    /// Config with snapshot keys resolved for a game directory.
    pub fn for_game(game_dir: &str) -> Self {
        let base = Self::default();
        Self {
            snapshot_keys: default_snapshot_keys(game_dir, &base.snapshot_name),
            ..base
        }
    }
}

/// Candidate save locations for a game directory and save name. Engines
/// place saves in the game directory, an `fte` subdirectory, or the base
/// `id1` tree depending on build and mount mode.
pub fn default_snapshot_keys(game_dir: &str, name: &str) -> Vec<String> {
    let mut keys = vec![
        format!("{game_dir}/{name}.sav"),
        format!("{game_dir}/fte/{name}.sav"),
        format!("id1/fte/{name}.sav"),
        format!("{name}.sav"),
    ];
    keys.dedup();
    keys
}

/// The command/status control loop.
pub struct ConsoleSession {
    transport: Arc<dyn CommandTransport>,
    config: SessionConfig,
    transcript: LineRing,
    history: CommandHistory,
    status: ServerStatus,
    entities: Vec<SnapshotEntity>,
    busy: bool,
    polling: bool,
}

impl ConsoleSession {
    pub fn new(transport: Arc<dyn CommandTransport>, config: SessionConfig) -> Self {
        let transcript = LineRing::new(config.transcript_capacity);
        Self {
            transport,
            config,
            transcript,
            history: CommandHistory::new(),
            status: ServerStatus::default(),
            entities: Vec::new(),
            busy: false,
            polling: false,
        }
    }

    fn record(&mut self, line: String, appended: &mut Vec<String>) {
        self.transcript.push(line.clone());
        appended.push(line);
    }

    /// Issue a console command and return the transcript lines this call
    /// appended (echo, response, or error rendering).
    ///
    /// Blank input is a no-op. The command is recorded in history, echoed
    /// as `> text`, and sent through the transport while `busy` is held;
    /// failures are rendered as `[Error: …]` lines and never escape.
    pub async fn issue_command(&mut self, text: &str) -> Vec<String> {
        let mut appended = Vec::new();
        if text.trim().is_empty() {
            return appended;
        }

        self.history.push(text);
        self.record(format!("> {text}"), &mut appended);

        let transport = self.transport.clone();
        self.busy = true;
        match transport.execute(text).await {
            Ok(Some(response)) if !response.is_empty() => {
                self.record(response, &mut appended);
            }
            Ok(_) => {}
            Err(e) => {
                self.record(format!("[Error: {e}]"), &mut appended);
            }
        }
        self.busy = false;

        appended
    }

    /// Recall the command before the cursor.
    pub fn recall_previous(&mut self) -> Option<&str> {
        self.history.recall_previous()
    }

    /// Recall the command after the cursor; empty past the newest.
    pub fn recall_next(&mut self) -> &str {
        self.history.recall_next()
    }

    /// One status poll tick. Skipped outright while a command is in
    /// flight, a poll is already running, or no engine is taking
    /// commands; a skipped tick is dropped, not retried.
    pub async fn poll_tick(&mut self) {
        if self.busy || self.polling || !self.transport.is_ready() {
            return;
        }

        let transport = self.transport.clone();
        self.polling = true;
        match transport.execute("status").await {
            Ok(Some(raw)) => self.status.apply(&raw),
            Ok(None) => {}
            Err(e) => debug!("status poll failed: {e}"),
        }
        self.polling = false;
    }

    /// Arm the fixed-period poll timer. Each tick runs at most one
    /// `poll_tick`; a tick that finds the session locked by a command in
    /// flight is dropped.
    pub async fn start_polling(session: Arc<Mutex<ConsoleSession>>) -> PollHandle {
        let period = session.lock().await.config.poll_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Ok(mut session) = session.try_lock() else {
                    continue;
                };
                session.poll_tick().await;
            }
        });
        PollHandle { task }
    }

    /// Capture a world snapshot: issue `save`, wait the settle delay,
    /// probe the store for the written content, decode it. Returns the
    /// transcript lines appended.
    pub async fn capture_snapshot(&mut self, store: &dyn SnapshotStore) -> Vec<String> {
        let mut appended = Vec::new();
        let name = self.config.snapshot_name.clone();
        self.record(format!("[snapshot] saving {name}"), &mut appended);

        let transport = self.transport.clone();
        if let Err(e) = transport.execute(&format!("save {name}")).await {
            self.record(format!("[Error: {e}]"), &mut appended);
            return appended;
        }

        tokio::time::sleep(self.config.snapshot_settle).await;

        let mut content = None;
        for key in &self.config.snapshot_keys {
            if let Some(text) = store.read(key).await {
                if !text.is_empty() {
                    debug!("snapshot content found at {key}");
                    content = Some(text);
                    break;
                }
            }
        }

        let Some(text) = content else {
            self.record("[Error: no snapshot content found]".to_string(), &mut appended);
            return appended;
        };

        let entities = decode_savegame(&text);
        self.record(
            format!("[snapshot] captured {} entities", entities.len()),
            &mut appended,
        );
        self.entities = entities;

        appended
    }

    /// Append an asynchronous server output line to the transcript.
    pub fn push_output(&mut self, line: impl Into<String>) {
        self.transcript.push(line);
    }

    /// Copy of the console transcript, oldest line first.
    pub fn transcript(&self) -> Vec<String> {
        self.transcript.snapshot()
    }

    pub fn status(&self) -> &ServerStatus {
        &self.status
    }

    /// Entities from the last captured snapshot.
    pub fn entities(&self) -> &[SnapshotEntity] {
        &self.entities
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }
}

/// Handle to the running poll timer; dropping it disarms the timer.
pub struct PollHandle {
    task: tokio::task::JoinHandle<()>,
}

impl PollHandle {
    /// Disarm the poll timer.
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
