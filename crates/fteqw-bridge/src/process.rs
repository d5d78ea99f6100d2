//! Server process supervision
//!
//! Owns at most one dedicated-server subprocess. Raw stdout/stderr bytes
//! are framed into lines and published to broadcast subscribers; the last
//! N lines are also kept in a bounded ring for late subscribers. Spawn
//! failures and process exit are reported as synthetic output lines, not
//! errors - restarting a dead server is the caller's decision.

use crate::framing::LineFramer;
use crate::rcon::DEFAULT_PORT;
use quake_console_core::{ConsoleError, LineRing, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{Mutex, broadcast, oneshot};
use tracing::{debug, info, warn};

/// Network protocol family a launcher front-end may request. The
/// dedicated server negotiates per client at connect time; the flavor is
/// recorded for diagnostics only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProtocolFlavor {
    /// NetQuake
    #[default]
    Nq,
    /// QuakeWorld
    Qw,
}

/// Launch parameters for the dedicated server.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Quake base directory; the executable and game data live under it
    pub base_dir: PathBuf,
    /// Game subdirectory (mod), `id1` for the base game
    pub game_dir: String,
    /// Map to load on startup
    pub map: Option<String>,
    /// Server executable name, resolved under `base_dir`
    pub executable: String,
    /// Remote-console password; omitted from the command line when unset
    pub rcon_password: Option<String>,
    /// UDP port the server listens on
    pub port: u16,
    pub protocol: ProtocolFlavor,
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            game_dir: "id1".to_string(),
            map: None,
            executable: "fteqwsv64".to_string(),
            rcon_password: None,
            port: DEFAULT_PORT,
            protocol: ProtocolFlavor::default(),
        }
    }
}

impl SpawnConfig {
    /// The order-significant argument vector: dedicated mode, data paths,
    /// no public advertisement, then console directives for the password,
    /// port, and initial map.
    pub fn arg_vector(&self) -> Vec<String> {
        let game = if self.game_dir.is_empty() {
            "id1"
        } else {
            self.game_dir.as_str()
        };

        let mut args: Vec<String> = vec![
            "-dedicated".into(),
            "-basedir".into(),
            self.base_dir.display().to_string(),
            "-game".into(),
            game.to_string(),
            "+sv_public".into(),
            "0".into(),
        ];

        if let Some(password) = self.rcon_password.as_deref() {
            if !password.is_empty() {
                args.extend([
                    "+set".into(),
                    "rcon_password".into(),
                    password.to_string(),
                ]);
            }
        }

        args.extend(["+set".into(), "sv_port".into(), self.port.to_string()]);

        if let Some(map) = &self.map {
            args.extend(["+map".into(), map.clone()]);
        }

        args
    }
}

fn quote_arg(arg: &str) -> String {
    if arg.contains(' ') || arg.contains('\t') {
        format!("\"{arg}\"")
    } else {
        arg.to_string()
    }
}

fn render_command_line(executable: &Path, args: &[String]) -> String {
    let mut parts = vec![quote_arg(&executable.display().to_string())];
    parts.extend(args.iter().map(|a| quote_arg(a)));
    parts.join(" ")
}

/// Publishes framed output lines to subscribers and the bounded buffer.
#[derive(Clone)]
struct LineSink {
    tx: broadcast::Sender<String>,
    buffer: Arc<Mutex<LineRing>>,
}

impl LineSink {
    async fn emit(&self, line: String) {
        debug!(target: "fteqw", "{line}");
        self.buffer.lock().await.push(line.clone());
        let _ = self.tx.send(line);
    }
}

async fn pump_lines<R: AsyncRead + Unpin>(mut reader: R, sink: LineSink) {
    let mut framer = LineFramer::new();
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                for line in framer.push(&chunk[..n]) {
                    sink.emit(line).await;
                }
            }
        }
    }
    if let Some(partial) = framer.finish() {
        sink.emit(partial).await;
    }
}

struct ProcessControl {
    kill_tx: oneshot::Sender<()>,
    stdin: Option<ChildStdin>,
}

/// Owns zero-or-one dedicated-server subprocess.
pub struct ServerSupervisor {
    line_tx: broadcast::Sender<String>,
    exit_tx: broadcast::Sender<Option<i32>>,
    buffer: Arc<Mutex<LineRing>>,
    /// Epoch of the live process, 0 when none. An exit handler may only
    /// clear the epoch it was spawned with, so a stale process going down
    /// never marks a newer one dead.
    live_epoch: Arc<AtomicU64>,
    next_epoch: AtomicU64,
    control: Mutex<Option<ProcessControl>>,
}

impl ServerSupervisor {
    pub fn new() -> Self {
        let (line_tx, _) = broadcast::channel(256);
        let (exit_tx, _) = broadcast::channel(16);
        Self {
            line_tx,
            exit_tx,
            buffer: Arc::new(Mutex::new(LineRing::default())),
            live_epoch: Arc::new(AtomicU64::new(0)),
            next_epoch: AtomicU64::new(0),
            control: Mutex::new(None),
        }
    }

    fn sink(&self) -> LineSink {
        LineSink {
            tx: self.line_tx.clone(),
            buffer: self.buffer.clone(),
        }
    }

    /// Launch the server described by `config`, terminating any process
    /// already owned. The exact command line is emitted as a synthetic
    /// output line first; launch failures become `[Error: …]` lines.
    pub async fn spawn(&self, config: &SpawnConfig) {
        self.kill().await;
        if let Err(e) = self.launch(config).await {
            self.sink().emit(format!("[Error: {e}]")).await;
        }
    }

    async fn launch(&self, config: &SpawnConfig) -> Result<()> {
        let executable = config.base_dir.join(&config.executable);
        let args = config.arg_vector();
        let sink = self.sink();

        sink.emit(format!(
            "[supervisor] spawning: {}",
            render_command_line(&executable, &args)
        ))
        .await;
        debug!(protocol = ?config.protocol, "launching dedicated server");

        let mut child = Command::new(&executable)
            .args(&args)
            .current_dir(&config.base_dir)
            // The engine polls its console input handle at startup and
            // aborts when stdin is a pipe; suppress it entirely.
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ConsoleError::SpawnError(format!(
                    "failed to launch {}: {e}",
                    executable.display()
                ))
            })?;

        let stdin = child.stdin.take();
        let out_task = child
            .stdout
            .take()
            .map(|s| tokio::spawn(pump_lines(s, sink.clone())));
        let err_task = child
            .stderr
            .take()
            .map(|s| tokio::spawn(pump_lines(s, sink.clone())));

        let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.live_epoch.store(epoch, Ordering::SeqCst);

        let (kill_tx, kill_rx) = oneshot::channel();
        *self.control.lock().await = Some(ProcessControl { kill_tx, stdin });

        let live_epoch = self.live_epoch.clone();
        let exit_tx = self.exit_tx.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };

            // Drain both pumps so output produced before the exit still
            // lands ahead of the exit notice.
            if let Some(task) = out_task {
                let _ = task.await;
            }
            if let Some(task) = err_task {
                let _ = task.await;
            }

            let code = match status {
                Ok(status) => {
                    let line = match status.code() {
                        Some(code) => format!("[Server exited with code {code}]"),
                        None => "[Server exited by signal]".to_string(),
                    };
                    sink.emit(line).await;
                    status.code()
                }
                Err(e) => {
                    sink.emit(format!("[Error: wait failed: {e}]")).await;
                    None
                }
            };

            let _ = live_epoch.compare_exchange(epoch, 0, Ordering::SeqCst, Ordering::SeqCst);
            let _ = exit_tx.send(code);
        });

        info!("spawned {}", executable.display());
        Ok(())
    }

    /// Request termination of the owned process, if any. Ownership is
    /// cleared immediately; output already in flight still gets flushed
    /// before the exit notice. Idempotent.
    pub async fn kill(&self) {
        if let Some(control) = self.control.lock().await.take() {
            let _ = control.kill_tx.send(());
        }
        self.live_epoch.store(0, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.live_epoch.load(Ordering::SeqCst) != 0
    }

    /// Write a line to the server's stdin. The dedicated server is
    /// launched with stdin suppressed, so this logs and drops the line
    /// unless a future engine build pipes it.
    pub async fn send_input(&self, text: &str) {
        let mut guard = self.control.lock().await;
        match guard.as_mut().and_then(|c| c.stdin.as_mut()) {
            Some(stdin) => {
                if let Err(e) = stdin.write_all(format!("{text}\n").as_bytes()).await {
                    warn!("failed to write to server stdin: {e}");
                }
            }
            None => warn!("no server input stream; dropped: {text}"),
        }
    }

    /// Subscribe to framed output lines.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.line_tx.subscribe()
    }

    /// Subscribe to process-exit notifications. `None` means the process
    /// was terminated by a signal or could not be waited on.
    pub fn subscribe_exit(&self) -> broadcast::Receiver<Option<i32>> {
        self.exit_tx.subscribe()
    }

    /// Snapshot of the last buffered output lines, for late subscribers.
    pub async fn buffered_output(&self) -> Vec<String> {
        self.buffer.lock().await.snapshot()
    }
}

impl Default for ServerSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_arg_vector_order() {
        let config = SpawnConfig {
            base_dir: PathBuf::from("/games/quake"),
            game_dir: "hipnotic".to_string(),
            map: Some("start".to_string()),
            rcon_password: Some("hunter2".to_string()),
            port: 27510,
            ..Default::default()
        };

        let args = config.arg_vector();
        assert_eq!(
            args,
            vec![
                "-dedicated",
                "-basedir",
                "/games/quake",
                "-game",
                "hipnotic",
                "+sv_public",
                "0",
                "+set",
                "rcon_password",
                "hunter2",
                "+set",
                "sv_port",
                "27510",
                "+map",
                "start",
            ]
        );
    }

    #[test]
    fn test_arg_vector_optional_parts_omitted() {
        let config = SpawnConfig {
            base_dir: PathBuf::from("/q"),
            game_dir: String::new(),
            rcon_password: Some(String::new()),
            ..Default::default()
        };

        let args = config.arg_vector();
        assert!(!args.contains(&"rcon_password".to_string()));
        assert!(!args.contains(&"+map".to_string()));
        // Empty game subdirectory falls back to the base game
        assert_eq!(args[4], "id1");
        assert_eq!(args.last().unwrap(), "27500");
    }

    #[test]
    fn test_command_line_quoting() {
        let rendered = render_command_line(
            Path::new("/games/My Quake/fteqwsv64"),
            &["-basedir".to_string(), "/games/My Quake".to_string()],
        );

        assert_eq!(
            rendered,
            "\"/games/My Quake/fteqwsv64\" -basedir \"/games/My Quake\""
        );
    }

    async fn collect_until_exit(
        rx: &mut broadcast::Receiver<String>,
    ) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let received = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("timed out waiting for process output");
            match received {
                Ok(line) => {
                    let done = line.starts_with("[Server exited");
                    lines.push(line);
                    if done {
                        return lines;
                    }
                }
                // A flood of output can overrun the subscription; skip
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    panic!("output channel closed before exit notice")
                }
            }
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_spawn_emits_command_line_and_exit() {
        let supervisor = ServerSupervisor::new();
        let mut rx = supervisor.subscribe();
        let mut exit_rx = supervisor.subscribe_exit();

        // /bin/echo prints the argument vector back at us and exits 0,
        // standing in for a short-lived engine.
        let config = SpawnConfig {
            base_dir: PathBuf::from("/bin"),
            executable: "echo".to_string(),
            ..Default::default()
        };
        supervisor.spawn(&config).await;

        let lines = collect_until_exit(&mut rx).await;
        assert!(lines[0].starts_with("[supervisor] spawning: /bin/echo -dedicated"));
        assert!(lines.iter().any(|l| l.contains("-basedir /bin")));
        assert_eq!(lines.last().unwrap(), "[Server exited with code 0]");
        assert!(!supervisor.is_running());

        let code = tokio::time::timeout(Duration::from_secs(5), exit_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(code, Some(0));

        let buffered = supervisor.buffered_output().await;
        assert_eq!(buffered, lines);
    }

    #[tokio::test]
    async fn test_spawn_failure_emits_error_line() {
        let supervisor = ServerSupervisor::new();
        let mut rx = supervisor.subscribe();

        let config = SpawnConfig {
            base_dir: PathBuf::from("/nonexistent-dir"),
            executable: "no-such-engine".to_string(),
            ..Default::default()
        };
        supervisor.spawn(&config).await;

        // spawning line, then the error line
        let first = rx.recv().await.unwrap();
        assert!(first.starts_with("[supervisor] spawning: "));
        let second = rx.recv().await.unwrap();
        assert!(second.starts_with("[Error: "), "got: {second}");
        assert!(!supervisor.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_clears_ownership_immediately() {
        if !Path::new("/usr/bin/yes").exists() {
            return;
        }

        let supervisor = ServerSupervisor::new();
        let mut rx = supervisor.subscribe();

        // `yes` echoes its arguments forever: a stand-in for a server
        // that keeps producing output until killed.
        let config = SpawnConfig {
            base_dir: PathBuf::from("/usr/bin"),
            executable: "yes".to_string(),
            ..Default::default()
        };
        supervisor.spawn(&config).await;
        assert!(supervisor.is_running());

        supervisor.kill().await;
        assert!(!supervisor.is_running());

        let lines = collect_until_exit(&mut rx).await;
        assert!(lines.last().unwrap().starts_with("[Server exited"));

        // Idempotent
        supervisor.kill().await;
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn test_send_input_without_process_is_noop() {
        let supervisor = ServerSupervisor::new();
        supervisor.send_input("status").await;
        assert!(supervisor.buffered_output().await.is_empty());
    }
}
