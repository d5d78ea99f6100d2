//! Connectionless UDP remote console client
//!
//! Quake-family servers accept out-of-band console packets: four `0xFF`
//! marker bytes followed by `rcon <password> <command>`. The protocol has
//! no sequence numbers, so a reply can only be attributed to "the request
//! currently waiting" - at most one exchange is meaningfully outstanding
//! per client. Overlapping sends replace the pending resolver; the
//! replaced caller runs out its response window and observes no response.
//! That is a protocol limitation, not a client defect.

use quake_console_core::{ConsoleError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, oneshot};
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, warn};

/// Out-of-band packet marker.
const OOB_HEADER: [u8; 4] = [0xff, 0xff, 0xff, 0xff];

/// Default server console port.
pub const DEFAULT_PORT: u16 = 27500;

/// Default response window.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Remote console connection settings.
#[derive(Debug, Clone)]
pub struct RconConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    /// How long to wait for a response datagram
    pub timeout: Duration,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            password: String::new(),
            timeout: RESPONSE_TIMEOUT,
        }
    }
}

impl RconConfig {
    /// Config for a local server on `port` with the given password.
    pub fn local(port: u16, password: impl Into<String>) -> Self {
        Self {
            port,
            password: password.into(),
            ..Default::default()
        }
    }
}

/// Encode a request datagram: marker + `rcon <password> <command>`.
pub fn encode_request(password: &str, command: &str) -> Vec<u8> {
    let payload = format!("rcon {password} {command}");
    let mut packet = Vec::with_capacity(OOB_HEADER.len() + payload.len());
    packet.extend_from_slice(&OOB_HEADER);
    packet.extend_from_slice(payload.as_bytes());
    packet
}

/// Decode a response datagram: strip the marker, trim the remainder.
pub fn decode_response(datagram: &[u8]) -> String {
    let body = datagram.get(OOB_HEADER.len()..).unwrap_or(&[]);
    String::from_utf8_lossy(body).trim().to_string()
}

struct Pending {
    seq: u64,
    resolve: oneshot::Sender<String>,
}

/// Client for the connectionless remote console protocol.
///
/// Methods take `&self`; wrap the client in an `Arc` to share it. The
/// single pending-exchange slot is the whole correlation state.
pub struct RconClient {
    socket: Arc<UdpSocket>,
    password: String,
    timeout: Duration,
    pending: Arc<Mutex<Option<Pending>>>,
    next_seq: AtomicU64,
    recv_task: tokio::task::JoinHandle<()>,
}

impl RconClient {
    /// Bind an ephemeral socket aimed at the server and start the
    /// receive loop.
    pub async fn connect(config: RconConfig) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| ConsoleError::TransportError(format!("bind failed: {e}")))?;
        socket
            .connect((config.host.as_str(), config.port))
            .await
            .map_err(|e| {
                ConsoleError::TransportError(format!(
                    "connect to {}:{} failed: {e}",
                    config.host, config.port
                ))
            })?;

        let socket = Arc::new(socket);
        let pending: Arc<Mutex<Option<Pending>>> = Arc::new(Mutex::new(None));
        let recv_task = tokio::spawn(recv_loop(socket.clone(), pending.clone()));

        Ok(Self {
            socket,
            password: config.password,
            timeout: config.timeout,
            pending,
            next_seq: AtomicU64::new(1),
            recv_task,
        })
    }

    /// Send a console command and wait for the reply.
    ///
    /// Resolves to `Ok(Some(text))` on a response, `Ok(None)` when the
    /// window elapses with no datagram (not an error), and `Err` when the
    /// transmit itself fails. A send that overlaps an unresolved exchange
    /// takes over the pending slot; the earlier caller still waits out
    /// its own window and then sees `Ok(None)`.
    pub async fn send(&self, command: &str) -> Result<Option<String>> {
        let packet = encode_request(&self.password, command);
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let (resolve, response) = oneshot::channel();

        {
            let mut slot = self.pending.lock().await;
            if slot.is_some() {
                debug!("replacing pending exchange; previous sender will time out");
            }
            *slot = Some(Pending { seq, resolve });
        }

        if let Err(e) = self.socket.send(&packet).await {
            self.clear_own_slot(seq).await;
            return Err(ConsoleError::TransportError(format!(
                "rcon send failed: {e}"
            )));
        }

        let deadline = Instant::now() + self.timeout;
        match timeout_at(deadline, response).await {
            Ok(Ok(text)) => Ok(Some(text)),
            // Our resolver was replaced by a newer send. No datagram can
            // be attributed to this exchange anymore, but the caller
            // still observes a full response window before the miss.
            Ok(Err(_)) => {
                sleep_until(deadline).await;
                Ok(None)
            }
            Err(_) => {
                self.clear_own_slot(seq).await;
                Ok(None)
            }
        }
    }

    /// Clear the pending slot, but only if it still belongs to `seq`.
    async fn clear_own_slot(&self, seq: u64) {
        let mut slot = self.pending.lock().await;
        if slot.as_ref().is_some_and(|p| p.seq == seq) {
            *slot = None;
        }
    }

    /// Release the socket. Best-effort; repeated calls are harmless.
    pub fn close(&self) {
        self.recv_task.abort();
    }
}

impl Drop for RconClient {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

async fn recv_loop(socket: Arc<UdpSocket>, pending: Arc<Mutex<Option<Pending>>>) {
    let mut buf = [0u8; 8192];
    loop {
        match socket.recv(&mut buf).await {
            Ok(n) => match pending.lock().await.take() {
                Some(p) => {
                    let _ = p.resolve.send(decode_response(&buf[..n]));
                }
                None => debug!("datagram with no pending exchange; discarded"),
            },
            // On a connected UDP socket an ICMP rejection surfaces here;
            // the server may simply not be up yet. Keep listening.
            Err(e) => warn!("rcon socket error: {e}"),
        }
    }
}
