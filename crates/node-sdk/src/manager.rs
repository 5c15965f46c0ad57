//! Connection manager — owns the WebSocket lifecycle, liveness probing,
//! and dispatch of inbound control messages to the task executor.
//!
//! At most one logical connection exists per manager. `initialize` spawns
//! a connection actor on the Tokio runtime; the actor dials, runs a
//! `tokio::select!` loop over inbound frames, the ping interval, and the
//! pong deadline, and reconnects with a fixed delay after involuntary
//! closes. `disconnect` cancels the actor through a
//! [`CancellationToken`] and suppresses reconnection via a dedicated
//! voluntary-close flag.
//!
//! Task execution is serialized through a one-permit semaphore so the
//! read loop keeps draining frames while at most one task runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use forager_domain::{ConnectionConfig, Error, Result};
use forager_protocol::{ControlMessage, TaskDescriptor};

use crate::bandwidth;
use crate::events::{AgentEvent, EventSender};
use crate::executor::TaskExecutor;
use crate::ratelimit::RateLimiter;
use crate::reconnect::ReconnectPolicy;

/// Tasks in flight at once. The socket is never blocked by a running
/// task; later tasks queue on the permit.
const MAX_TASKS_IN_FLIGHT: usize = 1;

/// Lifecycle of the managed connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ConnectionManager {
    config: ConnectionConfig,
    limiter: RateLimiter,
    executor: Arc<TaskExecutor>,
    events: EventSender,
    http: reqwest::Client,

    state: Mutex<ConnectionState>,
    /// Held for the whole lifetime of the connection actor, so a second
    /// `initialize` cannot spawn a duplicate.
    busy: AtomicBool,
    /// Set by `disconnect` (and by the rate-limit close) to keep the
    /// close handler from scheduling a reconnect.
    voluntary: AtomicBool,
    shutdown: Mutex<Option<CancellationToken>>,
    task_permits: Arc<Semaphore>,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        limiter: RateLimiter,
        executor: Arc<TaskExecutor>,
        events: EventSender,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Connection(e.to_string()))?;

        Ok(Self {
            config,
            limiter,
            executor,
            events,
            http,
            state: Mutex::new(ConnectionState::Idle),
            busy: AtomicBool::new(false),
            voluntary: AtomicBool::new(false),
            shutdown: Mutex::new(None),
            task_permits: Arc::new(Semaphore::new(MAX_TASKS_IN_FLIGHT)),
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    // ── public operations ────────────────────────────────────────────

    /// Start (or confirm) the connection for `device_id`.
    ///
    /// Returns `true` if already open, or once a new connection attempt
    /// has been initiated; confirmation arrives as
    /// [`AgentEvent::Connected`]. Returns `false` when an attempt is
    /// already in flight or the daily quota is exhausted. Must be called
    /// from within a Tokio runtime.
    pub fn initialize(self: &Arc<Self>, device_id: &str) -> bool {
        if self.state() == ConnectionState::Open {
            return true;
        }
        if self.busy.swap(true, Ordering::SeqCst) {
            tracing::debug!(device_id, "connection attempt already in flight");
            return false;
        }
        // Checked without consuming quota.
        if !self.limiter.should_continue(false) {
            tracing::warn!(device_id, "daily quota exhausted, not connecting");
            self.busy.store(false, Ordering::SeqCst);
            return false;
        }

        self.voluntary.store(false, Ordering::SeqCst);
        *self.state.lock() = ConnectionState::Connecting;

        let shutdown = CancellationToken::new();
        *self.shutdown.lock() = Some(shutdown.clone());

        let manager = Arc::clone(self);
        let device_id = device_id.to_string();
        tokio::spawn(async move {
            manager.run_actor(device_id, shutdown).await;
        });
        true
    }

    /// Voluntary close: cancel the actor and suppress reconnection.
    /// Idempotent.
    pub fn disconnect(&self) {
        self.voluntary.store(true, Ordering::SeqCst);
        let token = self.shutdown.lock().take();
        if let Some(token) = token {
            {
                let mut state = self.state.lock();
                if *state == ConnectionState::Open {
                    *state = ConnectionState::Closing;
                }
            }
            token.cancel();
            tracing::info!("voluntary disconnect requested");
        }
    }

    // ── connection actor ─────────────────────────────────────────────

    async fn run_actor(self: Arc<Self>, device_id: String, shutdown: CancellationToken) {
        let policy = ReconnectPolicy::from_config(&self.config);
        let mut attempt: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let result = tokio::select! {
                r = self.connect_once(&device_id, &shutdown) => r,
                () = shutdown.cancelled() => {
                    tracing::info!(device_id = %device_id, "disconnect requested");
                    break;
                }
            };

            match result {
                Ok(()) => {
                    // The previous dial reached Open, so the next outage
                    // gets a fresh attempt budget.
                    attempt = 0;
                    self.note_closed();
                }
                Err(e) => {
                    tracing::warn!(
                        device_id = %device_id,
                        attempt,
                        error = %e,
                        "connection attempt failed"
                    );
                    let _ = self.events.send(AgentEvent::Error {
                        message: e.to_string(),
                    });
                    self.note_closed();
                }
            }

            if self.voluntary.load(Ordering::SeqCst) || shutdown.is_cancelled() {
                break;
            }
            if policy.should_give_up(attempt) {
                tracing::error!(
                    device_id = %device_id,
                    attempts = attempt,
                    "reconnect attempts exhausted"
                );
                break;
            }

            tracing::info!(
                device_id = %device_id,
                delay_ms = policy.delay.as_millis() as u64,
                attempt = attempt + 1,
                "reconnecting"
            );
            tokio::select! {
                _ = tokio::time::sleep(policy.delay) => {}
                () = shutdown.cancelled() => break,
            }
            attempt += 1;
        }

        self.note_closed();
        self.shutdown.lock().take();
        self.busy.store(false, Ordering::SeqCst);
    }

    /// Record the transition to `Closed` and emit `Disconnected` if the
    /// socket had actually opened. Safe to call more than once per
    /// socket.
    fn note_closed(&self) {
        let was_open = {
            let mut state = self.state.lock();
            let was = matches!(*state, ConnectionState::Open | ConnectionState::Closing);
            *state = ConnectionState::Closed;
            was
        };
        if was_open {
            let voluntary = self.voluntary.load(Ordering::SeqCst);
            tracing::info!(voluntary, "connection closed");
            let _ = self.events.send(AgentEvent::Disconnected { voluntary });
        }
    }

    /// Single connection lifecycle: probe, dial, message loop.
    ///
    /// `Err` means the dial never reached `Open`; any close after a
    /// successful open (clean close, transport error, liveness timeout)
    /// returns `Ok(())` with its cause logged.
    async fn connect_once(&self, device_id: &str, shutdown: &CancellationToken) -> anyhow::Result<()> {
        let speed_mbps = if self.config.measure_bandwidth {
            bandwidth::measure_download_mbps(&self.http, &self.config.speed_probe_url).await
        } else {
            None
        };

        let url = build_connect_url(&self.config.ws_url, device_id, crate::SDK_VERSION, speed_mbps);
        tracing::info!(device_id = %device_id, endpoint = %self.config.ws_url, "connecting to control plane");

        let (ws, _response) = tokio_tungstenite::connect_async(&url).await?;
        let (mut sink, mut stream) = ws.split();

        *self.state.lock() = ConnectionState::Open;
        tracing::info!(device_id = %device_id, "connection open");
        let _ = self.events.send(AgentEvent::Connected {
            device_id: device_id.to_string(),
        });

        let mut ping = tokio::time::interval(Duration::from_secs(self.config.ping_interval_secs));
        let pong_timeout = Duration::from_secs(self.config.pong_timeout_secs);

        // Armed after each ping, disarmed by a pong or a heartbeat.
        let liveness = tokio::time::sleep(Duration::from_secs(0));
        tokio::pin!(liveness);
        liveness.as_mut().reset(far_future());

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
                _ = ping.tick() => {
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        tracing::warn!("ping send failed, treating connection as closed");
                        return Ok(());
                    }
                    liveness.as_mut().reset(tokio::time::Instant::now() + pong_timeout);
                }
                () = &mut liveness => {
                    tracing::warn!(
                        timeout_secs = self.config.pong_timeout_secs,
                        "no pong within deadline, closing dead connection"
                    );
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
                frame = stream.next() => {
                    match frame {
                        None => {
                            tracing::info!("socket ended");
                            return Ok(());
                        }
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "socket error");
                            return Ok(());
                        }
                        Some(Ok(Message::Pong(_))) => {
                            tracing::trace!("pong received");
                            liveness.as_mut().reset(far_future());
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = sink.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("control plane closed connection");
                            return Ok(());
                        }
                        Some(Ok(Message::Text(text))) => {
                            match ControlMessage::classify(&text) {
                                Ok(ControlMessage::Heartbeat) => {
                                    tracing::trace!("heartbeat");
                                    liveness.as_mut().reset(far_future());
                                }
                                Ok(ControlMessage::Batch { directive, raw }) => {
                                    tracing::info!(
                                        batch_id = %directive.batch_id,
                                        parallelism = directive.effective_parallelism(),
                                        fetch = directive.is_fetch(),
                                        "batch directive received"
                                    );
                                    let _ = self.events.send(AgentEvent::BatchReceived {
                                        directive,
                                        payload: raw,
                                    });
                                }
                                Ok(ControlMessage::Task { task, rate_exempt }) => {
                                    if !rate_exempt && !self.limiter.should_continue(true) {
                                        tracing::warn!(
                                            device_id = %device_id,
                                            "rate limit exhausted, closing connection"
                                        );
                                        self.voluntary.store(true, Ordering::SeqCst);
                                        let _ = sink.send(Message::Close(None)).await;
                                        return Ok(());
                                    }
                                    self.dispatch(task);
                                }
                                Ok(ControlMessage::Other(value)) => {
                                    let _ = self.events.send(AgentEvent::Message(value));
                                }
                                Err(e) => {
                                    tracing::warn!(error = %e, "malformed control message dropped");
                                    let _ = self.events.send(AgentEvent::Error {
                                        message: e.to_string(),
                                    });
                                }
                            }
                        }
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }

    /// Hand a task to the executor without blocking the read loop.
    /// Execution failures are logged and reported as events; they never
    /// affect connection state.
    fn dispatch(&self, task: TaskDescriptor) {
        let executor = Arc::clone(&self.executor);
        let events = self.events.clone();
        let permits = Arc::clone(&self.task_permits);

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            match executor.process(&task).await {
                Ok(report) => {
                    tracing::info!(record_id = %report.record_id, "task completed");
                }
                Err(e) => {
                    tracing::warn!(record_id = %task.record_id, error = %e, "task failed");
                    let _ = events.send(AgentEvent::Error {
                        message: e.to_string(),
                    });
                }
            }
        });
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// URL assembly
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Build the connect URL with identification query parameters. The
/// bandwidth sample is appended only when the probe succeeded.
fn build_connect_url(
    base: &str,
    device_id: &str,
    version: &str,
    speed_mbps: Option<f64>,
) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    let mut url = format!(
        "{base}{sep}device_id={device_id}&version={version}&platform={}",
        platform_tag()
    );
    if let Some(mbps) = speed_mbps {
        url.push_str(&format!("&speed_download={mbps:.2}"));
    }
    url
}

fn platform_tag() -> &'static str {
    match std::env::consts::OS {
        "macos" => "agent-macos",
        "windows" => "agent-windows",
        _ => "agent-linux",
    }
}

fn far_future() -> tokio::time::Instant {
    // Effectively "disarmed"; well within tokio's sleep horizon.
    tokio::time::Instant::now() + Duration::from_secs(86_400 * 365)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
