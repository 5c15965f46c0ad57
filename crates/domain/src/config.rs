use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for one embedded forager node.
///
/// Every field except `key` has a working default; `key` is the publishable
/// key handed out when the embedding application registers, and an empty key
/// is a fatal configuration error caught by [`AgentConfig::validate`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    /// Publishable key identifying the embedding application.
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub limits: RateLimitConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub consent: ConsentConfig,
}

impl AgentConfig {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }

    /// Rejects configurations that can never reach the control plane.
    pub fn validate(&self) -> Result<()> {
        if self.key.trim().is_empty() {
            return Err(Error::Config("publishable key is empty".into()));
        }
        if self.connection.ws_url.trim().is_empty() {
            return Err(Error::Config("connection.ws_url is empty".into()));
        }
        if self.connection.pong_timeout_secs >= self.connection.ping_interval_secs {
            return Err(Error::Config(
                "connection.pong_timeout_secs must be shorter than ping_interval_secs".into(),
            ));
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Control-plane connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// WebSocket endpoint of the control plane.
    #[serde(default = "d_ws_url")]
    pub ws_url: String,
    /// Liveness ping cadence once the socket is open.
    #[serde(default = "d_60")]
    pub ping_interval_secs: u64,
    /// How long after a ping the pong must arrive before the connection is
    /// declared dead. Must be shorter than the ping interval.
    #[serde(default = "d_5u")]
    pub pong_timeout_secs: u64,
    /// Fixed delay between reconnection attempts.
    #[serde(default = "d_5000")]
    pub reconnect_delay_ms: u64,
    /// Reconnection attempts before giving up (caller must re-initialize).
    #[serde(default = "d_5")]
    pub max_reconnect_attempts: u32,
    /// Measure downlink bandwidth before connecting and report it as a
    /// query parameter. Skipped silently when the probe fails.
    #[serde(default = "d_true")]
    pub measure_bandwidth: bool,
    /// Download endpoint used for the bandwidth probe.
    #[serde(default = "d_probe_url")]
    pub speed_probe_url: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            ws_url: d_ws_url(),
            ping_interval_secs: 60,
            pong_timeout_secs: 5,
            reconnect_delay_ms: 5000,
            max_reconnect_attempts: 5,
            measure_bandwidth: true,
            speed_probe_url: d_probe_url(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rate limiting
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Tasks accepted per rolling window.
    #[serde(default = "d_1000")]
    pub max_per_window: u32,
    /// Window length. The counter resets the first time a check happens
    /// after the window has elapsed.
    #[serde(default = "d_86400")]
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_window: 1000,
            window_secs: 86_400,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task execution
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Wall-clock budget for one task, before the task's own settle delay
    /// is added on top.
    #[serde(default = "d_60")]
    pub base_timeout_secs: u64,
    /// Pause after each scroll step of a full-page capture, letting lazy
    /// content load before the viewport is grabbed.
    #[serde(default = "d_1000ms")]
    pub scroll_settle_ms: u64,
    /// Upper bound on scroll steps for a full-page capture.
    #[serde(default = "d_20")]
    pub max_scroll_steps: u32,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            base_timeout_secs: 60,
            scroll_settle_ms: 1000,
            max_scroll_steps: 20,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Artifact upload
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Endpoint returning pre-signed PUT targets for a record.
    #[serde(default = "d_signed_url")]
    pub signed_url_endpoint: String,
    /// Endpoint receiving the completion report.
    #[serde(default = "d_report_url")]
    pub report_endpoint: String,
    /// Per-request HTTP timeout.
    #[serde(default = "d_30")]
    pub request_timeout_secs: u64,
    /// Retries on transient (5xx / transport) failures.
    #[serde(default = "d_2")]
    pub max_retries: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            signed_url_endpoint: d_signed_url(),
            report_endpoint: d_report_url(),
            request_timeout_secs: 30,
            max_retries: 2,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Consent UI links
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Deep links into the hosted consent pages. The SDK only builds the URLs;
/// opening them is the host's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentConfig {
    #[serde(default = "d_opt_in_url")]
    pub opt_in_url: String,
    #[serde(default = "d_settings_url")]
    pub settings_url: String,
}

impl Default for ConsentConfig {
    fn default() -> Self {
        Self {
            opt_in_url: d_opt_in_url(),
            settings_url: d_settings_url(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Default value helpers (serde)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn d_ws_url() -> String {
    "wss://gw.forager.dev/v1/agent".into()
}
fn d_probe_url() -> String {
    "https://speed.cloudflare.com/__down?bytes=10000000".into()
}
fn d_signed_url() -> String {
    "https://api.forager.dev/v1/uploads".into()
}
fn d_report_url() -> String {
    "https://api.forager.dev/v1/complete".into()
}
fn d_opt_in_url() -> String {
    "https://forager.dev/opt-in".into()
}
fn d_settings_url() -> String {
    "https://forager.dev/settings".into()
}
fn d_60() -> u64 {
    60
}
fn d_5u() -> u64 {
    5
}
fn d_5000() -> u64 {
    5000
}
fn d_5() -> u32 {
    5
}
fn d_true() -> bool {
    true
}
fn d_1000() -> u32 {
    1000
}
fn d_86400() -> u64 {
    86_400
}
fn d_1000ms() -> u64 {
    1000
}
fn d_20() -> u32 {
    20
}
fn d_30() -> u64 {
    30
}
fn d_2() -> u32 {
    2
}
