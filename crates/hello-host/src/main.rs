//! Reference host embedding the forager node SDK.
//!
//! Builds a node around the built-in static renderer, opts in, connects
//! to a control plane, and prints lifecycle events until Ctrl-C. Tasks
//! resolve against canned HTML instead of a real page engine, which
//! makes this binary useful for exercising the connection lifecycle
//! against a development control plane.
//!
//! Usage:
//!   FORAGER_KEY=pk_dev forager-hello-host [ws-url]
//!
//! Env vars:
//!   FORAGER_KEY          — configuration key (default: "pk_demo")
//!   FORAGER_STATE_FILE   — settings store path (default: "forager-state.json")

use std::sync::Arc;

use forager_node_sdk::{AgentConfig, AgentEvent, ForagerNodeBuilder, JsonFileStore, StaticRenderer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let key = std::env::var("FORAGER_KEY").unwrap_or_else(|_| "pk_demo".into());
    let state_file =
        std::env::var("FORAGER_STATE_FILE").unwrap_or_else(|_| "forager-state.json".into());

    let mut config = AgentConfig::new(key);
    if let Some(ws_url) = std::env::args().nth(1) {
        config.connection.ws_url = ws_url;
    }

    let node = ForagerNodeBuilder::new()
        .config(config)
        .store(Arc::new(JsonFileStore::open(&state_file)?))
        .renderer(Arc::new(StaticRenderer::new().with_fallback(
            "<html><body><h1>Forager demo</h1>\
             <p>Served from the static renderer.</p></body></html>",
        )))
        .build()?;

    let device_id = node.device_id()?;
    let settings_url = node.settings_url()?;
    tracing::info!(
        device_id = %device_id,
        version = node.version(),
        state_file = %state_file,
        "host starting"
    );
    tracing::info!(settings_url = %settings_url, "consent settings link");

    // A headless demo has no consent UI, so opt in directly. A real host
    // would show the opt-in page and call this from its acceptance flow.
    node.set_opted_in(true)?;
    if !node.start(None)? {
        anyhow::bail!("node refused to start (already connecting or quota exhausted)");
    }

    let mut events = node.subscribe();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(AgentEvent::Connected { device_id }) => {
                    tracing::info!(device_id = %device_id, "connected to control plane");
                }
                Ok(AgentEvent::Disconnected { voluntary }) => {
                    tracing::info!(voluntary, "disconnected");
                    if voluntary {
                        break;
                    }
                    // Involuntary drops are retried by the SDK itself.
                }
                Ok(AgentEvent::BatchReceived { directive, .. }) => {
                    tracing::info!(
                        batch_id = %directive.batch_id,
                        parallelism = directive.effective_parallelism(),
                        "batch announced"
                    );
                }
                Ok(AgentEvent::Message(value)) => {
                    tracing::debug!(%value, "unclassified control message");
                }
                Ok(AgentEvent::Error { message }) => {
                    tracing::warn!(%message, "recovered error");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "event stream closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                node.stop();
            }
        }
    }

    Ok(())
}
