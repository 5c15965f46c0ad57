//! SDK facade — consent, lifecycle, and the event channel.
//!
//! `ForagerNode` is what hosts embed. It holds the wired collaborators
//! (store, identity, connection manager) and keeps its own surface thin:
//! consent is a persisted flag, `start`/`stop` delegate to the connection
//! manager, and everything observable flows through the broadcast channel.

use std::sync::Arc;

use forager_domain::{AgentConfig, Result};

use crate::events::{EventReceiver, EventSender};
use crate::identity::IdentityProvider;
use crate::manager::{ConnectionManager, ConnectionState};
use crate::renderer::Renderer;
use crate::store::{self, SettingsStore};
use crate::SDK_VERSION;

/// An embeddable forager node.
///
/// Create via [`ForagerNodeBuilder`](crate::ForagerNodeBuilder), or
/// [`ForagerNode::new`] when the default collaborators suffice.
pub struct ForagerNode {
    config: AgentConfig,
    store: Arc<dyn SettingsStore>,
    identity: IdentityProvider,
    manager: Arc<ConnectionManager>,
    events: EventSender,
}

impl std::fmt::Debug for ForagerNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForagerNode")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ForagerNode {
    /// Shorthand for the common case: configuration plus the host's
    /// renderer, everything else defaulted.
    pub fn new(config: AgentConfig, renderer: Arc<dyn Renderer>) -> Result<Self> {
        crate::ForagerNodeBuilder::new()
            .config(config)
            .renderer(renderer)
            .build()
    }

    /// Start a new builder.
    pub fn builder() -> crate::ForagerNodeBuilder {
        crate::ForagerNodeBuilder::new()
    }

    pub(crate) fn assemble(
        config: AgentConfig,
        store: Arc<dyn SettingsStore>,
        identity: IdentityProvider,
        manager: Arc<ConnectionManager>,
        events: EventSender,
    ) -> Self {
        Self {
            config,
            store,
            identity,
            manager,
            events,
        }
    }

    // ── consent ──────────────────────────────────────────────────────

    /// Whether the user has opted in to background work. Defaults to
    /// `false` until consent is recorded.
    pub fn opted_in(&self) -> bool {
        self.store
            .get(store::KEY_OPTED_IN)
            .map(|v| v == "true")
            .unwrap_or(false)
    }

    /// Persist the consent flag. Revoking consent while running stops
    /// the connection.
    pub fn set_opted_in(&self, opted_in: bool) -> Result<()> {
        self.store
            .set(store::KEY_OPTED_IN, if opted_in { "true" } else { "false" })?;
        tracing::info!(opted_in, "consent updated");
        if !opted_in {
            self.stop();
        }
        Ok(())
    }

    /// Consent-UI deep link for opting in.
    pub fn opt_in_url(&self) -> Result<String> {
        self.consent_link(&self.config.consent.opt_in_url)
    }

    /// Consent-UI deep link for reviewing settings.
    pub fn settings_url(&self) -> Result<String> {
        self.consent_link(&self.config.consent.settings_url)
    }

    fn consent_link(&self, base: &str) -> Result<String> {
        let device_id = self.identity.get_or_generate()?;
        Ok(format!(
            "{base}?key={}&device_id={device_id}",
            self.config.key
        ))
    }

    // ── lifecycle ────────────────────────────────────────────────────

    /// Connect to the control plane.
    ///
    /// Returns `Ok(false)` without side effects when not opted in;
    /// otherwise resolves the device identifier, records the optional
    /// host metadata id, and initiates the connection (the same `bool`
    /// contract as [`ConnectionManager::initialize`]). Must be called
    /// from within a Tokio runtime.
    pub fn start(&self, metadata_id: Option<&str>) -> Result<bool> {
        if !self.opted_in() {
            tracing::info!("start requested without consent, ignoring");
            return Ok(false);
        }
        if let Some(id) = metadata_id {
            self.store.set(store::KEY_METADATA_ID, id)?;
        }
        let device_id = self.identity.get_or_generate()?;
        Ok(self.manager.initialize(&device_id))
    }

    /// Voluntary disconnect. Idempotent; does not touch consent.
    pub fn stop(&self) {
        self.manager.disconnect();
    }

    // ── introspection ────────────────────────────────────────────────

    /// The persisted device identifier, created on first use.
    pub fn device_id(&self) -> Result<String> {
        self.identity.get_or_generate()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// SDK version reported to the control plane.
    pub fn version(&self) -> &'static str {
        SDK_VERSION
    }

    /// Subscribe to lifecycle and message events. Every subscriber gets
    /// its own cursor; slow subscribers may observe lag, never block the
    /// connection.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use forager_domain::ConnectionConfig;

    use crate::renderer::StaticRenderer;

    fn offline_node() -> ForagerNode {
        let mut config = AgentConfig::new("pk_test");
        config.connection = ConnectionConfig {
            ws_url: "ws://127.0.0.1:9/never".into(),
            measure_bandwidth: false,
            ..ConnectionConfig::default()
        };
        ForagerNode::new(config, Arc::new(StaticRenderer::new())).unwrap()
    }

    #[test]
    fn consent_defaults_to_false_and_round_trips() {
        let node = offline_node();
        assert!(!node.opted_in());
        node.set_opted_in(true).unwrap();
        assert!(node.opted_in());
        node.set_opted_in(false).unwrap();
        assert!(!node.opted_in());
    }

    #[tokio::test]
    async fn start_without_consent_is_a_no_op() {
        let node = offline_node();
        assert!(!node.start(None).unwrap());
        assert_eq!(node.connection_state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn start_with_consent_initiates_a_connection() {
        let node = offline_node();
        node.set_opted_in(true).unwrap();
        assert!(node.start(Some("host-42")).unwrap());
        assert_eq!(
            node.store.get(store::KEY_METADATA_ID).as_deref(),
            Some("host-42")
        );
        node.stop();
    }

    #[test]
    fn consent_links_carry_key_and_device_id() {
        let node = offline_node();
        let url = node.opt_in_url().unwrap();
        assert!(url.contains("key=pk_test"));
        assert!(url.contains("device_id=frgr_pk_test_"));

        let settings = node.settings_url().unwrap();
        assert!(settings.contains("key=pk_test"));
    }

    #[test]
    fn device_id_is_stable() {
        let node = offline_node();
        assert_eq!(node.device_id().unwrap(), node.device_id().unwrap());
    }
}
