//! Builder pattern for constructing a [`ForagerNode`].

use std::sync::Arc;

use forager_domain::{AgentConfig, Error, Result};

use crate::events;
use crate::executor::TaskExecutor;
use crate::identity::IdentityProvider;
use crate::manager::ConnectionManager;
use crate::node::ForagerNode;
use crate::ratelimit::RateLimiter;
use crate::renderer::Renderer;
use crate::store::{MemoryStore, SettingsStore};
use crate::transform::{HtmlTransformer, MarkdownTransformer};
use crate::upload::{HttpUploader, Uploader};

/// Fluent builder for [`ForagerNode`].
///
/// A renderer is the only collaborator without a default: rendering is the
/// host's capability. The store defaults to an in-memory one, which is fine
/// for tests and demos but loses identity and quota at restart; durable
/// deployments should pass a [`JsonFileStore`](crate::store::JsonFileStore)
/// or their own.
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use forager_node_sdk::{ForagerNodeBuilder, StaticRenderer};
/// let node = ForagerNodeBuilder::new()
///     .key("pk_live_abc")
///     .renderer(Arc::new(StaticRenderer::new()))
///     .build()
///     .unwrap();
/// ```
pub struct ForagerNodeBuilder {
    config: AgentConfig,
    store: Option<Arc<dyn SettingsStore>>,
    renderer: Option<Arc<dyn Renderer>>,
    transformer: Option<Arc<dyn HtmlTransformer>>,
    uploader: Option<Arc<dyn Uploader>>,
}

impl ForagerNodeBuilder {
    pub fn new() -> Self {
        Self {
            config: AgentConfig::default(),
            store: None,
            renderer: None,
            transformer: None,
            uploader: None,
        }
    }

    // ── Required ─────────────────────────────────────────────────────

    /// Set the configuration key identifying this deployment.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.config.key = key.into();
        self
    }

    /// Set the page renderer the executor drives.
    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    // ── Configuration ────────────────────────────────────────────────

    /// Replace the whole configuration (key included).
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    // ── Collaborators ────────────────────────────────────────────────

    /// Set the durable settings store (default: in-memory).
    pub fn store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the HTML-to-Markdown transformer (default: the built-in
    /// single-pass converter).
    pub fn transformer(mut self, transformer: Arc<dyn HtmlTransformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    /// Set the artifact delivery sink (default: HTTPS against the
    /// configured endpoints).
    pub fn uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    /// Build the [`ForagerNode`].
    pub fn build(self) -> Result<ForagerNode> {
        let config = self.config;
        config.validate()?;

        let Some(renderer) = self.renderer else {
            return Err(Error::Config("a renderer is required".into()));
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn SettingsStore>);
        let transformer = self
            .transformer
            .unwrap_or_else(|| Arc::new(MarkdownTransformer) as Arc<dyn HtmlTransformer>);
        let uploader = match self.uploader {
            Some(uploader) => uploader,
            None => Arc::new(HttpUploader::new(&config.upload)?) as Arc<dyn Uploader>,
        };

        let events = events::channel();
        let identity = IdentityProvider::new(Arc::clone(&store), config.key.clone());
        let limiter = RateLimiter::new(Arc::clone(&store), config.limits.clone());
        let executor = Arc::new(TaskExecutor::new(
            renderer,
            transformer,
            uploader,
            config.executor.clone(),
        ));
        let manager = Arc::new(ConnectionManager::new(
            config.connection.clone(),
            limiter,
            executor,
            events.clone(),
        )?);

        Ok(ForagerNode::assemble(config, store, identity, manager, events))
    }
}

impl Default for ForagerNodeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
