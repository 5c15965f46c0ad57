//! `forager-node-sdk` — Embeddable SDK for turning a host application into
//! a forager node.
//!
//! A "node" is any process that keeps a WebSocket open to the forager
//! control plane, accepts render/scrape tasks over it, executes them
//! through the host's page renderer, and uploads the harvested artifacts.
//! This crate provides the connection/dispatch core so hosts only supply
//! the renderer (and, optionally, storage and delivery): connection
//! lifecycle, liveness probing, bounded reconnection, durable rate
//! limiting, device identity, and the task pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  Your host (desktop app / CLI / service)                   │
//! │                                                            │
//! │   let node = ForagerNodeBuilder::new()                     │
//! │       .key("pk_live_abc")                                  │
//! │       .store(Arc::new(JsonFileStore::open(path)?))         │
//! │       .renderer(Arc::new(MyWebviewRenderer::new()))        │
//! │       .build()?;                                           │
//! │                                                            │
//! │   node.set_opted_in(true)?;                                │
//! │   node.start(None)?;                                       │
//! │   let mut events = node.subscribe();                       │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Connection flow (hard-coded by the SDK)
//!
//! 1. Check consent and the persisted daily quota
//! 2. Probe download bandwidth (best effort)
//! 3. Connect WS with `device_id`, `version`, `platform` query params
//! 4. Main loop:
//!    - WS ping at a fixed interval; no pong within the deadline kills
//!      the connection
//!    - `heartbeat` messages reset liveness
//!    - `batch` directives are surfaced as events with a bounded
//!      parallelism hint
//!    - task messages consume quota, then run one at a time through the
//!      executor
//! 5. On involuntary disconnect: reconnect with a fixed delay, bounded
//!    attempts; voluntary disconnects stay closed

pub mod bandwidth;
pub mod builder;
pub mod events;
pub mod executor;
pub mod identity;
pub mod manager;
pub mod node;
pub mod ratelimit;
pub mod reconnect;
pub mod renderer;
pub mod stitch;
pub mod store;
pub mod transform;
pub mod upload;

/// Version string reported in the connect URL.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::ForagerNodeBuilder;
pub use events::{AgentEvent, EventReceiver, EventSender};
pub use executor::TaskExecutor;
pub use identity::IdentityProvider;
pub use manager::{ConnectionManager, ConnectionState};
pub use node::ForagerNode;
pub use ratelimit::RateLimiter;
pub use reconnect::ReconnectPolicy;
pub use renderer::{CommandOutput, PageCommand, PageSession, Renderer, StaticRenderer};
pub use store::{JsonFileStore, MemoryStore, SettingsStore};
pub use transform::{HtmlTransformer, MarkdownTransformer};
pub use upload::{CompletionReport, HarvestArtifacts, HttpUploader, Uploader};

// Re-export the domain and protocol types hosts touch, so embedding a node
// rarely needs the sibling crates directly.
pub use forager_domain::{AgentConfig, Error, Result};
pub use forager_protocol::{BatchDirective, PageAction, TaskDescriptor, WindowSize};
