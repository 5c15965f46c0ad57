//! `forager-domain` — Shared configuration and error types for the forager SDK.
//!
//! Everything in this crate is plain data: no IO, no runtime. The SDK crates
//! depend on it so a host application can construct, serialize, and validate
//! configuration without pulling in any of the connection machinery.

pub mod config;
pub mod error;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use config::{
    AgentConfig, ConnectionConfig, ConsentConfig, ExecutorConfig, RateLimitConfig, UploadConfig,
};
pub use error::{Error, Result};
