//! Control-plane protocol: inbound message classification, task descriptors,
//! batch directives, and page actions.
//!
//! The control plane speaks loose JSON over the WebSocket. This crate turns
//! each frame into a typed [`ControlMessage`] at the boundary so the rest of
//! the SDK never handles raw maps. Field names follow the wire protocol
//! (`recordID`, `waitBeforeScraping`, `screen_width`, ...), which is why most
//! structs here carry serde renames.

pub mod action;
pub mod batch;
pub mod message;
pub mod task;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use action::{FormField, PageAction, ScrollDirection};
pub use batch::BatchDirective;
pub use message::ControlMessage;
pub use task::{TaskDescriptor, WindowSize};
