//! Typed lifecycle events, fanned out to hosts over a broadcast channel.

use forager_protocol::BatchDirective;
use serde_json::Value;
use tokio::sync::broadcast;

/// What a host can observe about the running node.
///
/// Subscribe via `ForagerNode::subscribe`. Slow subscribers miss events
/// (broadcast semantics) rather than backpressuring the connection.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// The socket opened and the node is serving.
    Connected { device_id: String },
    /// The socket closed. `voluntary` distinguishes a host-requested stop
    /// from a drop; only involuntary closes trigger reconnection.
    Disconnected { voluntary: bool },
    /// A frame the SDK classified but did not consume itself.
    Message(Value),
    /// A batch announcement. Running the batch is the host's job; the
    /// directive carries the concurrency bound it must respect.
    BatchReceived {
        directive: BatchDirective,
        payload: Value,
    },
    /// A non-fatal error the SDK already handled (logged, recovered, or
    /// dropped), surfaced for observability.
    Error { message: String },
}

pub type EventSender = broadcast::Sender<AgentEvent>;
pub type EventReceiver = broadcast::Receiver<AgentEvent>;

/// Capacity of the event channel. Events are small and hosts are expected
/// to drain promptly; older events are dropped for laggards.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

pub fn channel() -> EventSender {
    broadcast::channel(EVENT_CHANNEL_CAPACITY).0
}
