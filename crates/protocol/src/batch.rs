//! Batch directives: server-declared task groups with concurrency hints.

use std::time::Duration;

use serde::Deserialize;

/// Hard caps on how many renderer instances a batch may ask the host to run
/// in parallel. Bulk-fetch batches get the lower cap.
pub const MAX_PARALLEL_EXECUTIONS: u32 = 4;
pub const MAX_PARALLEL_EXECUTIONS_FETCH: u32 = 2;

const DEFAULT_EXECUTION_DELAY_MS: u64 = 500;

/// Concurrency envelope of a `type_event: "batch"` message. The SDK only
/// classifies and bounds these; running the batch is the host's job.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatchDirective {
    pub batch_id: String,
    #[serde(default, rename = "parallel_executions_batch")]
    requested_parallelism: Option<u32>,
    #[serde(default, rename = "type_batch")]
    batch_kind: Option<String>,
    #[serde(default, rename = "delay_between_executions")]
    delay_ms: Option<u64>,
}

impl BatchDirective {
    pub fn is_fetch(&self) -> bool {
        self.batch_kind.as_deref() == Some("fetch")
    }

    /// Requested parallelism clamped to the type-specific cap.
    pub fn effective_parallelism(&self) -> u32 {
        let cap = if self.is_fetch() {
            MAX_PARALLEL_EXECUTIONS_FETCH
        } else {
            MAX_PARALLEL_EXECUTIONS
        };
        self.requested_parallelism
            .unwrap_or(MAX_PARALLEL_EXECUTIONS)
            .min(cap)
    }

    pub fn delay_between_executions(&self) -> Duration {
        Duration::from_millis(self.delay_ms.unwrap_or(DEFAULT_EXECUTION_DELAY_MS))
    }
}
