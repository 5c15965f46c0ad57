/// Shared error type used across all forager crates.
///
/// Only `Config` is fatal to the SDK; everything else is recovered from,
/// logged, or scoped to a single task.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("connection: {0}")]
    Connection(String),

    #[error("protocol: {0}")]
    Protocol(String),

    #[error("store: {0}")]
    Store(String),

    #[error("render: {0}")]
    Render(String),

    #[error("upload: {0}")]
    Upload(String),

    #[error("task timed out after {0}ms")]
    TaskTimeout(u64),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
