use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("browser init error: {0}")]
    BrowserInit(String),

    #[error("navigation error: {0}")]
    Navigation(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("script eval error: {0}")]
    Eval(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("empty response for product {0}")]
    EmptyResponse(String),

    #[error("location mismatch: expected {expected:?}, got {actual:?}")]
    LocationMismatch {
        expected: String,
        actual: Option<String>,
    },

    #[error("missing dump file: {0}")]
    MissingDump(PathBuf),

    #[error("exceeded max retries ({0}), fetch aborted")]
    RetriesExhausted(u32),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
