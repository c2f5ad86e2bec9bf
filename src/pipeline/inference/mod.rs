pub mod types;
pub mod ollama;
pub mod mock;

pub use types::*;
pub use ollama::*;
pub use mock::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("Inference backend is not reachable at {0}")]
    Connection(String),

    #[error("Inference timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Inference backend returned error (status {status}): {body}")]
    Backend { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Model not installed on the inference backend: {0}")]
    ModelNotFound(String),

    #[error("Inference backend returned an empty response")]
    EmptyResponse,

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Inference service has been shut down")]
    ServiceStopped,

    #[error("Internal lock error")]
    LockPoisoned,
}
