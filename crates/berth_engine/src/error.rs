//! Error types for the engine boundary.

use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while talking to the container engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Docker API error: {0}")]
    Api(#[from] bollard::errors::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("VM bootstrap failed: {0}")]
    VmBootstrap(String),

    #[error("Container wait ended without a status")]
    WaitInterrupted,

    #[error("Engine unavailable: {0}")]
    Unavailable(String),
}
