//! Error types for the lifecycle core.

use berth_engine::EngineError;
use thiserror::Error;

/// Result type alias for container lifecycle operations.
pub type ContainerResult<T> = Result<T, ContainerError>;

/// Errors that can occur while starting a container.
///
/// `stop` never surfaces errors; cleanup failures are logged and
/// swallowed because the container may already be gone.
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Image not found: {image}: {detail}")]
    ImageNotFound { image: String, detail: String },

    #[error("Image pull failed: {image}: {detail}")]
    ImagePullFailed { image: String, detail: String },

    #[error("Could not create/start container: {0}")]
    Launch(#[from] EngineError),

    #[error("Timed out waiting for container port to open ({addr}:{port} should be listening)")]
    ReadinessTimeout { addr: String, port: u16 },

    #[error("start() may only be called once per container instance")]
    AlreadyStarted,
}

/// Out-of-band fault raised by the termination watcher.
///
/// Raised when the container exits without `stop` being the cause. It
/// runs off the caller's call stack, so it is delivered through the
/// handle's fault channel and the structured log rather than as a
/// returned error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerFault {
    /// Engine-assigned container id.
    pub container_id: String,
    /// Display name, if it was fetched before the exit.
    pub container_name: Option<String>,
    /// What happened.
    pub message: String,
}

impl std::fmt::Display for ContainerFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.container_name {
            Some(name) => write!(f, "{} ({}): {}", self.container_id, name, self.message),
            None => write!(f, "{}: {}", self.container_id, self.message),
        }
    }
}
