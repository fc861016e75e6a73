//! # berth_core
//!
//! Throwaway test-container lifecycle orchestration.
//!
//! A [`Container`] backs an automated test with a single externally-run
//! container: `start()` acquires the image, creates and starts the
//! container, and waits for it to become ready; a background watcher
//! flags unexpected termination; `stop()` (explicit, or via the
//! process-exit shutdown guard) releases it best-effort and
//! idempotently.
//!
//! # Example
//!
//! ```rust,no_run
//! use berth_core::{Container, GenericImage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = GenericImage::new("nginx").with_liveness_port(80);
//!     let mut container = Container::new(image);
//!
//!     container.start().await?;
//!     let http_port = container.image().mapped_port(80);
//!     println!("nginx is up on host port {:?}", http_port);
//!
//!     container.stop().await;
//!     Ok(())
//! }
//! ```

pub mod container;
pub mod error;
pub mod fs;
pub mod image;
pub mod readiness;
mod shutdown;
pub mod variant;

pub use container::{Container, ContainerState};
pub use error::{ContainerError, ContainerFault, ContainerResult};
pub use fs::{volume_directory, VolumeDir};
pub use image::{ensure_image_present, ImageRef};
pub use readiness::{wait_for_listening_port, ProbeSettings};
pub use variant::{ContainerImage, GenericImage};

pub use berth_engine::{
    BindMount, ContainerEngine, ContainerRuntimeInfo, ContainerSpec, DockerEngine, EngineError,
    HostEnvironment, HostSettings, MockEngine, PullProgress,
};
