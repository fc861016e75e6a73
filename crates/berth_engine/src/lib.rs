//! # berth_engine
//!
//! Container engine boundary for berth.
//!
//! This crate defines the abstract [`ContainerEngine`] interface the
//! lifecycle core drives, a Docker implementation backed by bollard, the
//! host environment resolver (local socket vs. secured helper-VM
//! endpoint), and a capturing [`MockEngine`] for tests.

pub mod docker;
pub mod engine;
pub mod env;
pub mod error;
pub mod mock;

pub use docker::DockerEngine;
pub use engine::{
    BindMount, ContainerEngine, ContainerRuntimeInfo, ContainerSpec, HostSettings, PullProgress,
};
pub use env::{certificate_dir, EngineConfig, EngineEndpoint, HostEnvironment};
pub use error::{EngineError, EngineResult};
pub use mock::MockEngine;
