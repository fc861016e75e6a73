//! Container engine trait and the neutral descriptor types it consumes.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;

/// One message from a streaming image pull, possibly carrying an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullProgress {
    /// Human-readable progress status, if the engine sent one.
    pub status: Option<String>,
    /// Error text; a set error aborts the pull on the consumer side.
    pub error: Option<String>,
}

/// A host directory bind-mounted into the container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindMount {
    /// Host path to mount
    pub source: PathBuf,
    /// Container path to mount to
    pub target: String,
    /// Whether the mount is read-only
    pub read_only: bool,
}

impl BindMount {
    pub fn new(source: PathBuf, target: impl Into<String>) -> Self {
        Self {
            source,
            target: target.into(),
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// Host-level settings applied when the container is created.
///
/// The launcher builds the default (all exposed ports published to
/// ephemeral host ports); a container variant may customize it before
/// creation is issued.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostSettings {
    /// Publish all exposed container ports to ephemeral host ports.
    pub publish_all_ports: bool,
    /// Bind mounts.
    pub binds: Vec<BindMount>,
    /// Network mode (e.g. "bridge", "host").
    pub network_mode: Option<String>,
}

/// Creation descriptor for one container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Full image reference (`name:tag`).
    pub image: String,
    /// Command to run; empty means the image default.
    pub cmd: Vec<String>,
    /// Environment variables.
    pub env: HashMap<String, String>,
    /// TCP ports the container exposes.
    pub exposed_ports: Vec<u16>,
    /// Host-level settings.
    pub host: HostSettings,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            cmd: Vec::new(),
            env: HashMap::new(),
            exposed_ports: Vec::new(),
            host: HostSettings::default(),
        }
    }
}

/// Runtime info fetched after a container has started.
///
/// The assigned name and the host-port mapping are only known once the
/// engine has started the container.
#[derive(Debug, Clone, Default)]
pub struct ContainerRuntimeInfo {
    /// Engine-assigned display name, without the leading slash.
    pub name: String,
    /// Container port to ephemeral host port.
    pub mapped_ports: HashMap<u16, u16>,
}

/// Abstract interface to the container engine.
///
/// Covers exactly the operations the lifecycle core needs; the wire
/// protocol behind it (HTTP/TLS, auth) is the implementation's concern.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Repo tags of locally known images matching the name filter.
    async fn image_tags(&self, name: &str) -> EngineResult<Vec<String>>;

    /// Start a streaming pull of `name:tag`.
    async fn pull_image(
        &self,
        name: &str,
        tag: &str,
    ) -> EngineResult<BoxStream<'static, EngineResult<PullProgress>>>;

    /// Create a container, returning the engine-assigned id.
    async fn create_container(&self, name: &str, spec: &ContainerSpec) -> EngineResult<String>;

    /// Start a created container.
    async fn start_container(&self, id: &str) -> EngineResult<()>;

    /// Fetch runtime info for a started container.
    async fn inspect_container(&self, id: &str) -> EngineResult<ContainerRuntimeInfo>;

    /// Block until the container exits, returning its exit status.
    async fn wait_container(&self, id: &str) -> EngineResult<i64>;

    /// Kill a running container.
    async fn kill_container(&self, id: &str) -> EngineResult<()>;

    /// Remove a container.
    async fn remove_container(&self, id: &str, force: bool) -> EngineResult<()>;
}
