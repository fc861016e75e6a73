//! Per-image container variants.
//!
//! A variant supplies the image-specific details the lifecycle core is
//! deliberately ignorant of: creation config, an optional liveness port,
//! and hooks invoked at fixed points of the start sequence. Variants are
//! plain strategy values, not subclasses of the core type.

use std::collections::HashMap;

use async_trait::async_trait;
use berth_engine::{BindMount, ContainerRuntimeInfo, ContainerSpec, HostSettings};

use crate::error::ContainerResult;
use crate::readiness::{self, ProbeSettings};

/// Capability interface implemented by each container variant.
#[async_trait]
pub trait ContainerImage: Send + Sync {
    /// Image name, without a tag.
    fn name(&self) -> &str;

    /// Fill in the creation descriptor (command, env, exposed ports).
    fn configure(&self, _spec: &mut ContainerSpec) {}

    /// Adjust host-level settings after the default descriptor (all
    /// ports published) has been built, before creation is issued.
    fn customize_host_settings(&self, _host: &mut HostSettings) {}

    /// Port the contained application listens on once alive; `None`
    /// opts out of the liveness check.
    fn liveness_port(&self) -> Option<u16> {
        None
    }

    /// Notification that the container has started, carrying its runtime
    /// info. The variant can extract connection details (e.g. mapped
    /// ports) here, before readiness waiting begins.
    fn container_starting(&mut self, _info: &ContainerRuntimeInfo) {}

    /// Wait until the container is ready to serve traffic.
    ///
    /// The default polls the liveness port. A substitute strategy must
    /// still resolve to success or a deterministic timeout failure; it
    /// must not block indefinitely.
    async fn wait_until_ready(
        &self,
        host_addr: &str,
        settings: &ProbeSettings,
    ) -> ContainerResult<()> {
        readiness::wait_for_listening_port(host_addr, self.liveness_port(), settings).await
    }
}

/// A variant configured entirely through builder calls, for images that
/// need no bespoke logic.
#[derive(Debug, Clone, Default)]
pub struct GenericImage {
    name: String,
    cmd: Vec<String>,
    env: HashMap<String, String>,
    exposed_ports: Vec<u16>,
    liveness_port: Option<u16>,
    binds: Vec<BindMount>,
    mapped_ports: HashMap<u16, u16>,
}

impl GenericImage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_cmd(mut self, cmd: Vec<String>) -> Self {
        self.cmd = cmd;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_exposed_port(mut self, port: u16) -> Self {
        self.exposed_ports.push(port);
        self
    }

    /// Expose `port` and use it for the liveness check.
    pub fn with_liveness_port(mut self, port: u16) -> Self {
        self.exposed_ports.push(port);
        self.liveness_port = Some(port);
        self
    }

    pub fn with_bind(mut self, bind: BindMount) -> Self {
        self.binds.push(bind);
        self
    }

    /// Host port a container port was published to, once the container
    /// has started.
    pub fn mapped_port(&self, container_port: u16) -> Option<u16> {
        self.mapped_ports.get(&container_port).copied()
    }

    /// Port the readiness probe should dial on the host. All exposed
    /// ports are published to ephemeral host ports, so the liveness
    /// port has to be resolved through the recorded mapping; the
    /// declared port is only a fallback for engines that report none.
    fn readiness_port(&self) -> Option<u16> {
        self.liveness_port
            .map(|port| self.mapped_port(port).unwrap_or(port))
    }
}

#[async_trait]
impl ContainerImage for GenericImage {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&self, spec: &mut ContainerSpec) {
        spec.cmd = self.cmd.clone();
        spec.env = self.env.clone();
        spec.exposed_ports = self.exposed_ports.clone();
    }

    fn customize_host_settings(&self, host: &mut HostSettings) {
        host.binds.extend(self.binds.iter().cloned());
    }

    fn liveness_port(&self) -> Option<u16> {
        self.liveness_port
    }

    fn container_starting(&mut self, info: &ContainerRuntimeInfo) {
        self.mapped_ports = info.mapped_ports.clone();
    }

    async fn wait_until_ready(
        &self,
        host_addr: &str,
        settings: &ProbeSettings,
    ) -> ContainerResult<()> {
        readiness::wait_for_listening_port(host_addr, self.readiness_port(), settings).await
    }
}
