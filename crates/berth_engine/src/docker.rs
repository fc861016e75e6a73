//! Docker implementation of the container engine boundary.

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::models::PortMap;
use bollard::service::HostConfig;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tracing::debug;

use crate::engine::{ContainerEngine, ContainerRuntimeInfo, ContainerSpec, PullProgress};
use crate::env::{EngineConfig, EngineEndpoint};
use crate::error::{EngineError, EngineResult};

const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Docker-backed container engine.
pub struct DockerEngine {
    client: Docker,
}

impl DockerEngine {
    /// Connect according to the resolved environment and verify the
    /// engine responds.
    pub async fn connect(config: &EngineConfig) -> EngineResult<Self> {
        let client = match &config.endpoint {
            EngineEndpoint::Local => Docker::connect_with_local_defaults()?,
            EngineEndpoint::Tls { addr, cert_dir } => Docker::connect_with_ssl(
                addr,
                &cert_dir.join("key.pem"),
                &cert_dir.join("cert.pem"),
                &cert_dir.join("ca.pem"),
                CONNECT_TIMEOUT_SECS,
                API_DEFAULT_VERSION,
            )?,
        };

        client.ping().await?;

        Ok(Self { client })
    }
}

fn bollard_config(spec: &ContainerSpec) -> Config<String> {
    let env: Vec<String> = spec
        .env
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();

    let exposed_ports: HashMap<String, HashMap<(), ()>> = spec
        .exposed_ports
        .iter()
        .map(|port| (format!("{}/tcp", port), HashMap::new()))
        .collect();

    let binds: Vec<String> = spec
        .host
        .binds
        .iter()
        .map(|b| {
            let mut bind = format!("{}:{}", b.source.display(), b.target);
            if b.read_only {
                bind.push_str(":ro");
            }
            bind
        })
        .collect();

    let host_config = HostConfig {
        publish_all_ports: Some(spec.host.publish_all_ports),
        binds: if binds.is_empty() { None } else { Some(binds) },
        network_mode: spec.host.network_mode.clone(),
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        cmd: if spec.cmd.is_empty() {
            None
        } else {
            Some(spec.cmd.clone())
        },
        env: if env.is_empty() { None } else { Some(env) },
        exposed_ports: if exposed_ports.is_empty() {
            None
        } else {
            Some(exposed_ports)
        },
        host_config: Some(host_config),
        ..Default::default()
    }
}

fn parse_mapped_ports(ports: PortMap) -> HashMap<u16, u16> {
    let mut mapped = HashMap::new();
    for (key, bindings) in ports {
        let container_port = key.split('/').next().and_then(|p| p.parse::<u16>().ok());
        let host_port = bindings.and_then(|list| {
            list.into_iter()
                .find_map(|b| b.host_port.and_then(|p| p.parse::<u16>().ok()))
        });
        if let (Some(container_port), Some(host_port)) = (container_port, host_port) {
            let _ = mapped.insert(container_port, host_port);
        }
    }
    mapped
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn image_tags(&self, name: &str) -> EngineResult<Vec<String>> {
        let mut filters = HashMap::new();
        let _ = filters.insert("reference".to_string(), vec![name.to_string()]);

        let images = self
            .client
            .list_images(Some(ListImagesOptions {
                filters,
                ..Default::default()
            }))
            .await?;

        Ok(images.into_iter().flat_map(|img| img.repo_tags).collect())
    }

    async fn pull_image(
        &self,
        name: &str,
        tag: &str,
    ) -> EngineResult<BoxStream<'static, EngineResult<PullProgress>>> {
        let options = CreateImageOptions {
            from_image: name.to_string(),
            tag: tag.to_string(),
            ..Default::default()
        };

        let stream = self
            .client
            .create_image(Some(options), None, None)
            .map(|item| match item {
                Ok(info) => Ok(PullProgress {
                    status: info.status,
                    error: info.error,
                }),
                Err(e) => Err(EngineError::from(e)),
            })
            .boxed();

        Ok(stream)
    }

    async fn create_container(&self, name: &str, spec: &ContainerSpec) -> EngineResult<String> {
        let options = CreateContainerOptions {
            name,
            platform: None,
        };

        let created = self
            .client
            .create_container(Some(options), bollard_config(spec))
            .await?;

        for warning in &created.warnings {
            debug!("Container create warning: {}", warning);
        }

        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> EngineResult<()> {
        self.client
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> EngineResult<ContainerRuntimeInfo> {
        let info = self
            .client
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;

        let name = info
            .name
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_string();

        let mapped_ports = info
            .network_settings
            .and_then(|net| net.ports)
            .map(parse_mapped_ports)
            .unwrap_or_default();

        Ok(ContainerRuntimeInfo { name, mapped_ports })
    }

    async fn wait_container(&self, id: &str) -> EngineResult<i64> {
        let mut stream = self
            .client
            .wait_container(id, None::<WaitContainerOptions<String>>);

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // A non-zero exit is still a completed wait, not a transport failure.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e.into()),
            None => Err(EngineError::WaitInterrupted),
        }
    }

    async fn kill_container(&self, id: &str) -> EngineResult<()> {
        self.client
            .kill_container(id, None::<KillContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> EngineResult<()> {
        self.client
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await?;
        Ok(())
    }
}
