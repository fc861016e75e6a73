//! Host environment resolution.
//!
//! Determines how the container engine is reached: directly on the local
//! machine, or through a helper VM whose secured endpoint has to be
//! bootstrapped first. Resolution happens once per orchestration instance
//! and the result is immutable afterwards.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};

/// Helper binary used to bootstrap the engine VM on hosts without a
/// native engine.
pub const VM_HELPER: &str = "/usr/local/bin/boot2docker";

/// Certificate bundle location, relative to the user's home directory.
pub const VM_CERT_DIR: &str = ".boot2docker/certs/boot2docker-vm";

const REMOTE_ENGINE_PORT: u16 = 2376;

/// How the engine endpoint is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineEndpoint {
    /// Platform-default local socket.
    Local,
    /// TLS endpoint with certificates loaded from `cert_dir`.
    Tls { addr: String, cert_dir: PathBuf },
}

/// Resolved connection parameters for the container engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Address used for readiness checks against published ports.
    pub host_addr: String,
    /// Endpoint the engine client connects to.
    pub endpoint: EngineEndpoint,
}

/// The small set of supported operating environments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEnvironment {
    /// Engine reachable on the local machine; loopback host address.
    Local,
    /// Engine reached over TLS inside a helper VM.
    RemoteVm,
}

impl HostEnvironment {
    /// Detect the environment variant for the current host.
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") {
            Self::RemoteVm
        } else {
            Self::Local
        }
    }

    /// Resolve connection parameters for this environment.
    ///
    /// The remote variant brings the helper VM up and queries its address,
    /// so this can take a while on first use.
    pub async fn resolve(&self) -> EngineResult<EngineConfig> {
        match self {
            Self::Local => Ok(EngineConfig {
                host_addr: "127.0.0.1".to_string(),
                endpoint: EngineEndpoint::Local,
            }),
            Self::RemoteVm => {
                info!("Bootstrapping engine VM via {}", VM_HELPER);
                run_vm_helper(&["up"]).await?;
                let addr = run_vm_helper(&["ip"]).await?.trim().to_string();
                debug!("Engine VM address: {}", addr);

                let cert_dir = certificate_dir().ok_or_else(|| {
                    EngineError::VmBootstrap("home directory could not be determined".to_string())
                })?;

                Ok(EngineConfig {
                    host_addr: addr.clone(),
                    endpoint: EngineEndpoint::Tls {
                        addr: format!("https://{}:{}", addr, REMOTE_ENGINE_PORT),
                        cert_dir,
                    },
                })
            }
        }
    }
}

/// Fixed, user-scoped directory holding the VM's TLS material.
pub fn certificate_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(VM_CERT_DIR))
}

async fn run_vm_helper(args: &[&str]) -> EngineResult<String> {
    let output = Command::new(VM_HELPER).args(args).output().await?;
    if !output.status.success() {
        return Err(EngineError::VmBootstrap(format!(
            "{} {} exited with {}: {}",
            VM_HELPER,
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
