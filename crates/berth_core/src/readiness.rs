//! Polling readiness probe.
//!
//! Confirms a started container is ready to serve traffic by attempting
//! TCP connections against a published port until one succeeds or the
//! attempt budget runs out.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::sleep;
use tracing::debug;

use crate::error::{ContainerError, ContainerResult};

/// Probe timing, explicit so tests can run without wall-clock delay.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Delay between connection attempts.
    pub interval: Duration,
    /// Maximum number of attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ProbeSettings {
    // 100 ms x 6000 attempts: a 10-minute budget.
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            max_attempts: 6000,
        }
    }
}

/// Wait until `addr:port` accepts a TCP connection.
///
/// A `None` port means the variant opted out of a liveness check and the
/// probe is a no-op. Exhausting the budget fails with
/// [`ContainerError::ReadinessTimeout`]; the probe never fails earlier.
pub async fn wait_for_listening_port(
    addr: &str,
    port: Option<u16>,
    settings: &ProbeSettings,
) -> ContainerResult<()> {
    let Some(port) = port else {
        return Ok(());
    };

    for attempt in 0..settings.max_attempts {
        match TcpStream::connect((addr, port)).await {
            Ok(_) => {
                debug!(
                    "Port {}:{} accepted a connection after {} attempt(s)",
                    addr,
                    port,
                    attempt + 1
                );
                return Ok(());
            }
            Err(_) => sleep(settings.interval).await,
        }
    }

    Err(ContainerError::ReadinessTimeout {
        addr: addr.to_string(),
        port,
    })
}
