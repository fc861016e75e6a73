//! Process-exit failsafe.
//!
//! Every successfully started container registers a weak stop handle
//! here. The first registration installs a single signal handler
//! (SIGINT/SIGTERM) that stops all still-live containers before the
//! process exits, so cleanup happens even when the caller never reaches
//! its own stop() call. Explicit stops remain safe: stop() is
//! idempotent, so the guard never double-releases.

use std::sync::{Arc, Once, OnceLock, Weak};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::container::ContainerShared;

struct GuardEntry {
    shared: Weak<ContainerShared>,
    /// Runtime the container was started on; the handler thread blocks
    /// on it to run the async stop.
    runtime: Handle,
}

static REGISTRY: OnceLock<Mutex<Vec<GuardEntry>>> = OnceLock::new();
static INSTALL: Once = Once::new();

/// Register a container with the process-exit guard. Called once per
/// container, right after a successful start.
pub(crate) fn register(shared: &Arc<ContainerShared>) {
    let registry = REGISTRY.get_or_init(|| Mutex::new(Vec::new()));
    registry.lock().push(GuardEntry {
        shared: Arc::downgrade(shared),
        runtime: Handle::current(),
    });

    INSTALL.call_once(|| {
        if let Err(e) = ctrlc::set_handler(on_exit_signal) {
            warn!("Could not install shutdown guard handler: {}", e);
        }
    });
}

fn on_exit_signal() {
    debug!("Shutdown guard triggered");
    let entries = REGISTRY
        .get()
        .map(|registry| std::mem::take(&mut *registry.lock()))
        .unwrap_or_default();
    stop_entries(entries);
    std::process::exit(130);
}

fn stop_entries(entries: Vec<GuardEntry>) {
    for entry in entries {
        // Dropped containers were either stopped already or are beyond
        // saving; only live ones get the failsafe stop.
        if let Some(shared) = entry.shared.upgrade() {
            entry.runtime.block_on(shared.stop());
        }
    }
}
