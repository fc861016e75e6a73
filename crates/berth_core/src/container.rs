//! Container lifecycle orchestration.
//!
//! One [`Container`] owns the whole ephemeral lifecycle of a single
//! externally-run container: image acquisition, create/start, readiness
//! waiting, a background termination watcher, and idempotent best-effort
//! cleanup. A stopped, crashed, or failed instance cannot be restarted;
//! construct a new one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use berth_engine::{ContainerEngine, ContainerSpec, DockerEngine, HostEnvironment};
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{ContainerError, ContainerFault, ContainerResult};
use crate::image::{ensure_image_present, ImageRef};
use crate::readiness::ProbeSettings;
use crate::shutdown;
use crate::variant::ContainerImage;

/// Lifecycle state of a container handle.
///
/// `Created → Starting → {Running | Failed}`;
/// `Running → {Stopped | Crashed}`. `Failed`, `Stopped` and `Crashed`
/// are terminal; no transition re-enters `Starting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Created,
    Starting,
    Running,
    Stopped,
    Crashed,
    Failed,
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Crashed => "crashed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// State shared between the handle, the termination watcher, and the
/// shutdown guard.
pub(crate) struct ContainerShared {
    id: OnceLock<String>,
    name: RwLock<Option<String>>,
    state: RwLock<ContainerState>,
    engine: OnceLock<Arc<dyn ContainerEngine>>,
    /// Set by stop() before the kill/remove sequence; read by the
    /// watcher after the engine confirms exit.
    normal_termination: AtomicBool,
    stopped: AtomicBool,
    fault_raised: AtomicBool,
    fault_tx: watch::Sender<Option<ContainerFault>>,
}

impl ContainerShared {
    fn new() -> (Arc<Self>, watch::Receiver<Option<ContainerFault>>) {
        let (fault_tx, fault_rx) = watch::channel(None);
        let shared = Arc::new(Self {
            id: OnceLock::new(),
            name: RwLock::new(None),
            state: RwLock::new(ContainerState::Created),
            engine: OnceLock::new(),
            normal_termination: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            fault_raised: AtomicBool::new(false),
            fault_tx,
        });
        (shared, fault_rx)
    }

    /// Best-effort, idempotent cleanup. Safe to call from any thread,
    /// any number of times; engine failures are logged and swallowed
    /// because the container may already be gone.
    pub(crate) async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        // Must happen before kill/remove so the watcher classifies the
        // upcoming exit as intentional.
        self.normal_termination.store(true, Ordering::SeqCst);

        let (Some(engine), Some(id)) = (self.engine.get(), self.id.get()) else {
            // start() never got as far as creating anything.
            return;
        };

        info!("Stopping container: {}", id);
        if let Err(e) = engine.kill_container(id).await {
            debug!(
                "Error killing container {} (it may already be stopped): {}",
                id, e
            );
        }
        if let Err(e) = engine.remove_container(id, true).await {
            debug!(
                "Error removing container {} (it may already be removed): {}",
                id, e
            );
        }

        let mut state = self.state.write();
        if *state == ContainerState::Running {
            *state = ContainerState::Stopped;
        }
    }

    /// Called by the watcher when the engine reports the container has
    /// exited. Returns whether a fault was raised by this observation.
    pub(crate) fn observe_termination(&self, status: Option<i64>) -> bool {
        let id = self.id.get().cloned().unwrap_or_default();

        if self.normal_termination.load(Ordering::SeqCst) {
            debug!("Container {} exited after stop", id);
            return false;
        }

        // At most one fault, no matter how many wake-ups the watcher sees.
        if self.fault_raised.swap(true, Ordering::SeqCst) {
            return false;
        }

        {
            let mut state = self.state.write();
            if *state == ContainerState::Running {
                *state = ContainerState::Crashed;
            }
        }

        let fault = ContainerFault {
            container_id: id,
            container_name: self.name.read().clone(),
            message: match status {
                Some(code) => format!("Container exited unexpectedly with status {}", code),
                None => "Container exited unexpectedly".to_string(),
            },
        };
        error!("Unexpected container exit: {}", fault);
        let _ = self.fault_tx.send(Some(fault));
        true
    }
}

fn generate_container_name() -> String {
    let id = Uuid::new_v4().to_string()[..8].to_string();
    format!("berth-{}", id)
}

/// Handle for one throwaway container.
pub struct Container<I: ContainerImage> {
    image: I,
    tag: String,
    engine: Option<Arc<dyn ContainerEngine>>,
    host_addr: String,
    probe: ProbeSettings,
    shared: Arc<ContainerShared>,
    fault_rx: watch::Receiver<Option<ContainerFault>>,
}

impl<I: ContainerImage> Container<I> {
    /// Container backed by the engine resolved from the host environment
    /// at start time.
    pub fn new(image: I) -> Self {
        let (shared, fault_rx) = ContainerShared::new();
        Self {
            image,
            tag: "latest".to_string(),
            engine: None,
            host_addr: "127.0.0.1".to_string(),
            probe: ProbeSettings::default(),
            shared,
            fault_rx,
        }
    }

    /// Container backed by an explicit engine; host environment
    /// resolution is skipped.
    pub fn with_engine(image: I, engine: Arc<dyn ContainerEngine>) -> Self {
        let mut container = Self::new(image);
        container.engine = Some(engine);
        container
    }

    /// Image tag to use. Defaults to `latest`.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Readiness probe timing.
    pub fn with_probe_settings(mut self, settings: ProbeSettings) -> Self {
        self.probe = settings;
        self
    }

    /// Address used for readiness checks when no host environment is
    /// resolved (explicit-engine containers).
    pub fn with_host_addr(mut self, addr: impl Into<String>) -> Self {
        self.host_addr = addr.into();
        self
    }

    /// Engine-assigned container id, once created.
    pub fn id(&self) -> Option<&str> {
        self.shared.id.get().map(String::as_str)
    }

    /// Engine-assigned display name, once started.
    pub fn container_name(&self) -> Option<String> {
        self.shared.name.read().clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ContainerState {
        *self.shared.state.read()
    }

    /// Address readiness checks run against.
    pub fn host_addr(&self) -> &str {
        &self.host_addr
    }

    /// The container variant, e.g. to read mapped ports it recorded.
    pub fn image(&self) -> &I {
        &self.image
    }

    /// Whether a completed stop() marked the termination as intentional.
    pub fn normally_terminated(&self) -> bool {
        self.shared.normal_termination.load(Ordering::SeqCst)
    }

    /// Channel carrying the watcher's unexpected-exit fault, if one is
    /// ever raised. The fault cannot reach start()'s caller by ordinary
    /// control flow, so observers subscribe here.
    pub fn faults(&self) -> watch::Receiver<Option<ContainerFault>> {
        self.fault_rx.clone()
    }

    pub(crate) fn shared(&self) -> &Arc<ContainerShared> {
        &self.shared
    }

    /// Start the container, pulling the image if necessary, and wait
    /// until it is ready.
    ///
    /// May be called at most once per instance. On success a background
    /// watcher flags unexpected exits and a process-exit guard is
    /// registered so the container is released even if [`stop`] is never
    /// called explicitly.
    ///
    /// On failure the instance is `Failed` and will not be restarted.
    /// A failure between create and start leaves the created container
    /// in place; releasing it is still [`stop`]'s job (explicit or via
    /// the guard).
    ///
    /// [`stop`]: Container::stop
    pub async fn start(&mut self) -> ContainerResult<()> {
        {
            let mut state = self.shared.state.write();
            if *state != ContainerState::Created {
                return Err(ContainerError::AlreadyStarted);
            }
            *state = ContainerState::Starting;
        }

        debug!("Start for container image: {}", self.image.name());

        match self.start_inner().await {
            Ok(()) => {
                *self.shared.state.write() = ContainerState::Running;
                info!("Container started");
                self.spawn_watcher();
                shutdown::register(&self.shared);
                Ok(())
            }
            Err(e) => {
                error!("Could not start container: {}", e);
                *self.shared.state.write() = ContainerState::Failed;
                Err(e)
            }
        }
    }

    async fn start_inner(&mut self) -> ContainerResult<()> {
        let engine: Arc<dyn ContainerEngine> = match &self.engine {
            Some(engine) => engine.clone(),
            None => {
                let environment = HostEnvironment::detect();
                let config = environment.resolve().await?;
                self.host_addr = config.host_addr.clone();
                Arc::new(DockerEngine::connect(&config).await?)
            }
        };
        let _ = self.shared.engine.set(engine.clone());

        let image_ref = ImageRef::new(self.image.name(), &self.tag);
        ensure_image_present(engine.as_ref(), &image_ref).await?;

        let mut spec = ContainerSpec::new(image_ref.reference());
        self.image.configure(&mut spec);
        spec.host.publish_all_ports = true;
        self.image.customize_host_settings(&mut spec.host);

        info!("Creating container for image: {}", image_ref);
        let id = engine
            .create_container(&generate_container_name(), &spec)
            .await?;
        let _ = self.shared.id.set(id.clone());

        engine.start_container(&id).await?;
        info!("Starting container with ID: {}", id);

        // The assigned name is only known after start.
        let runtime_info = engine.inspect_container(&id).await?;
        *self.shared.name.write() = Some(runtime_info.name.clone());
        self.image.container_starting(&runtime_info);

        self.image
            .wait_until_ready(&self.host_addr, &self.probe)
            .await
    }

    fn spawn_watcher(&self) {
        let shared = self.shared.clone();
        let Some(engine) = shared.engine.get().cloned() else {
            return;
        };
        let Some(id) = shared.id.get().cloned() else {
            return;
        };

        let _ = tokio::spawn(async move {
            let status = match engine.wait_container(&id).await {
                Ok(code) => Some(code),
                Err(e) => {
                    debug!("Wait for container {} failed: {}", id, e);
                    None
                }
            };
            let _ = shared.observe_termination(status);
        });
    }

    /// Stop and remove the container.
    ///
    /// Best-effort and idempotent: repeated calls are no-ops, and engine
    /// failures during kill/remove are logged and swallowed.
    pub async fn stop(&self) {
        self.shared.stop().await;
    }
}

impl<I: ContainerImage> Drop for Container<I> {
    fn drop(&mut self) {
        if self.shared.id.get().is_some() && !self.shared.stopped.load(Ordering::SeqCst) {
            warn!(
                "Container {:?} dropped without stop(); it will only be released by the shutdown guard",
                self.shared.id.get()
            );
        }
    }
}
