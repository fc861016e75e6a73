//! Integration tests for the container lifecycle.
//!
//! Driven entirely by the capturing mock engine, so no container engine
//! is required to run them.

use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use berth_core::{
    Container, ContainerError, ContainerImage, ContainerRuntimeInfo, ContainerSpec, ContainerState,
    GenericImage, HostSettings, MockEngine, ProbeSettings,
};
use tokio::time::{sleep, timeout};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("berth_core=debug")
        .with_test_writer()
        .try_init();
}

fn fast_probe() -> ProbeSettings {
    ProbeSettings {
        interval: Duration::from_millis(1),
        max_attempts: 5,
    }
}

/// A port that is currently closed on loopback.
fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn start_runs_the_launch_sequence_in_order() {
    init_logging();
    let engine = MockEngine::new()
        .with_image("nginx:latest")
        .with_runtime_info("eager_nginx", HashMap::new());
    let mut container = Container::with_engine(GenericImage::new("nginx"), Arc::new(engine.clone()));

    container.start().await.unwrap();

    assert_eq!(container.state(), ContainerState::Running);
    assert!(container.id().unwrap().starts_with("mock-"));
    assert_eq!(container.container_name().as_deref(), Some("eager_nginx"));
    assert_eq!(engine.pull_count(), 0);

    let calls = engine.calls();
    assert_eq!(
        &calls[..4],
        &[
            "image_tags".to_string(),
            "create_container".to_string(),
            "start_container".to_string(),
            "inspect_container".to_string(),
        ]
    );

    container.stop().await;
}

#[tokio::test]
async fn start_pulls_an_absent_image_once() {
    let engine = MockEngine::new();
    let mut container = Container::with_engine(GenericImage::new("nginx"), Arc::new(engine.clone()));

    container.start().await.unwrap();
    assert_eq!(engine.pull_count(), 1);

    container.stop().await;
}

#[tokio::test]
async fn start_twice_is_rejected() {
    let engine = MockEngine::new().with_image("nginx:latest");
    let mut container = Container::with_engine(GenericImage::new("nginx"), Arc::new(engine));

    container.start().await.unwrap();
    let err = container.start().await.unwrap_err();
    assert!(matches!(err, ContainerError::AlreadyStarted));

    container.stop().await;
}

#[tokio::test]
async fn create_failure_fails_start_and_stop_stays_safe() {
    let engine = MockEngine::new()
        .with_image("nginx:latest")
        .fail_create("no space left on device");
    let mut container = Container::with_engine(GenericImage::new("nginx"), Arc::new(engine.clone()));

    let err = container.start().await.unwrap_err();
    assert!(matches!(err, ContainerError::Launch(_)));
    assert_eq!(container.state(), ContainerState::Failed);

    // Nothing was created, so stop has nothing to release and must not raise.
    container.stop().await;
    assert_eq!(engine.call_count("kill_container"), 0);
}

#[tokio::test]
async fn readiness_timeout_fails_start_without_a_fault() {
    let engine = MockEngine::new().with_image("nginx:latest");
    let image = GenericImage::new("nginx").with_liveness_port(closed_port());
    let mut container = Container::with_engine(image, Arc::new(engine))
        .with_host_addr("127.0.0.1")
        .with_probe_settings(fast_probe());
    let faults = container.faults();

    let err = container.start().await.unwrap_err();
    assert!(matches!(err, ContainerError::ReadinessTimeout { .. }));
    assert_eq!(container.state(), ContainerState::Failed);

    // The probe did not tear the container down; no watcher fault either.
    sleep(Duration::from_millis(50)).await;
    assert!(faults.borrow().is_none());

    container.stop().await;
}

#[tokio::test]
async fn readiness_probes_the_mapped_host_port() {
    // Published ports listen on an ephemeral host port, not the
    // declared container port; the probe must dial the mapped one.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let host_port = listener.local_addr().unwrap().port();

    let mut ports = HashMap::new();
    let _ = ports.insert(80u16, host_port);
    let engine = MockEngine::new()
        .with_image("nginx:latest")
        .with_runtime_info("web", ports);

    let image = GenericImage::new("nginx").with_liveness_port(80);
    let mut container = Container::with_engine(image, Arc::new(engine))
        .with_host_addr("127.0.0.1")
        .with_probe_settings(fast_probe());

    container.start().await.unwrap();
    assert_eq!(container.state(), ContainerState::Running);
    assert_eq!(container.image().mapped_port(80), Some(host_port));

    container.stop().await;
}

#[tokio::test]
async fn stop_is_idempotent() {
    let engine = MockEngine::new().with_image("nginx:latest");
    let mut container = Container::with_engine(GenericImage::new("nginx"), Arc::new(engine.clone()));

    container.start().await.unwrap();
    container.stop().await;
    container.stop().await;

    assert_eq!(engine.call_count("kill_container"), 1);
    assert_eq!(engine.call_count("remove_container"), 1);
    assert_eq!(container.state(), ContainerState::Stopped);
    assert!(container.normally_terminated());
}

#[tokio::test]
async fn stop_swallows_engine_failures() {
    let engine = MockEngine::new()
        .with_image("nginx:latest")
        .fail_kill("container already gone")
        .fail_remove("container already gone");
    let mut container = Container::with_engine(GenericImage::new("nginx"), Arc::new(engine.clone()));

    container.start().await.unwrap();
    container.stop().await;

    assert_eq!(container.state(), ContainerState::Stopped);

    // A second stop after a swallowed failure is still a no-op.
    container.stop().await;
    assert_eq!(engine.call_count("kill_container"), 1);
}

#[tokio::test]
async fn watcher_is_quiet_after_stop() {
    let engine = MockEngine::new().with_image("nginx:latest");
    let mut container = Container::with_engine(GenericImage::new("nginx"), Arc::new(engine.clone()));

    container.start().await.unwrap();
    let faults = container.faults();

    container.stop().await;
    engine.trigger_exit(0);

    sleep(Duration::from_millis(50)).await;
    assert!(faults.borrow().is_none());
    assert_eq!(container.state(), ContainerState::Stopped);
}

#[tokio::test]
async fn external_termination_raises_exactly_one_fault() {
    let engine = MockEngine::new()
        .with_image("nginx:latest")
        .with_runtime_info("doomed_nginx", HashMap::new());
    let mut container = Container::with_engine(GenericImage::new("nginx"), Arc::new(engine.clone()));

    container.start().await.unwrap();
    let mut faults = container.faults();

    // Killed behind the orchestrator's back.
    engine.trigger_exit(137);

    timeout(Duration::from_secs(1), faults.changed())
        .await
        .expect("fault was never raised")
        .unwrap();

    let fault = faults.borrow_and_update().clone().unwrap();
    assert_eq!(fault.container_name.as_deref(), Some("doomed_nginx"));
    assert!(fault.message.contains("exited unexpectedly"));
    assert!(fault.message.contains("137"));
    assert_eq!(container.state(), ContainerState::Crashed);

    // No second fault arrives.
    sleep(Duration::from_millis(50)).await;
    assert!(!faults.has_changed().unwrap());
}

/// Variant recording when and how its hooks were invoked.
#[derive(Default)]
struct RecordingVariant {
    customize_called: AtomicBool,
    publish_all_seen: parking_lot::Mutex<Option<bool>>,
    runtime_info: Option<ContainerRuntimeInfo>,
}

#[async_trait]
impl ContainerImage for RecordingVariant {
    fn name(&self) -> &str {
        "postgres"
    }

    fn configure(&self, spec: &mut ContainerSpec) {
        spec.exposed_ports = vec![5432];
    }

    fn customize_host_settings(&self, host: &mut HostSettings) {
        self.customize_called.store(true, Ordering::SeqCst);
        *self.publish_all_seen.lock() = Some(host.publish_all_ports);
        host.network_mode = Some("bridge".to_string());
    }

    fn container_starting(&mut self, info: &ContainerRuntimeInfo) {
        self.runtime_info = Some(info.clone());
    }
}

#[tokio::test]
async fn variant_hooks_run_at_the_fixed_points() {
    let mut ports = HashMap::new();
    let _ = ports.insert(5432u16, 49152u16);
    let engine = MockEngine::new()
        .with_image("postgres:latest")
        .with_runtime_info("pensive_postgres", ports);

    let mut container =
        Container::with_engine(RecordingVariant::default(), Arc::new(engine.clone()));
    container.start().await.unwrap();

    let variant = container.image();
    // Host customization ran after the default descriptor was built.
    assert!(variant.customize_called.load(Ordering::SeqCst));
    assert_eq!(*variant.publish_all_seen.lock(), Some(true));

    // The starting notification carried the runtime info.
    let info = variant.runtime_info.as_ref().unwrap();
    assert_eq!(info.name, "pensive_postgres");
    assert_eq!(info.mapped_ports.get(&5432), Some(&49152));

    container.stop().await;
}

#[tokio::test]
async fn generic_image_reports_mapped_ports_after_start() {
    let mut ports = HashMap::new();
    let _ = ports.insert(80u16, 32768u16);
    let engine = MockEngine::new()
        .with_image("nginx:1.25")
        .with_runtime_info("web", ports);

    let image = GenericImage::new("nginx").with_exposed_port(80);
    let mut container =
        Container::with_engine(image, Arc::new(engine.clone())).with_tag("1.25");

    container.start().await.unwrap();
    assert_eq!(engine.pull_count(), 0);
    assert_eq!(container.image().mapped_port(80), Some(32768));

    container.stop().await;
}
