//! End-to-end tests for device liveness and adapter lifecycle
//!
//! Run with: cargo test -p pdm-tests --test liveness_e2e

use std::sync::Arc;
use std::time::Duration;

use pdm_comms::{CommsConfig, CommsPipeline, MockAdapter, PipelineEvent};
use pdm_protocol::{CanBitRate, DeviceManager, FirmwareVersion, PdmDevice, PdmKind};
use pdm_tests::SimulatedPdm;
use tokio::sync::broadcast;

const BASE_ID: u32 = 1000;

async fn next_event(
    events: &mut broadcast::Receiver<PipelineEvent>,
    wanted: impl Fn(&PipelineEvent) -> bool,
) -> PipelineEvent {
    tokio::time::timeout(Duration::from_secs(3), async {
        loop {
            let event = events.recv().await.unwrap();
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .unwrap()
}

fn fast_config() -> CommsConfig {
    let mut config = CommsConfig::default();
    config.pipeline.tx_poll_interval_ms = 1;
    config.pipeline.housekeeping_interval_ms = 5;
    config
}

#[tokio::test]
async fn test_device_connects_and_times_out() {
    let registry = Arc::new(DeviceManager::new());
    let host = registry.add(PdmDevice::new("host", PdmKind::Standard, BASE_ID).unwrap());
    let id = host.lock().id();
    let pipeline = CommsPipeline::new(&fast_config(), registry);
    pipeline.start();
    let mut events = pipeline.subscribe();

    let adapter = Arc::new(MockAdapter::default());
    pipeline
        .connect(adapter.clone(), "mock", CanBitRate::Kbps500)
        .await
        .unwrap();
    let pdm = SimulatedPdm::new(
        PdmDevice::new("controller", PdmKind::Standard, BASE_ID).unwrap(),
        FirmwareVersion::new(0, 4, 7),
    );

    assert!(adapter.inject(pdm.status_frame()));
    assert_eq!(
        next_event(&mut events, |e| matches!(e, PipelineEvent::DeviceConnected { .. })).await,
        PipelineEvent::DeviceConnected { device: id }
    );
    assert!((host.lock().telemetry.battery_voltage - 13.8).abs() < 1e-9);

    // no traffic for longer than the connection timeout
    assert_eq!(
        next_event(&mut events, |e| matches!(e, PipelineEvent::DeviceDisconnected { .. })).await,
        PipelineEvent::DeviceDisconnected { device: id }
    );
    assert_eq!(host.lock().telemetry.battery_voltage, 0.0);

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_frames_outside_window_are_ignored() {
    let registry = Arc::new(DeviceManager::new());
    let host = registry.add(PdmDevice::new("host", PdmKind::Standard, BASE_ID).unwrap());
    let pipeline = CommsPipeline::new(&fast_config(), registry);
    pipeline.start();

    let adapter = Arc::new(MockAdapter::default());
    pipeline
        .connect(adapter.clone(), "mock", CanBitRate::Kbps500)
        .await
        .unwrap();
    let stranger = SimulatedPdm::new(
        PdmDevice::new("stranger", PdmKind::Standard, 1500).unwrap(),
        FirmwareVersion::new(0, 4, 7),
    );

    assert!(adapter.inject(stranger.status_frame()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!host.lock().is_connected());

    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_swapped_out_adapter_no_longer_delivers() {
    let registry = Arc::new(DeviceManager::new());
    let host = registry.add(PdmDevice::new("host", PdmKind::Standard, BASE_ID).unwrap());
    let pipeline = CommsPipeline::new(&fast_config(), registry);
    pipeline.start();
    let pdm = Arc::new(SimulatedPdm::new(
        PdmDevice::new("controller", PdmKind::Standard, BASE_ID).unwrap(),
        FirmwareVersion::new(0, 4, 7),
    ));

    let first = Arc::new(MockAdapter::default());
    pipeline
        .connect(first.clone(), "first", CanBitRate::Kbps500)
        .await
        .unwrap();
    let second = Arc::new(MockAdapter::default());
    pdm.attach(&second);
    pipeline
        .connect(second.clone(), "second", CanBitRate::Kbps500)
        .await
        .unwrap();

    // the first adapter is stopped and unsubscribed
    assert!(!first.inject(pdm.status_frame()));
    assert!(!first.has_handler());
    assert_eq!(second.settings().map(|(port, _)| port), Some("second".to_string()));

    let version = host.lock().get_version_msg();
    pipeline.request(&version, BASE_ID).await.unwrap();
    assert_eq!(host.lock().firmware, Some(FirmwareVersion::new(0, 4, 7)));
    assert!(first.written().is_empty());
    assert_eq!(second.written().len(), 1);

    pipeline.shutdown().await.unwrap();
    assert!(!second.has_handler());
}
