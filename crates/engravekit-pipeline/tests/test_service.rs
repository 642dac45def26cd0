use engravekit_communication::{HardwareChannel, SimulatedConnector, SimulatedDevice};
use engravekit_core::{Error, ErrorKind, JobSource, SessionState, Size};
use engravekit_pipeline::{
    intake_channel, EngraverService, JobQueue, ManualPlacement, SubscriptionEvent,
};
use engravekit_placement::PlacementEngine;
use engravekit_settings::{Config, ConnectionSettings, EngravingArea, JobSettings, SettingsHandle};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

struct Fixture {
    service: EngraverService,
    queue: Arc<JobQueue>,
    device: SimulatedDevice,
    rx: mpsc::Receiver<SubscriptionEvent>,
}

fn fixture() -> Fixture {
    let device = SimulatedDevice::new();
    let channel = Arc::new(HardwareChannel::new(
        Arc::new(SimulatedConnector::new(device.clone())),
        ConnectionSettings::default(),
    ));
    let queue = Arc::new(JobQueue::in_memory(&JobSettings::default()));
    let (tx, rx) = intake_channel(2);
    let service = EngraverService::new(
        queue.clone(),
        Arc::new(PlacementEngine::in_memory(Size::new(200.0, 298.0))),
        channel,
        Arc::new(SettingsHandle::in_memory(Config::default())),
        Arc::new(SettingsHandle::in_memory(EngravingArea::default())),
        tx,
    );
    Fixture {
        service,
        queue,
        device,
        rx,
    }
}

fn manual(x: f64, y: f64, width: f64, height: f64, name: &str) -> ManualPlacement {
    ManualPlacement {
        x,
        y,
        width,
        height,
        name: name.to_string(),
    }
}

#[tokio::test]
async fn test_status_reflects_components() {
    let f = fixture();
    let status = f.service.status();
    assert!(!status.hardware_connected);
    assert_eq!(status.hardware_state, SessionState::Disconnected);
    assert!(!status.event_source_running);
    assert!(!status.camera_running);
    assert!(!status.needs_home);
    assert_eq!(status.queue_size, 0);

    f.service.test_engrave("Ada").unwrap();
    f.service
        .add_placement(&manual(0.0, 0.0, 100.0, 149.0, "sticker"))
        .unwrap();
    assert_eq!(f.service.reconnect().await.unwrap(), SessionState::Idle);

    let status = f.service.status();
    assert!(status.hardware_connected);
    assert_eq!(status.queue_size, 1);
    assert_eq!(status.placement_count, 1);
    assert_eq!(status.coverage_percent, 25.0);
    assert_eq!(f.device.connect_count(), 1);
}

#[test]
fn test_partial_config_update() {
    let f = fixture();
    let updated = f
        .service
        .update_config(&json!({
            "laser_settings": { "power_percent": 75.0 },
            "text_settings": { "font": "simplex", "min_height_mm": 3.0 }
        }))
        .unwrap();
    assert_eq!(updated.laser_settings.power_percent, 75.0);
    assert_eq!(updated.laser_settings.passes, 1);
    assert_eq!(updated.text_settings.min_height_mm, 3.0);
    assert_eq!(f.service.config().laser_settings.power_percent, 75.0);

    let err = f
        .service
        .update_config(&json!({ "laser_settings": { "wattage": 5 } }))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);
    assert_eq!(f.service.config().laser_settings.power_percent, 75.0);
}

#[test]
fn test_work_area_refuses_to_orphan_placements() {
    let f = fixture();
    f.service
        .add_placement(&manual(150.0, 0.0, 40.0, 10.0, "logo"))
        .unwrap();

    assert!(f.service.update_work_area(EngravingArea::new(100.0, 100.0)).is_err());
    assert_eq!(f.service.work_area().active_width_mm, 200.0);
    assert_eq!(f.service.placements().active_width, 200.0);

    let area = f.service.update_work_area(EngravingArea::new(250.0, 300.0)).unwrap();
    assert_eq!(area.active_width_mm, 250.0);
    let view = f.service.placements();
    assert_eq!(view.active_width, 250.0);
    assert_eq!(view.placements.len(), 1);
    assert_eq!(view.placements[0].name, "logo");

    assert!(f.service.update_work_area(EngravingArea::new(-1.0, 10.0)).is_err());
}

#[test]
fn test_engrave_checks_text_before_queueing() {
    let f = fixture();
    assert!(matches!(
        f.service.test_engrave("   "),
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        f.service.test_engrave("a@b"),
        Err(Error::Compile(_))
    ));
    assert!(f.queue.is_empty());

    let job = f.service.test_engrave("Grace").unwrap();
    assert_eq!(job.source, JobSource::Test);
    assert!(matches!(
        f.service.test_engrave("grace"),
        Err(Error::Duplicate { .. })
    ));

    let queue = f.service.queue();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].name, "Grace");
}

#[test]
fn test_manual_placement_rules() {
    let f = fixture();
    assert!(f.service.add_placement(&manual(0.0, 0.0, 10.0, 10.0, " ")).is_err());
    assert!(f.service.add_placement(&manual(0.0, 0.0, 0.05, 10.0, "x")).is_err());
    f.service
        .add_placement(&manual(0.0, 0.0, 10.0, 10.0, "x"))
        .unwrap();
    assert!(f.service.add_placement(&manual(5.0, 5.0, 10.0, 10.0, "y")).is_err());

    f.service.clear_placements().unwrap();
    assert!(f.service.placements().placements.is_empty());
}

#[tokio::test]
async fn test_events_pushed_to_intake() {
    let mut f = fixture();
    f.service.submit_event(SubscriptionEvent::new("Ada", JobSource::Subscription)).unwrap();
    f.service.submit_event(SubscriptionEvent::new("Grace", JobSource::Subscription)).unwrap();
    // the channel holds two events
    assert!(f.service.submit_event(SubscriptionEvent::new("Linus", JobSource::Subscription)).is_err());
    assert!(f.service.submit_event(SubscriptionEvent::new(" ", JobSource::Subscription)).is_err());

    assert_eq!(f.rx.recv().await.unwrap().name, "Ada");
    assert!(f.service.toggle_event_monitor().await.is_err());
}

#[tokio::test]
async fn test_emergency_stop_latches_without_link() {
    let f = fixture();
    let message = f.service.emergency_stop().await.unwrap();
    assert!(message.contains("latched"));

    // visible on the dashboard before any link is open
    let status = f.service.status();
    assert_eq!(status.hardware_state, SessionState::Disconnected);
    assert!(status.needs_unlock);
    assert!(status.needs_home);

    f.service.reconnect().await.unwrap();
    assert_eq!(f.service.status().hardware_state, SessionState::EmergencyStopped);
    assert!(f.service.laser_command("G0 X1").await.is_err());
}
