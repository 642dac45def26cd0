use engravekit_communication::{HardwareChannel, SimulatedConnector, SimulatedDevice};
use engravekit_core::{AppEvent, EventBus, HardwareError, HardwareEvent, SessionState};
use engravekit_settings::{ConnectionSettings, ConnectionType};
use std::sync::Arc;
use std::time::Duration;

fn settings() -> ConnectionSettings {
    ConnectionSettings {
        connection_type: ConnectionType::Simulated,
        ..Default::default()
    }
}

fn channel_for(device: &SimulatedDevice) -> Arc<HardwareChannel> {
    Arc::new(HardwareChannel::new(
        Arc::new(SimulatedConnector::new(device.clone())),
        settings(),
    ))
}

async fn connected(device: &SimulatedDevice) -> Arc<HardwareChannel> {
    let channel = channel_for(device);
    channel.connect().await.unwrap();
    assert_eq!(channel.state(), SessionState::Idle);
    channel
}

#[tokio::test(start_paused = true)]
async fn test_stream_program_under_claim() {
    let device = SimulatedDevice::new();
    let channel = connected(&device).await;

    let claim = channel.claim().unwrap();
    assert_eq!(channel.state(), SessionState::Busy);

    let program = [
        "; Engrave: ADA",
        "G0 X10 Y5",
        "M3 S500",
        "G1 X20 F1000 ; stroke",
        "M5",
    ];
    let mut progress = Vec::new();
    let sent = claim
        .stream(&program, |sent, total| progress.push((sent, total)))
        .await
        .unwrap();

    assert_eq!(sent, 4);
    assert_eq!(progress, vec![(1, 4), (2, 4), (3, 4), (4, 4)]);
    assert_eq!(device.received(), vec!["G0 X10 Y5", "M3 S500", "G1 X20 F1000", "M5"]);
    assert_eq!(device.position(), (20.0, 5.0, 0.0));

    drop(claim);
    assert_eq!(channel.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_silent_controller_disconnects_after_three_timeouts() {
    let device = SimulatedDevice::new();
    let bus = EventBus::shared();
    let channel = Arc::new(
        HardwareChannel::new(
            Arc::new(SimulatedConnector::new(device.clone())),
            settings(),
        )
        .with_events(bus.clone()),
    );
    channel.connect().await.unwrap();
    device.set_muted(true);

    let claim = channel.claim().unwrap();
    for attempt in 1..=3 {
        let result = claim.send("G0 X1").await;
        assert_eq!(result, Err(HardwareError::Timeout { timeout_ms: 5000 }));
        assert_eq!(channel.consecutive_failures(), attempt);
    }
    assert_eq!(channel.state(), SessionState::Disconnected);
    // one initial connect plus a reconnect after each of the first two failures
    assert_eq!(device.connect_count(), 3);

    assert_eq!(claim.send("G0 X1").await, Err(HardwareError::NotConnected));
    drop(claim);
    assert!(matches!(
        channel.claim(),
        Err(HardwareError::Disconnected { failures: 3 })
    ));

    let timeouts = bus
        .history()
        .into_iter()
        .filter(|e| matches!(e, AppEvent::Hardware(HardwareEvent::CommandTimeout { .. })))
        .count();
    assert_eq!(timeouts, 3);
}

#[tokio::test(start_paused = true)]
async fn test_status_replies_do_not_hide_unacked_lines() {
    let device = SimulatedDevice::new();
    let channel = connected(&device).await;
    device.set_ignore_lines(true);

    let claim = channel.claim().unwrap();
    for attempt in 1..=3 {
        let result = claim.send("G0 X1").await;
        assert_eq!(result, Err(HardwareError::Timeout { timeout_ms: 5000 }));
        // the status reply after reconnecting does not count as progress
        assert_eq!(channel.consecutive_failures(), attempt);
    }
    assert_eq!(channel.state(), SessionState::Disconnected);
    assert_eq!(device.connect_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_emergency_stop_during_reconnect_backoff() {
    let device = SimulatedDevice::new();
    let channel = connected(&device).await;
    device.set_muted(true);

    let claim = channel.claim().unwrap();
    let job = tokio::spawn(async move { claim.send("G0 X1").await });

    // past the 5s timeout, inside the first reconnect delay
    tokio::time::sleep(Duration::from_millis(5200)).await;
    assert_eq!(channel.state(), SessionState::Disconnected);
    assert_eq!(channel.emergency_stop().await, Err(HardwareError::NotConnected));

    assert_eq!(job.await.unwrap(), Err(HardwareError::EmergencyStopped));
    assert_eq!(channel.state(), SessionState::EmergencyStopped);
    assert_eq!(device.connect_count(), 2);
    // the latched stop reaches the controller once the link is back
    assert!(device.realtime().ends_with(&[b'!', 0x18]));
}

#[tokio::test(start_paused = true)]
async fn test_emergency_stop_interrupts_stream() {
    let device = SimulatedDevice::new();
    let channel = connected(&device).await;
    device.set_response_delay(Duration::from_millis(500));

    let program: Vec<String> = (0..20).map(|i| format!("G1 X{} F600", i)).collect();
    let claim = channel.claim().unwrap();
    let job = tokio::spawn(async move { claim.stream(&program, |_, _| {}).await });

    tokio::time::sleep(Duration::from_millis(1200)).await;
    channel.emergency_stop().await.unwrap();

    assert_eq!(job.await.unwrap(), Err(HardwareError::EmergencyStopped));
    assert_eq!(channel.state(), SessionState::EmergencyStopped);
    assert_eq!(device.received().len(), 3);
    assert!(device.realtime().ends_with(&[b'!', 0x18]));

    // both unlock and home are owed before the machine runs again
    assert!(matches!(channel.claim(), Err(HardwareError::EmergencyStopped)));
    channel.unlock().await.unwrap();
    assert_eq!(channel.state(), SessionState::EmergencyStopped);
    assert!(matches!(channel.claim(), Err(HardwareError::EmergencyStopped)));
    channel.home().await.unwrap();
    assert_eq!(channel.state(), SessionState::Idle);
    assert!(channel.claim().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_alarm_requires_unlock() {
    let device = SimulatedDevice::new();
    let channel = connected(&device).await;
    device.alarm_on_line_containing("X999", 2);

    let claim = channel.claim().unwrap();
    let result = claim.send("G0 X999").await;
    assert!(matches!(result, Err(HardwareError::Alarm { code: 2, .. })));
    drop(claim);

    assert_eq!(channel.state(), SessionState::Alarm);
    assert_eq!(channel.session().last_alarm, Some(2));
    assert!(matches!(channel.claim(), Err(HardwareError::Alarm { code: 2, .. })));

    assert_eq!(channel.command("$X").await.unwrap(), "ok");
    assert_eq!(channel.state(), SessionState::Idle);
    assert_eq!(channel.command("G0 X1").await.unwrap(), "ok");
}

#[tokio::test(start_paused = true)]
async fn test_rejected_line_reports_error_code() {
    let device = SimulatedDevice::new();
    let channel = connected(&device).await;
    device.reject_lines_containing("G99", 20);

    let err = channel.command("G99").await.unwrap_err();
    assert!(matches!(err, HardwareError::Rejected { code: 20, .. }));
    assert!(err.to_string().contains("error:20"));
    assert_eq!(channel.state(), SessionState::Idle);
    assert_eq!(channel.consecutive_failures(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_locked_controller_connects_in_alarm() {
    let device = SimulatedDevice::new();
    device.set_start_locked(true);
    let channel = channel_for(&device);

    channel.connect().await.unwrap();
    assert_eq!(channel.state(), SessionState::Alarm);

    channel.unlock().await.unwrap();
    assert_eq!(channel.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_operator_commands_refused_while_claimed() {
    let device = SimulatedDevice::new();
    let channel = connected(&device).await;

    let _claim = channel.claim().unwrap();
    assert_eq!(channel.command("G0 X1").await, Err(HardwareError::Busy));
    assert_eq!(channel.unlock().await, Err(HardwareError::Busy));
    assert!(matches!(channel.claim(), Err(HardwareError::Busy)));
}

#[tokio::test(start_paused = true)]
async fn test_status_query_and_blank_commands() {
    let device = SimulatedDevice::new();
    let channel = connected(&device).await;

    channel.command("G0 X3 Y4").await.unwrap();
    let status = channel.command("?").await.unwrap();
    assert!(status.contains("Idle"));
    assert!(status.contains("MPos:3.000,4.000"));
    assert_eq!(channel.session().position.x, 3.0);

    assert_eq!(channel.command("; just a comment").await.unwrap(), "");
}

#[tokio::test(start_paused = true)]
async fn test_stop_without_link_latches_until_recovered() {
    let device = SimulatedDevice::new();
    let channel = channel_for(&device);

    assert_eq!(channel.emergency_stop().await, Err(HardwareError::NotConnected));
    assert_eq!(channel.state(), SessionState::Disconnected);

    channel.connect().await.unwrap();
    assert_eq!(channel.state(), SessionState::EmergencyStopped);

    // reconnecting does not clear the stop
    channel.reconnect().await.unwrap();
    assert_eq!(channel.state(), SessionState::EmergencyStopped);

    channel.home().await.unwrap();
    channel.unlock().await.unwrap();
    assert_eq!(channel.state(), SessionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_poller_reconnects_dropped_link() {
    let device = SimulatedDevice::new();
    let channel = connected(&device).await;
    let poller = channel.start_status_poller();

    device.drop_link();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(channel.state(), SessionState::Disconnected);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(channel.state(), SessionState::Idle);
    assert_eq!(device.connect_count(), 2);

    poller.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_refused_connection_stays_disconnected() {
    let device = SimulatedDevice::new();
    device.set_refuse_connections(true);
    let channel = channel_for(&device);

    assert!(matches!(
        channel.connect().await,
        Err(HardwareError::Connection { .. })
    ));
    assert_eq!(channel.state(), SessionState::Disconnected);
    assert!(matches!(channel.claim(), Err(HardwareError::NotConnected)));
}
