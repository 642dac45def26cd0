//! The exclusive hardware channel
//!
//! [`HardwareChannel`] owns the single link to the controller. Every access
//! goes through it:
//!
//! - one request/response exchange at a time, serialized by the link mutex;
//! - a claim ([`JobClaim`]) that gives one caller the machine for a whole
//!   job, while ad-hoc commands take a claim for a single line and fail fast
//!   with `Busy` when a job holds it;
//! - the emergency stop, which bypasses both locks and writes straight to
//!   the device, then wakes any exchange in flight;
//! - status polling and reconnects from a scheduled task.
//!
//! Consecutive timeouts and link failures are counted. Each one triggers a
//! bounded reconnect with exponential backoff; once the configured limit is
//! reached the session is left `Disconnected` until the poller or an
//! operator reconnects. Only an acknowledged command line clears the count;
//! a controller that answers status queries but never acks lines still
//! runs into the limit.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tokio::time::Instant;

use engravekit_core::{
    AppEvent, EventBus, HardwareError, HardwareEvent, ScheduledTask, SessionState,
};
use engravekit_settings::ConnectionSettings;

use crate::grbl::commands::{
    clean_line, is_recovery, realtime_byte, CYCLE_START, FEED_HOLD, HOME, SOFT_RESET,
    STATUS_QUERY, UNLOCK,
};
use crate::grbl::{alarm_message, error_message, GrblResponse, StatusReport};
use crate::session::{HardwareSession, SessionEvent};
use crate::transport::{Connector, Link, SharedWriter};

/// Longest wait for the status reply right after connecting
const STATUS_WINDOW: Duration = Duration::from_secs(1);

pub struct HardwareChannel {
    connector: Arc<dyn Connector>,
    settings: ConnectionSettings,
    link: Mutex<Option<Link>>,
    /// Writer of the open link, reachable without the link mutex
    writer: parking_lot::Mutex<Option<SharedWriter>>,
    claim: Arc<Mutex<()>>,
    session: parking_lot::RwLock<HardwareSession>,
    state_tx: watch::Sender<SessionState>,
    /// Bumped by every emergency stop
    stop_tx: watch::Sender<u64>,
    failures: AtomicU32,
    events: Option<Arc<EventBus>>,
}

impl std::fmt::Debug for HardwareChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareChannel")
            .field("endpoint", &self.connector.endpoint())
            .field("state", &self.state())
            .field("failures", &self.consecutive_failures())
            .finish()
    }
}

impl HardwareChannel {
    pub fn new(connector: Arc<dyn Connector>, settings: ConnectionSettings) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Disconnected);
        let (stop_tx, _) = watch::channel(0);
        Self {
            connector,
            settings,
            link: Mutex::new(None),
            writer: parking_lot::Mutex::new(None),
            claim: Arc::new(Mutex::new(())),
            session: parking_lot::RwLock::new(HardwareSession::new()),
            state_tx,
            stop_tx,
            failures: AtomicU32::new(0),
            events: None,
        }
    }

    /// Publish hardware events on `bus`
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn endpoint(&self) -> String {
        self.connector.endpoint()
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn state(&self) -> SessionState {
        self.session.read().state
    }

    /// Snapshot of the session
    pub fn session(&self) -> HardwareSession {
        self.session.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Watch session state changes
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Open the link if it is not already open
    pub async fn connect(&self) -> Result<(), HardwareError> {
        let mut slot = self.link.lock().await;
        if slot.is_some() {
            return Ok(());
        }
        self.open_link(&mut slot).await
    }

    /// Close the link
    pub async fn disconnect(&self) {
        let mut slot = self.link.lock().await;
        self.close_link(&mut slot, "disconnect requested");
    }

    /// Close and reopen the link, clearing the failure count
    pub async fn reconnect(&self) -> Result<(), HardwareError> {
        let mut slot = self.link.lock().await;
        self.close_link(&mut slot, "reconnect requested");
        self.failures.store(0, Ordering::SeqCst);
        self.open_link(&mut slot).await
    }

    /// Take the machine exclusively (Idle to Busy)
    pub fn claim(self: &Arc<Self>) -> Result<JobClaim, HardwareError> {
        let guard = self
            .claim
            .clone()
            .try_lock_owned()
            .map_err(|_| HardwareError::Busy)?;
        let epoch = *self.stop_tx.borrow();
        self.transition(SessionEvent::Claim)
            .map_err(|e| self.gave_up(e))?;
        Ok(JobClaim {
            channel: Arc::clone(self),
            epoch,
            _guard: guard,
        })
    }

    /// Send one operator command and return the controller's reply.
    ///
    /// `$X` and `$H` go through [`unlock`](Self::unlock) and
    /// [`home`](Self::home) so the session follows. `!` and Ctrl-X act as an
    /// emergency stop.
    pub async fn command(self: &Arc<Self>, raw: &str) -> Result<String, HardwareError> {
        let Some(line) = clean_line(raw).or_else(|| realtime_byte(raw).map(|_| raw.to_string()))
        else {
            return Ok(String::new());
        };

        match is_recovery(&line) {
            Some(UNLOCK) => return self.unlock().await.map(|_| "ok".to_string()),
            Some(HOME) => return self.home().await.map(|_| "ok".to_string()),
            _ => {}
        }

        if let Some(byte) = realtime_byte(&line) {
            return match byte {
                STATUS_QUERY => {
                    if !self.is_connected() {
                        return Err(HardwareError::NotConnected);
                    }
                    self.poll_status().await;
                    let status = self.session.read().status_text.clone();
                    Ok(status.unwrap_or_default())
                }
                FEED_HOLD | SOFT_RESET => self
                    .emergency_stop()
                    .await
                    .map(|_| "Emergency stop sent".to_string()),
                _ => self.write_realtime(byte).await.map(|_| String::new()),
            };
        }

        let claim = self.claim()?;
        let lines = claim.send(&line).await?;
        Ok(if lines.is_empty() {
            "ok".to_string()
        } else {
            lines.join("\n")
        })
    }

    /// Clear an alarm lock (`$X`)
    pub async fn unlock(&self) -> Result<(), HardwareError> {
        self.recovery_command(UNLOCK, SessionEvent::Unlocked, self.settings.command_timeout())
            .await
    }

    /// Run the homing cycle (`$H`)
    pub async fn home(&self) -> Result<(), HardwareError> {
        let timeout = Duration::from_millis(self.settings.homing_timeout_ms);
        self.recovery_command(HOME, SessionEvent::Homed, timeout).await
    }

    async fn recovery_command(
        &self,
        command: &str,
        event: SessionEvent,
        timeout: Duration,
    ) -> Result<(), HardwareError> {
        let _guard = self
            .claim
            .clone()
            .try_lock_owned()
            .map_err(|_| HardwareError::Busy)?;
        let epoch = *self.stop_tx.borrow();
        let mut slot = self.link.lock().await;
        if slot.is_none() {
            return Err(HardwareError::NotConnected);
        }
        self.send_locked(&mut slot, command, timeout, epoch).await?;
        self.transition(event)?;
        tracing::info!(command, state = %self.state(), "recovery command acknowledged");
        Ok(())
    }

    /// Feed hold then soft reset, sent immediately.
    ///
    /// The session latches `EmergencyStopped` even when no link is open, and
    /// every exchange in flight returns `EmergencyStopped`.
    pub async fn emergency_stop(&self) -> Result<(), HardwareError> {
        self.stop_tx.send_modify(|epoch| *epoch += 1);
        let _ = self.transition(SessionEvent::EmergencyStop);
        self.emit(HardwareEvent::EmergencyStop);
        tracing::warn!("EMERGENCY STOP");

        let writer = self.writer.lock().clone();
        let Some(writer) = writer else {
            tracing::warn!("no link open; emergency stop latched");
            return Err(HardwareError::NotConnected);
        };
        let mut writer = writer.lock().await;
        for byte in [FEED_HOLD, SOFT_RESET] {
            writer
                .write_all(&[byte])
                .await
                .map_err(|e| HardwareError::Connection {
                    reason: format!("emergency stop write failed: {}", e),
                })?;
        }
        Ok(())
    }

    async fn write_realtime(&self, byte: u8) -> Result<(), HardwareError> {
        let writer = self.writer.lock().clone();
        let writer = writer.ok_or(HardwareError::NotConnected)?;
        let mut writer = writer.lock().await;
        writer
            .write_all(&[byte])
            .await
            .map_err(|e| HardwareError::Connection {
                reason: e.to_string(),
            })
    }

    /// Resume after a feed hold
    pub async fn cycle_start(&self) -> Result<(), HardwareError> {
        self.write_realtime(CYCLE_START).await
    }

    /// Query status when idle and nothing else is talking to the device.
    ///
    /// Returns `None` without touching the link otherwise.
    pub async fn poll_status(&self) -> Option<StatusReport> {
        if self.state() != SessionState::Idle {
            return None;
        }
        let mut slot = self.link.try_lock().ok()?;
        let link = slot.as_mut()?;
        self.drain(link);

        let timeout = self.settings.command_timeout();
        let write = link.writer.lock().await.write_all(&[STATUS_QUERY]).await;
        let result = match write {
            Ok(()) => self.await_status(link, timeout).await,
            Err(e) => Err(HardwareError::Connection {
                reason: e.to_string(),
            }),
        };

        match result {
            Ok(report) => {
                if let Some(position) = report.machine_position() {
                    self.emit(HardwareEvent::Status {
                        state: report.state_text.clone(),
                        x: position.x,
                        y: position.y,
                        z: position.z,
                    });
                }
                Some(report)
            }
            Err(err) => {
                let failures = self.record_failure("?", &err);
                if failures >= self.settings.max_consecutive_failures
                    || matches!(err, HardwareError::Connection { .. })
                {
                    self.close_link(&mut slot, &err.to_string());
                }
                None
            }
        }
    }

    /// Poll status on the configured period, reconnecting while disconnected
    pub fn start_status_poller(self: &Arc<Self>) -> ScheduledTask {
        let channel = Arc::clone(self);
        let period = Duration::from_millis(self.settings.status_poll_ms.max(50));
        ScheduledTask::every("hardware-status", period, move || {
            let channel = Arc::clone(&channel);
            async move {
                match channel.state() {
                    SessionState::Disconnected if channel.settings.auto_reconnect => {
                        if let Err(e) = channel.connect().await {
                            tracing::debug!("reconnect attempt failed: {}", e);
                        }
                    }
                    SessionState::Idle => {
                        channel.poll_status().await;
                    }
                    _ => {}
                }
            }
        })
    }

    /// Apply a session event and publish any state change
    fn transition(&self, event: SessionEvent) -> Result<SessionState, HardwareError> {
        let (from, result) = {
            let mut session = self.session.write();
            let from = session.state;
            (from, session.apply(event))
        };
        if let Ok(to) = result {
            if to != from {
                self.state_tx.send_replace(to);
                tracing::info!("hardware {} -> {}", from, to);
                self.emit(HardwareEvent::StateChanged { from, to });
            }
        }
        result
    }

    fn emit(&self, event: HardwareEvent) {
        if let Some(bus) = &self.events {
            bus.emit(AppEvent::Hardware(event));
        }
    }

    async fn open_link(&self, slot: &mut Option<Link>) -> Result<(), HardwareError> {
        self.transition(SessionEvent::Connect)?;
        let endpoint = self.connector.endpoint();
        match self.connector.connect().await {
            Ok(link) => {
                *self.writer.lock() = Some(link.writer.clone());
                let link = slot.insert(link);
                self.transition(SessionEvent::Connected)?;
                tracing::info!(endpoint = %endpoint, "connected to controller");
                self.emit(HardwareEvent::Connected { endpoint });

                let window = self.settings.command_timeout().min(STATUS_WINDOW);
                let write = link.writer.lock().await.write_all(&[STATUS_QUERY]).await;
                let answered = match write {
                    Ok(()) => self.await_status(link, window).await.is_ok(),
                    Err(_) => false,
                };
                if !answered {
                    tracing::debug!("no status reply after connecting");
                }

                if self.state() == SessionState::EmergencyStopped {
                    // the stop may have been latched while no link was open
                    let mut writer = link.writer.lock().await;
                    for byte in [FEED_HOLD, SOFT_RESET] {
                        if let Err(e) = writer.write_all(&[byte]).await {
                            tracing::warn!("could not deliver latched stop: {}", e);
                            break;
                        }
                    }
                }
                Ok(())
            }
            Err(e) => {
                let _ = self.transition(SessionEvent::ConnectFailed);
                tracing::warn!(endpoint = %endpoint, "connection failed: {}", e);
                Err(HardwareError::Connection {
                    reason: e.to_string(),
                })
            }
        }
    }

    fn close_link(&self, slot: &mut Option<Link>, reason: &str) {
        if slot.take().is_none() {
            return;
        }
        *self.writer.lock() = None;
        let _ = self.transition(SessionEvent::LinkLost);
        let endpoint = self.connector.endpoint();
        tracing::info!(endpoint = %endpoint, reason, "link closed");
        self.emit(HardwareEvent::Disconnected {
            endpoint,
            reason: reason.to_string(),
        });
    }

    /// Update the session from an incoming line and classify it
    fn observe(&self, line: &str) -> Option<GrblResponse> {
        let response = GrblResponse::parse(line)?;
        match &response {
            GrblResponse::Status(report) => {
                {
                    let mut session = self.session.write();
                    if let Some(position) = report.machine_position() {
                        session.position = position;
                    }
                    session.status_text = Some(line.to_string());
                }
                if report.state.is_alarm()
                    && matches!(self.state(), SessionState::Idle | SessionState::Busy)
                {
                    let _ = self.transition(SessionEvent::Alarm(0));
                }
            }
            GrblResponse::Alarm(code) => {
                let message = alarm_message(*code).to_string();
                tracing::error!(code, "controller alarm: {}", message);
                let _ = self.transition(SessionEvent::Alarm(*code));
                self.emit(HardwareEvent::Alarm {
                    code: *code,
                    message,
                });
            }
            GrblResponse::Welcome(banner) => tracing::info!("controller: {}", banner),
            GrblResponse::Feedback(text) => tracing::debug!("controller: [{}]", text),
            _ => {}
        }
        Some(response)
    }

    /// Consume lines that arrived outside an exchange
    fn drain(&self, link: &mut Link) {
        while let Ok(line) = link.lines.try_recv() {
            tracing::debug!("<< {} (unsolicited)", line);
            self.observe(&line);
        }
    }

    async fn await_status(
        &self,
        link: &mut Link,
        timeout: Duration,
    ) -> Result<StatusReport, HardwareError> {
        let deadline = Instant::now() + timeout;
        loop {
            let line = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(HardwareError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
                line = link.lines.recv() => line,
            };
            let line = line.ok_or_else(|| HardwareError::Connection {
                reason: "link closed by controller".to_string(),
            })?;
            if let Some(GrblResponse::Status(report)) = self.observe(&line) {
                return Ok(report);
            }
        }
    }

    /// One exchange: write `command`, wait for its terminal reply
    async fn exchange(
        &self,
        slot: &mut Option<Link>,
        command: &str,
        timeout: Duration,
        epoch: u64,
    ) -> Result<Vec<String>, HardwareError> {
        let mut stop_rx = self.stop_tx.subscribe();
        if *stop_rx.borrow_and_update() != epoch {
            return Err(HardwareError::EmergencyStopped);
        }
        let link = slot.as_mut().ok_or(HardwareError::NotConnected)?;
        self.drain(link);

        tracing::debug!(command, ">>");
        link.writer
            .lock()
            .await
            .write_all(format!("{}\n", command).as_bytes())
            .await
            .map_err(|e| HardwareError::Connection {
                reason: e.to_string(),
            })?;

        let deadline = Instant::now() + timeout;
        let mut collected = Vec::new();
        loop {
            let line = tokio::select! {
                biased;
                _ = stop_rx.changed() => return Err(HardwareError::EmergencyStopped),
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(HardwareError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
                line = link.lines.recv() => line,
            };
            let line = line.ok_or_else(|| HardwareError::Connection {
                reason: "link closed by controller".to_string(),
            })?;
            tracing::debug!(command, "<< {}", line);

            match self.observe(&line) {
                Some(GrblResponse::Ok) => return Ok(collected),
                Some(GrblResponse::Error(code)) => {
                    return Err(HardwareError::Rejected {
                        code,
                        message: error_message(code).to_string(),
                    })
                }
                Some(GrblResponse::Alarm(code)) => {
                    return Err(HardwareError::Alarm {
                        code,
                        message: alarm_message(code).to_string(),
                    })
                }
                Some(GrblResponse::Status(_)) | None => {}
                Some(_) => collected.push(line),
            }
        }
    }

    /// Exchange with failure accounting and reconnect
    async fn send_locked(
        &self,
        slot: &mut Option<Link>,
        command: &str,
        timeout: Duration,
        epoch: u64,
    ) -> Result<Vec<String>, HardwareError> {
        let result = self.exchange(slot, command, timeout, epoch).await;
        match &result {
            Ok(_) => self.failures.store(0, Ordering::SeqCst),
            Err(err @ (HardwareError::Timeout { .. } | HardwareError::Connection { .. })) => {
                self.recover(slot, command, err).await;
            }
            Err(_) => {}
        }
        // a stop during the exchange or the reconnect wins over the failure
        if result.is_err() && *self.stop_tx.borrow() != epoch {
            return Err(HardwareError::EmergencyStopped);
        }
        result
    }

    fn record_failure(&self, command: &str, err: &HardwareError) -> u32 {
        let consecutive = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::warn!(command, consecutive, "exchange failed: {}", err);
        if matches!(err, HardwareError::Timeout { .. }) {
            self.emit(HardwareEvent::CommandTimeout {
                command: command.to_string(),
                consecutive,
            });
        }
        consecutive
    }

    async fn recover(&self, slot: &mut Option<Link>, command: &str, err: &HardwareError) {
        let consecutive = self.record_failure(command, err);
        self.close_link(slot, &err.to_string());

        if consecutive >= self.settings.max_consecutive_failures {
            tracing::error!(
                failures = consecutive,
                "controller unresponsive; staying disconnected"
            );
            return;
        }

        let backoff = self.settings.reconnect_backoff();
        let mut stop_rx = self.stop_tx.subscribe();
        stop_rx.borrow_and_update();
        for attempt in 0..self.settings.reconnect_attempts {
            tokio::select! {
                _ = tokio::time::sleep(backoff.delay(attempt)) => {}
                _ = stop_rx.changed() => {
                    tracing::warn!("emergency stop during reconnect; reconnecting now");
                }
            }
            if self.open_link(slot).await.is_ok() {
                return;
            }
        }
        tracing::error!(
            attempts = self.settings.reconnect_attempts,
            "reconnect failed"
        );
    }

    /// Report `Disconnected` instead of `NotConnected` once the failure
    /// limit closed the link
    fn gave_up(&self, err: HardwareError) -> HardwareError {
        let failures = self.consecutive_failures();
        match err {
            HardwareError::NotConnected if failures >= self.settings.max_consecutive_failures => {
                HardwareError::Disconnected { failures }
            }
            other => other,
        }
    }

    /// Whether a claim taken at `epoch` may still drive the machine
    fn check_claim(&self, epoch: u64) -> Result<(), HardwareError> {
        if *self.stop_tx.borrow() != epoch {
            return Err(HardwareError::EmergencyStopped);
        }
        let session = self.session.read();
        match session.state {
            SessionState::Busy => Ok(()),
            _ => Err(session
                .unavailable_error()
                .unwrap_or(HardwareError::NotConnected)),
        }
    }
}

/// Exclusive use of the machine; released on drop
pub struct JobClaim {
    channel: Arc<HardwareChannel>,
    epoch: u64,
    _guard: OwnedMutexGuard<()>,
}

impl std::fmt::Debug for JobClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobClaim").field("epoch", &self.epoch).finish()
    }
}

impl JobClaim {
    /// Send one line and wait for its reply
    pub async fn send(&self, line: &str) -> Result<Vec<String>, HardwareError> {
        self.channel.check_claim(self.epoch)?;
        let mut slot = self.channel.link.lock().await;
        let timeout = self.channel.settings.command_timeout();
        self.channel
            .send_locked(&mut slot, line, timeout, self.epoch)
            .await
    }

    /// Stream program lines one at a time.
    ///
    /// Comments and blank lines are skipped. The controller delays `ok`
    /// while its planner is full, which paces the stream. `progress` gets
    /// `(sent, total)` after each acknowledged line. Stops at the first
    /// failure, including an emergency stop between or during lines.
    pub async fn stream<S, F>(&self, lines: &[S], mut progress: F) -> Result<usize, HardwareError>
    where
        S: AsRef<str>,
        F: FnMut(usize, usize),
    {
        let commands: Vec<String> = lines.iter().filter_map(|l| clean_line(l.as_ref())).collect();
        let total = commands.len();
        let timeout = self.channel.settings.command_timeout();

        let mut slot = self.channel.link.lock().await;
        for (i, command) in commands.iter().enumerate() {
            self.channel.check_claim(self.epoch)?;
            self.channel
                .send_locked(&mut slot, command, timeout, self.epoch)
                .await?;
            progress(i + 1, total);
        }
        Ok(total)
    }

    /// Whether an emergency stop happened since the claim was taken
    pub fn is_stopped(&self) -> bool {
        *self.channel.stop_tx.borrow() != self.epoch
    }
}

impl Drop for JobClaim {
    fn drop(&mut self) {
        let _ = self.channel.transition(SessionEvent::Release);
    }
}
