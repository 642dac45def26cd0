//! Operator-facing facade
//!
//! [`EngraverService`] is what the HTTP layer talks to. It bundles the
//! shared components and shapes their state into serializable views.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use engravekit_communication::HardwareChannel;
use engravekit_core::{
    AppEvent, EngraveRequest, Error, EventBus, HardwareError, JobId, JobSource, Rect, Result,
    SessionState, SettingsEvent, Size,
};
use engravekit_placement::{PlacementEngine, PlacementRecord};
use engravekit_settings::{Config, EngravingArea, SettingsDocument, SettingsError, SettingsHandle};
use engravekit_textpath::{self as textpath, FontProfile, FONTS};

use crate::intake::{EventMonitor, IntakeSender, SubscriptionEvent};
use crate::queue::JobQueue;

/// Dashboard status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    pub hardware_connected: bool,
    pub hardware_state: SessionState,
    /// `$X` is owed before the machine runs again
    pub needs_unlock: bool,
    /// `$H` is owed; set by an emergency stop, even one latched with no link
    pub needs_home: bool,
    pub event_source_running: bool,
    /// Video is handled outside this process
    pub camera_running: bool,
    pub queue_size: usize,
    pub placement_count: usize,
    pub coverage_percent: f64,
}

/// Pending request as listed in the queue view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueEntry {
    pub name: String,
    pub source: JobSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacementEntry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub name: String,
}

impl From<&PlacementRecord> for PlacementEntry {
    fn from(record: &PlacementRecord) -> Self {
        Self {
            x: record.rect.x,
            y: record.rect.y,
            width: record.rect.width,
            height: record.rect.height,
            name: record.text.clone(),
        }
    }
}

/// Surface size and every committed placement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacementView {
    pub active_width: f64,
    pub active_height: f64,
    pub placements: Vec<PlacementEntry>,
}

/// Rectangle blocked out by hand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualPlacement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default = "default_label")]
    pub name: String,
}

/// Smallest side accepted for a manual placement
const MIN_MANUAL_MM: f64 = 0.1;

fn default_label() -> String {
    "manual".to_string()
}

pub struct EngraverService {
    queue: Arc<JobQueue>,
    placement: Arc<PlacementEngine>,
    channel: Arc<HardwareChannel>,
    config: Arc<SettingsHandle<Config>>,
    area: Arc<SettingsHandle<EngravingArea>>,
    intake: IntakeSender,
    monitor: Option<Arc<EventMonitor>>,
    events: Option<Arc<EventBus>>,
}

impl std::fmt::Debug for EngraverService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngraverService")
            .field("queue", &self.queue)
            .field("placement", &self.placement)
            .field("monitor", &self.monitor)
            .finish()
    }
}

impl EngraverService {
    pub fn new(
        queue: Arc<JobQueue>,
        placement: Arc<PlacementEngine>,
        channel: Arc<HardwareChannel>,
        config: Arc<SettingsHandle<Config>>,
        area: Arc<SettingsHandle<EngravingArea>>,
        intake: IntakeSender,
    ) -> Self {
        Self {
            queue,
            placement,
            channel,
            config,
            area,
            intake,
            monitor: None,
            events: None,
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<EventMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn status(&self) -> ServiceStatus {
        let stats = self.placement.statistics();
        let session = self.channel.session();
        ServiceStatus {
            hardware_connected: session.state.is_connected(),
            hardware_state: session.state,
            needs_unlock: session.needs_unlock,
            needs_home: session.needs_home,
            event_source_running: self.monitor.as_ref().is_some_and(|m| m.is_running()),
            camera_running: false,
            queue_size: self.queue.len(),
            placement_count: stats.count,
            coverage_percent: stats.coverage_percent,
        }
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.snapshot()
    }

    /// Deep-merge `patch` into the configuration.
    ///
    /// Laser and text settings apply from the next job; a job already
    /// running keeps the snapshot it started with.
    pub fn update_config(&self, patch: &Value) -> Result<Arc<Config>> {
        let updated = self.config.update(|config| {
            *config = config.merged(patch)?;
            Ok(())
        })?;
        self.queue.set_policy(&updated.jobs);
        tracing::info!("configuration updated");
        self.emit(SettingsEvent::ConfigUpdated);
        Ok(updated)
    }

    pub fn work_area(&self) -> Arc<EngravingArea> {
        self.area.snapshot()
    }

    /// Resize the engraving surface.
    ///
    /// Refused when an existing placement would fall outside the new area.
    pub fn update_work_area(&self, area: EngravingArea) -> Result<Arc<EngravingArea>> {
        area.validate().map_err(SettingsError::from)?;
        let previous = self.placement.surface();
        self.placement
            .resize(Size::new(area.active_width_mm, area.active_height_mm))?;

        let stored = match self.area.replace(area) {
            Ok(stored) => stored,
            Err(e) => {
                if let Err(revert) = self.placement.resize(previous) {
                    tracing::error!("could not restore surface size: {}", revert);
                }
                return Err(e.into());
            }
        };
        tracing::info!(
            width = stored.active_width_mm,
            height = stored.active_height_mm,
            "engraving area updated"
        );
        self.emit(SettingsEvent::EngravingAreaUpdated {
            width: stored.active_width_mm,
            height: stored.active_height_mm,
        });
        Ok(stored)
    }

    /// Pending requests in processing order
    pub fn queue(&self) -> Vec<QueueEntry> {
        self.queue
            .pending()
            .into_iter()
            .map(|job| QueueEntry {
                name: job.name,
                source: job.source,
            })
            .collect()
    }

    pub fn jobs(&self) -> Vec<EngraveRequest> {
        self.queue.all()
    }

    pub fn redo(&self, id: &str) -> Result<EngraveRequest> {
        self.queue.redo(&JobId::from(id))
    }

    pub fn placements(&self) -> PlacementView {
        let surface = self.placement.surface();
        PlacementView {
            active_width: surface.width,
            active_height: surface.height,
            placements: self
                .placement
                .records()
                .iter()
                .map(PlacementEntry::from)
                .collect(),
        }
    }

    /// Queue a test engrave like any other request.
    ///
    /// Text the font cannot draw is refused here rather than failing later
    /// in the queue.
    pub fn test_engrave(&self, text: &str) -> Result<EngraveRequest> {
        if text.trim().is_empty() {
            return Err(Error::validation("text is empty"));
        }
        let config = self.config.snapshot();
        let settings = &config.text_settings;
        textpath::measure(text.trim(), settings.min_height_mm, &settings.font, settings.mirror_y)?;
        self.queue.enqueue(text, JobSource::Test)
    }

    /// Pass an operator command to the controller
    pub async fn laser_command(&self, command: &str) -> Result<String> {
        tracing::info!(command, "operator command");
        Ok(self.channel.command(command).await?)
    }

    pub async fn home(&self) -> Result<()> {
        Ok(self.channel.home().await?)
    }

    pub async fn unlock(&self) -> Result<()> {
        Ok(self.channel.unlock().await?)
    }

    /// Stop the machine now.
    ///
    /// With no link open the stop is still latched, and the machine must be
    /// unlocked and homed after the next connect.
    pub async fn emergency_stop(&self) -> Result<String> {
        match self.channel.emergency_stop().await {
            Ok(()) => Ok("Emergency stop sent".to_string()),
            Err(HardwareError::NotConnected) => {
                Ok("Emergency stop latched; no link is open".to_string())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn reconnect(&self) -> Result<SessionState> {
        self.channel.reconnect().await?;
        Ok(self.channel.state())
    }

    pub fn clear_placements(&self) -> Result<()> {
        Ok(self.placement.clear_all()?)
    }

    /// Archive the placement file and start over on a fresh board
    pub fn reset_board(&self) -> Result<Option<PathBuf>> {
        Ok(self.placement.archive_and_clear()?)
    }

    pub fn add_placement(&self, placement: &ManualPlacement) -> Result<PlacementRecord> {
        if placement.name.trim().is_empty() {
            return Err(Error::validation("name is required"));
        }
        if placement.width < MIN_MANUAL_MM || placement.height < MIN_MANUAL_MM {
            return Err(Error::validation(format!(
                "rectangle too small (min {}mm)",
                MIN_MANUAL_MM
            )));
        }
        let rect = Rect::new(placement.x, placement.y, placement.width, placement.height);
        Ok(self.placement.reserve_manual(rect, &placement.name)?)
    }

    /// Start or stop the event monitor, returning whether it now runs
    pub async fn toggle_event_monitor(&self) -> Result<bool> {
        let monitor = self
            .monitor
            .as_ref()
            .ok_or_else(|| Error::other("no event source is configured"))?;
        Ok(monitor.toggle().await)
    }

    /// Accept an event pushed by an external poller.
    ///
    /// Fails when the intake channel is full so the poller can resend.
    pub fn submit_event(&self, event: SubscriptionEvent) -> Result<()> {
        if event.name.trim().is_empty() {
            return Err(Error::validation("name is empty"));
        }
        self.intake.try_send(event)
    }

    pub fn fonts(&self) -> &'static [FontProfile] {
        FONTS
    }

    /// Up to `limit` of the newest events, oldest first
    pub fn recent_events(&self, limit: usize) -> Vec<AppEvent> {
        match &self.events {
            Some(bus) => bus.recent(limit),
            None => Vec::new(),
        }
    }

    fn emit(&self, event: SettingsEvent) {
        if let Some(bus) = &self.events {
            bus.emit(AppEvent::Settings(event));
        }
    }
}
