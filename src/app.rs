//! Application wiring
//!
//! Loads settings and persisted state from the data directory, builds the
//! shared components and starts the background tasks.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

use engravekit_communication::{connector_for, HardwareChannel};
use engravekit_core::{EventBus, EventCategory, EventFilter, ScheduledTask, Size};
use engravekit_pipeline::{
    intake_channel, start_intake, EngraverService, EventMonitor, JobQueue, Orchestrator,
    SpoolDirSource,
};
use engravekit_placement::{PlacementEngine, PlacementStore};
use engravekit_settings::{Config, DataPaths, EngravingArea, SettingsHandle};

/// A running station
pub struct App {
    service: Arc<EngraverService>,
    events: Arc<EventBus>,
    config: Arc<SettingsHandle<Config>>,
    channel: Arc<HardwareChannel>,
    monitor: Arc<EventMonitor>,
    tasks: Vec<ScheduledTask>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("service", &self.service)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

impl App {
    /// Load state from `paths` and start every background task.
    ///
    /// An unreachable controller is not fatal; the status poller keeps
    /// trying to connect.
    pub async fn start(paths: DataPaths) -> anyhow::Result<Self> {
        let events = EventBus::shared();
        events.subscribe(
            EventFilter::Categories(vec![EventCategory::Job, EventCategory::Intake]),
            |event| tracing::info!(target: "engravekit::events", "{}", event.description()),
        );

        let config_file = paths.config_file();
        let config = Arc::new(
            SettingsHandle::<Config>::load_or_default(&config_file)
                .with_context(|| format!("loading {}", config_file.display()))?,
        );
        let area = Arc::new(
            SettingsHandle::<EngravingArea>::load_or_default(paths.area_file())
                .context("loading engraving area")?,
        );
        let settings = config.snapshot();
        let surface = area.snapshot();

        let placement = Arc::new(
            PlacementEngine::open(
                PlacementStore::new(paths.placements_file()),
                Size::new(surface.active_width_mm, surface.active_height_mm),
            )
            .context("loading placements")?
            .with_events(events.clone()),
        );
        let queue = Arc::new(
            JobQueue::open(paths.jobs_file(), &settings.jobs)
                .context("loading job queue")?
                .with_events(events.clone()),
        );

        let channel = Arc::new(
            HardwareChannel::new(connector_for(&settings.connection), settings.connection.clone())
                .with_events(events.clone()),
        );
        if let Err(e) = channel.connect().await {
            tracing::warn!(endpoint = %channel.endpoint(), "controller not reachable yet: {}", e);
        }

        let mut tasks = Vec::new();
        tasks.push(channel.start_status_poller());

        let (intake_tx, intake_rx) = intake_channel(settings.intake.channel_capacity);
        tasks.push(start_intake(intake_rx, queue.clone()));

        let monitor = Arc::new(
            EventMonitor::new(
                Arc::new(SpoolDirSource::new(paths.spool_dir())),
                intake_tx.clone(),
                Duration::from_millis(settings.intake.poll_interval_ms),
            )
            .with_events(events.clone()),
        );
        if settings.intake.monitor_on_start {
            monitor.start();
        }

        let orchestrator = Arc::new(
            Orchestrator::new(
                queue.clone(),
                placement.clone(),
                channel.clone(),
                config.clone(),
                area.clone(),
            )
            .with_program_archive(paths.programs_dir())
            .with_events(events.clone()),
        );
        tasks.push(orchestrator.start());

        let service = Arc::new(
            EngraverService::new(queue, placement, channel.clone(), config.clone(), area, intake_tx)
                .with_monitor(monitor.clone())
                .with_events(events.clone()),
        );

        tracing::info!(data_dir = %paths.root().display(), "engraving station started");
        Ok(Self {
            service,
            events,
            config,
            channel,
            monitor,
            tasks,
        })
    }

    pub fn service(&self) -> Arc<EngraverService> {
        self.service.clone()
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    /// Address the HTTP API binds to
    pub fn bind_address(&self) -> String {
        self.config.snapshot().server.bind_address.clone()
    }

    /// Stop every task and close the controller link
    pub async fn shutdown(self) {
        self.monitor.stop().await;
        // orchestrator first, so no job starts while the rest winds down
        for task in self.tasks.into_iter().rev() {
            task.stop().await;
        }
        self.channel.disconnect().await;
        tracing::info!("engraving station stopped");
    }
}
