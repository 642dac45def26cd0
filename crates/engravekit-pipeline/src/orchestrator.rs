//! Orchestrator
//!
//! Drives one request at a time from the queue to the machine:
//! reserve space, compile, stream under an exclusive claim, commit the
//! placement and record the outcome. The claim is held for the whole
//! attempt, so operator commands are refused while a name is engraving.

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use engravekit_communication::HardwareChannel;
use engravekit_core::{
    persist, AppEvent, EngraveRequest, Error, EventBus, JobEvent, JobPlacement, Result,
    ScheduledTask, SessionState, ShutdownSignal,
};
use engravekit_placement::{PlacementEngine, ShrinkPolicy};
use engravekit_settings::{Config, EngravingArea, LaserSettings, SettingsHandle, TextSettings};
use engravekit_textpath::{self as textpath, CompileRequest, LaserParams};

use crate::queue::{JobOutcome, JobQueue};

/// Progress events are published every this many acknowledged lines
const PROGRESS_EVERY: usize = 20;

pub struct Orchestrator {
    queue: Arc<JobQueue>,
    placement: Arc<PlacementEngine>,
    channel: Arc<HardwareChannel>,
    config: Arc<SettingsHandle<Config>>,
    area: Arc<SettingsHandle<EngravingArea>>,
    programs_dir: Option<PathBuf>,
    events: Option<Arc<EventBus>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("queue", &self.queue)
            .field("programs_dir", &self.programs_dir)
            .finish()
    }
}

impl Orchestrator {
    pub fn new(
        queue: Arc<JobQueue>,
        placement: Arc<PlacementEngine>,
        channel: Arc<HardwareChannel>,
        config: Arc<SettingsHandle<Config>>,
        area: Arc<SettingsHandle<EngravingArea>>,
    ) -> Self {
        Self {
            queue,
            placement,
            channel,
            config,
            area,
            programs_dir: None,
            events: None,
        }
    }

    /// Write each compiled program to `dir/<id>.gcode`
    pub fn with_program_archive(mut self, dir: impl Into<PathBuf>) -> Self {
        self.programs_dir = Some(dir.into());
        self
    }

    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Next ready request, or `None` while the machine is not Idle
    pub fn dequeue(&self) -> Option<EngraveRequest> {
        if self.channel.state() != SessionState::Idle {
            return None;
        }
        self.queue.next_ready(Utc::now())
    }

    /// Run one request to its outcome.
    ///
    /// Returns the request as recorded, or `None` when nothing could be
    /// started. A request whose claim fails stays `Queued`.
    pub async fn process_next(&self) -> Result<Option<EngraveRequest>> {
        let Some(job) = self.dequeue() else {
            return Ok(None);
        };
        let claim = match self.channel.claim() {
            Ok(claim) => claim,
            Err(e) => {
                tracing::debug!(job_id = %job.id, "machine not available: {}", e);
                return Ok(None);
            }
        };

        tracing::info!(job_id = %job.id, name = %job.name, attempt = job.retry_count, "processing job");
        let result = self.execute(&job, &claim).await;
        drop(claim);

        let outcome = match &result {
            Ok(()) => JobOutcome::Done,
            Err(e) => JobOutcome::failed(e),
        };
        let recorded = self.queue.mark_result(&job.id, outcome)?;
        Ok(Some(recorded))
    }

    async fn execute(
        &self,
        job: &EngraveRequest,
        claim: &engravekit_communication::JobClaim,
    ) -> Result<()> {
        let config = self.config.snapshot();
        let area = self.area.snapshot();
        let text = &config.text_settings;

        let allocation = self
            .placement
            .allocate_text(&shrink_policy(text), |height| {
                textpath::measure(&job.name, height, &text.font, text.mirror_y).map_err(Error::from)
            })?;
        let origin = area.to_machine(allocation.rect.origin());

        self.queue.mark_placed(
            &job.id,
            JobPlacement {
                rect: allocation.rect,
                text_height_mm: allocation.text_height_mm,
                origin,
            },
        )?;
        self.emit(JobEvent::Placed {
            id: job.id.to_string(),
            rect: allocation.rect,
            text_height_mm: allocation.text_height_mm,
        });

        let program = textpath::compile(&CompileRequest {
            text: &job.name,
            height_mm: allocation.text_height_mm,
            font: &text.font,
            laser: laser_params(&config.laser_settings),
            origin,
            mirror_y: text.mirror_y,
        })?;
        if config.jobs.archive_programs {
            self.archive_program(job, &program.to_gcode());
        }

        self.queue.mark_engraving(&job.id)?;
        self.emit(JobEvent::EngravingStarted {
            id: job.id.to_string(),
            name: job.name.clone(),
        });

        let id = job.id.to_string();
        claim
            .stream(&program.lines(), |sent, total| {
                if sent % PROGRESS_EVERY == 0 || sent == total {
                    self.emit(JobEvent::Progress {
                        id: id.clone(),
                        sent,
                        total,
                    });
                }
            })
            .await?;

        self.placement.commit(
            job.id.as_str(),
            allocation.rect,
            &job.name,
            allocation.text_height_mm,
        )?;
        Ok(())
    }

    fn archive_program(&self, job: &EngraveRequest, gcode: &str) {
        let Some(dir) = &self.programs_dir else {
            return;
        };
        let path = dir.join(format!("{}.gcode", job.id));
        if let Err(e) = persist::write_atomic(&path, gcode.as_bytes()) {
            tracing::warn!(job_id = %job.id, path = %path.display(), "program archive failed: {}", e);
        }
    }

    /// Process requests until shutdown.
    ///
    /// Between requests the loop sleeps until the queue changes, the
    /// machine changes state, or a gated retry comes due.
    pub async fn run(&self, mut shutdown: ShutdownSignal) {
        let mut state_rx = self.channel.subscribe_state();
        tracing::info!("orchestrator started");

        loop {
            state_rx.borrow_and_update();
            loop {
                if shutdown.is_shutdown() {
                    break;
                }
                match self.process_next().await {
                    Ok(Some(_)) => continue,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("job bookkeeping failed: {}", e);
                        break;
                    }
                }
            }

            let retry_in = self.queue.next_retry_at().map(|at| {
                (at - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO)
            });
            let retry_due = async move {
                match retry_in {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.queue.changed() => {}
                _ = state_rx.changed() => {}
                _ = retry_due => {}
            }
        }
        tracing::info!("orchestrator stopped");
    }

    /// Run the loop on its own task
    pub fn start(self: &Arc<Self>) -> ScheduledTask {
        let orchestrator = Arc::clone(self);
        ScheduledTask::spawn("orchestrator", move |shutdown| async move {
            orchestrator.run(shutdown).await
        })
    }

    fn emit(&self, event: JobEvent) {
        if let Some(bus) = &self.events {
            bus.emit(AppEvent::Job(event));
        }
    }
}

pub(crate) fn shrink_policy(text: &TextSettings) -> ShrinkPolicy {
    ShrinkPolicy {
        initial_height_mm: text.initial_height_mm,
        min_height_mm: text.min_height_mm,
        step_mm: text.shrink_step_mm,
        spacing_mm: text.spacing_mm,
    }
}

pub(crate) fn laser_params(laser: &LaserSettings) -> LaserParams {
    LaserParams {
        power_percent: laser.power_percent,
        speed_mm_per_min: laser.speed_mm_per_min,
        passes: laser.passes,
        spindle_max: laser.spindle_max,
        z_height_mm: laser.z_height_mm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_follows_text_settings() {
        let text = TextSettings {
            initial_height_mm: 8.0,
            min_height_mm: 3.0,
            shrink_step_mm: 0.5,
            spacing_mm: 2.0,
            ..Default::default()
        };
        let policy = shrink_policy(&text);
        assert_eq!(policy.heights().first(), Some(&8.0));
        assert_eq!(policy.heights().last(), Some(&3.0));
        assert_eq!(policy.spacing_mm, 2.0);
    }

    #[test]
    fn test_laser_params_copy_settings() {
        let laser = LaserSettings {
            power_percent: 80.0,
            passes: 2,
            ..Default::default()
        };
        let params = laser_params(&laser);
        assert_eq!(params.power_percent, 80.0);
        assert_eq!(params.passes, 2);
        assert_eq!(params.spindle_max, laser.spindle_max);
    }
}
