//! Event intake
//!
//! Event sources push [`SubscriptionEvent`]s into a bounded channel through
//! an [`IntakeSender`]; [`run_intake`] drains the channel into the job
//! queue at its own pace. Sources may deliver the same event more than
//! once: the queue's dedup rule absorbs repeats, and rejections are logged
//! here rather than reported back to the source.
//!
//! Delivery is at-least-once. A source keeps what it handed out until the
//! monitor acknowledges it, and the intake drains its buffer on shutdown.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use engravekit_core::{
    AppEvent, Error, EventBus, IntakeEvent, JobSource, Result, ScheduledTask, ShutdownSignal,
};

use crate::queue::JobQueue;

fn default_source() -> JobSource {
    JobSource::Subscription
}

/// A name delivered by an event source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionEvent {
    pub name: String,
    #[serde(default = "default_source")]
    pub source: JobSource,
}

impl SubscriptionEvent {
    pub fn new(name: impl Into<String>, source: JobSource) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }
}

/// Producer side of the intake channel
#[derive(Debug, Clone)]
pub struct IntakeSender {
    tx: mpsc::Sender<SubscriptionEvent>,
}

/// Bounded intake channel
pub fn intake_channel(capacity: usize) -> (IntakeSender, mpsc::Receiver<SubscriptionEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (IntakeSender { tx }, rx)
}

impl IntakeSender {
    /// Deliver an event, waiting while the channel is full
    pub async fn send(&self, event: SubscriptionEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| Error::other("intake channel closed"))
    }

    /// Deliver without waiting; fails when the channel is full
    pub fn try_send(&self, event: SubscriptionEvent) -> Result<()> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::other("intake channel full"),
            mpsc::error::TrySendError::Closed(_) => Error::other("intake channel closed"),
        })
    }
}

/// What [`run_intake`] did with the events it drained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntakeStats {
    pub accepted: usize,
    pub duplicates: usize,
    pub rejected: usize,
}

impl IntakeStats {
    fn record(&mut self, queue: &JobQueue, event: SubscriptionEvent) {
        match queue.enqueue(&event.name, event.source) {
            Ok(_) => self.accepted += 1,
            Err(Error::Duplicate { name }) => {
                tracing::debug!(name = %name, "repeat delivery absorbed");
                self.duplicates += 1;
            }
            Err(e) => {
                tracing::warn!(name = %event.name, source = %event.source, "event rejected: {}", e);
                self.rejected += 1;
            }
        }
    }
}

/// Drain `rx` into `queue` until shutdown or until every sender is gone.
///
/// Events already buffered when shutdown arrives are still enqueued.
pub async fn run_intake(
    mut rx: mpsc::Receiver<SubscriptionEvent>,
    queue: Arc<JobQueue>,
    mut shutdown: ShutdownSignal,
) -> IntakeStats {
    let mut stats = IntakeStats::default();
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        stats.record(&queue, event);
    }

    rx.close();
    while let Ok(event) = rx.try_recv() {
        stats.record(&queue, event);
    }
    tracing::debug!(?stats, "intake stopped");
    stats
}

/// Spawn [`run_intake`] as a scheduled task
pub fn start_intake(rx: mpsc::Receiver<SubscriptionEvent>, queue: Arc<JobQueue>) -> ScheduledTask {
    ScheduledTask::spawn("intake", move |shutdown| async move {
        run_intake(rx, queue, shutdown).await;
    })
}

/// A pollable source of subscription events
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Short label for logs and events
    fn name(&self) -> &str;

    /// Events not yet acknowledged.
    ///
    /// Until [`acknowledge`](Self::acknowledge) confirms them, the same
    /// events come back on the next poll.
    async fn poll(&self) -> Result<Vec<SubscriptionEvent>>;

    /// The first `delivered` events of the last poll reached the intake
    async fn acknowledge(&self, _delivered: usize) -> Result<()> {
        Ok(())
    }
}

/// Polls an [`EventSource`] on a fixed interval while running
pub struct EventMonitor {
    source: Arc<dyn EventSource>,
    sender: IntakeSender,
    interval: Duration,
    task: Mutex<Option<ScheduledTask>>,
    events: Option<Arc<EventBus>>,
}

impl std::fmt::Debug for EventMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventMonitor")
            .field("source", &self.source.name())
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

impl EventMonitor {
    pub fn new(source: Arc<dyn EventSource>, sender: IntakeSender, interval: Duration) -> Self {
        Self {
            source,
            sender,
            interval,
            task: Mutex::new(None),
            events: None,
        }
    }

    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| t.is_running())
    }

    /// Start polling; `false` if already running
    pub fn start(&self) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| t.is_running()) {
            return false;
        }

        let source = Arc::clone(&self.source);
        let sender = self.sender.clone();
        let events = self.events.clone();
        *task = Some(ScheduledTask::every(
            format!("event-monitor {}", source.name()),
            self.interval,
            move || poll_once(Arc::clone(&source), sender.clone(), events.clone()),
        ));
        drop(task);

        tracing::info!(source = %self.source.name(), "event monitoring started");
        self.emit(IntakeEvent::MonitorStarted {
            source: self.source.name().to_string(),
        });
        true
    }

    /// Stop polling; `false` if it was not running
    pub async fn stop(&self) -> bool {
        let task = self.task.lock().take();
        let Some(task) = task else {
            return false;
        };
        let was_running = task.is_running();
        task.stop().await;

        tracing::info!(source = %self.source.name(), "event monitoring stopped");
        self.emit(IntakeEvent::MonitorStopped {
            source: self.source.name().to_string(),
        });
        was_running
    }

    /// Flip monitoring on or off, returning the new state
    pub async fn toggle(&self) -> bool {
        if self.is_running() {
            self.stop().await;
            false
        } else {
            self.start();
            true
        }
    }

    fn emit(&self, event: IntakeEvent) {
        if let Some(bus) = &self.events {
            bus.emit(AppEvent::Intake(event));
        }
    }
}

async fn poll_once(
    source: Arc<dyn EventSource>,
    sender: IntakeSender,
    events: Option<Arc<EventBus>>,
) {
    let batch = match source.poll().await {
        Ok(batch) => batch,
        Err(e) => {
            tracing::warn!(source = %source.name(), "event poll failed: {}", e);
            return;
        }
    };
    let total = batch.len();
    let mut delivered = 0;
    for event in batch {
        if let Some(bus) = &events {
            bus.emit(AppEvent::Intake(IntakeEvent::Received {
                name: event.name.clone(),
                source: event.source,
            }));
        }
        if let Err(e) = sender.send(event).await {
            tracing::warn!(source = %source.name(), "intake unavailable: {}", e);
            break;
        }
        delivered += 1;
    }
    if delivered < total {
        tracing::debug!(delivered, total, "partial delivery; the rest is polled again");
    }
    if let Err(e) = source.acknowledge(delivered).await {
        tracing::warn!(source = %source.name(), "acknowledge failed: {}", e);
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SpoolFile {
    One(SubscriptionEvent),
    Many(Vec<SubscriptionEvent>),
}

/// Picks up `*.json` files dropped into a directory.
///
/// Each file holds one event or a list of events. Files are read in name
/// order and deleted once every event in them is acknowledged; unreadable
/// files are renamed to `*.rejected` so they are not retried forever.
#[derive(Debug)]
pub struct SpoolDirSource {
    dir: PathBuf,
    /// Files returned by the last poll with their event counts
    outstanding: Mutex<Vec<(PathBuf, usize)>>,
}

impl SpoolDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            outstanding: Mutex::new(Vec::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl EventSource for SpoolDirSource {
    fn name(&self) -> &str {
        "spool"
    }

    async fn poll(&self) -> Result<Vec<SubscriptionEvent>> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        files.sort();

        let mut events = Vec::new();
        let mut outstanding = Vec::new();
        for path in files {
            let bytes = tokio::fs::read(&path).await?;
            let batch = match serde_json::from_slice::<SpoolFile>(&bytes) {
                Ok(SpoolFile::One(event)) => vec![event],
                Ok(SpoolFile::Many(batch)) => batch,
                Err(e) => {
                    tracing::warn!(file = %path.display(), "unreadable spool file: {}", e);
                    tokio::fs::rename(&path, path.with_extension("rejected")).await?;
                    continue;
                }
            };
            outstanding.push((path, batch.len()));
            events.extend(batch);
        }
        *self.outstanding.lock() = outstanding;
        Ok(events)
    }

    async fn acknowledge(&self, delivered: usize) -> Result<()> {
        let done: Vec<PathBuf> = {
            let mut outstanding = self.outstanding.lock();
            let mut covered = 0;
            let mut complete = 0;
            for (_, count) in outstanding.iter() {
                if covered + count > delivered {
                    break;
                }
                covered += count;
                complete += 1;
            }
            outstanding.drain(..complete).map(|(path, _)| path).collect()
        };
        for path in done {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engravekit_settings::JobSettings;

    struct ScriptedSource {
        batches: Mutex<Vec<Vec<SubscriptionEvent>>>,
    }

    #[async_trait]
    impl EventSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn poll(&self) -> Result<Vec<SubscriptionEvent>> {
            let mut batches = self.batches.lock();
            if batches.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(batches.remove(0))
            }
        }
    }

    #[tokio::test]
    async fn test_intake_absorbs_repeats() {
        let queue = Arc::new(JobQueue::in_memory(&JobSettings::default()));
        let (sender, rx) = intake_channel(8);

        for name in ["Ada", "ada ", "Grace", "", "Linus"] {
            sender
                .send(SubscriptionEvent::new(name, JobSource::Subscription))
                .await
                .unwrap();
        }
        drop(sender);

        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let task = ScheduledTask::spawn("intake", {
            let queue = queue.clone();
            move |shutdown| async move {
                let stats = run_intake(rx, queue, shutdown).await;
                let _ = done_tx.send(stats);
            }
        });
        let stats = done_rx.await.unwrap();
        task.stop().await;

        assert_eq!(
            stats,
            IntakeStats {
                accepted: 3,
                duplicates: 1,
                rejected: 1,
            }
        );
        let names: Vec<_> = queue.pending().into_iter().map(|j| j.name).collect();
        assert_eq!(names, vec!["Ada", "Grace", "Linus"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_polls_and_toggles() {
        let source = Arc::new(ScriptedSource {
            batches: Mutex::new(vec![
                vec![SubscriptionEvent::new("Ada", JobSource::Subscription)],
                vec![
                    SubscriptionEvent::new("Ada", JobSource::Subscription),
                    SubscriptionEvent::new("Grace", JobSource::Gift),
                ],
            ]),
        });
        let (sender, mut rx) = intake_channel(8);
        let monitor = EventMonitor::new(source, sender, Duration::from_millis(100));

        assert!(monitor.start());
        assert!(!monitor.start());
        assert!(monitor.is_running());

        let mut received = Vec::new();
        for _ in 0..3 {
            received.push(rx.recv().await.unwrap().name);
        }
        assert_eq!(received, vec!["Ada", "Ada", "Grace"]);

        assert!(!monitor.toggle().await);
        assert!(!monitor.is_running());
        assert!(monitor.toggle().await);
        assert!(monitor.stop().await);
    }

    #[tokio::test]
    async fn test_spool_dir_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("001.json"), r#"{"name": "Ada"}"#).unwrap();
        std::fs::write(
            dir.path().join("002.json"),
            r#"[{"name": "Grace", "source": "gift"}, {"name": "Linus", "source": "manual"}]"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("003.json"), "not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let source = SpoolDirSource::new(dir.path());
        let events = source.poll().await.unwrap();
        assert_eq!(
            events,
            vec![
                SubscriptionEvent::new("Ada", JobSource::Subscription),
                SubscriptionEvent::new("Grace", JobSource::Gift),
                SubscriptionEvent::new("Linus", JobSource::Manual),
            ]
        );
        assert!(dir.path().join("003.rejected").exists());
        assert!(dir.path().join("notes.txt").exists());

        // only fully delivered files are removed
        source.acknowledge(2).await.unwrap();
        assert!(!dir.path().join("001.json").exists());
        assert!(dir.path().join("002.json").exists());

        assert_eq!(source.poll().await.unwrap().len(), 2);
        source.acknowledge(2).await.unwrap();
        assert!(source.poll().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stopped_monitor_keeps_undelivered_events() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("001.json"),
            r#"[{"name": "one"}, {"name": "two"}, {"name": "three"}]"#,
        )
        .unwrap();

        let source = Arc::new(SpoolDirSource::new(dir.path()));
        let (sender, mut rx) = intake_channel(1);
        let monitor = EventMonitor::new(source.clone(), sender, Duration::from_millis(10));
        monitor.start();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.name, "one");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(monitor.stop().await);

        // the poll was cut short on a full channel, so the file stays
        assert!(dir.path().join("001.json").exists());
        let names: Vec<_> = source
            .poll()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn test_intake_drains_buffer_on_shutdown() {
        let queue = Arc::new(JobQueue::in_memory(&JobSettings::default()));
        let (sender, rx) = intake_channel(8);
        for name in ["Ada", "Grace", "Linus"] {
            sender
                .try_send(SubscriptionEvent::new(name, JobSource::Subscription))
                .unwrap();
        }

        let task = start_intake(rx, queue.clone());
        task.stop().await;

        assert_eq!(queue.len(), 3);
        assert!(sender.try_send(SubscriptionEvent::new("Ken", JobSource::Subscription)).is_err());
    }
}
