//! Scheduled background tasks with deterministic shutdown.
//!
//! Every periodic loop (status polling, event monitoring, the orchestrator)
//! runs as a [`ScheduledTask`]. Stopping a task signals its
//! [`ShutdownSignal`] and awaits the spawned future, so callers know the
//! loop has exited when `stop` returns.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Cancellation side handed to a task body
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Whether shutdown has been requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested or the owning task handle is gone
    pub async fn cancelled(&mut self) {
        if *self.rx.borrow_and_update() {
            return;
        }
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow_and_update() {
                return;
            }
        }
    }
}

/// Handle to a spawned background loop
#[derive(Debug)]
pub struct ScheduledTask {
    name: String,
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Spawn `body` with its own shutdown signal
    pub fn spawn<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(ShutdownSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let (stop_tx, rx) = watch::channel(false);
        let handle = tokio::spawn(body(ShutdownSignal { rx }));
        tracing::debug!(task = %name, "scheduled task started");
        Self {
            name,
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Run `tick` on a fixed period until stopped.
    ///
    /// The first tick fires after one full period. A tick that overruns the
    /// period delays the next one instead of bursting.
    pub fn every<F, Fut>(name: impl Into<String>, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::spawn(name, move |mut shutdown| async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tick() => {}
                }
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the loop is still executing
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal shutdown and wait for the loop to exit
    pub async fn stop(mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    tracing::error!(task = %self.name, "scheduled task panicked");
                }
            }
        }
        tracing::debug!(task = %self.name, "scheduled task stopped");
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}
