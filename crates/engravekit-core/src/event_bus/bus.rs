//! In-process event distribution.
//!
//! One [`EventBus`] is created at startup and shared as `Arc<EventBus>`
//! with every component that publishes or observes pipeline events. Handlers
//! run synchronously on the emitting task; the last [`DEFAULT_HISTORY`]
//! events are kept for the dashboard feed.

use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;

use super::events::{AppEvent, EventCategory};

/// Events kept for [`EventBus::recent`]
pub const DEFAULT_HISTORY: usize = 200;

/// Which events a handler sees
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EventFilter {
    #[default]
    All,
    Categories(Vec<EventCategory>),
}

impl EventFilter {
    pub fn matches(&self, event: &AppEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Categories(categories) => categories.contains(&event.category()),
        }
    }
}

type Handler = Box<dyn Fn(&AppEvent) + Send + Sync>;

pub struct EventBus {
    handlers: RwLock<Vec<(EventFilter, Handler)>>,
    history: Mutex<VecDeque<AppEvent>>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }

    /// Bus that remembers the last `capacity` events
    pub fn with_history(capacity: usize) -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            history: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY))),
            capacity,
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Record `event` and hand it to every matching handler
    pub fn emit(&self, event: AppEvent) {
        tracing::debug!(category = %event.category(), "{}", event.description());
        for (filter, handler) in self.handlers.read().iter() {
            if filter.matches(&event) {
                handler(&event);
            }
        }

        if self.capacity == 0 {
            return;
        }
        let mut history = self.history.lock();
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(event);
    }

    /// Register a handler for the lifetime of the bus.
    ///
    /// Handlers run on the emitting task and must not block.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F)
    where
        F: Fn(&AppEvent) + Send + Sync + 'static,
    {
        self.handlers.write().push((filter, Box::new(handler)));
    }

    /// Every remembered event, oldest first
    pub fn history(&self) -> Vec<AppEvent> {
        self.history.lock().iter().cloned().collect()
    }

    /// Up to `limit` of the newest events, oldest first
    pub fn recent(&self, limit: usize) -> Vec<AppEvent> {
        let history = self.history.lock();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handlers.read().len())
            .field("remembered", &self.history.lock().len())
            .finish()
    }
}
