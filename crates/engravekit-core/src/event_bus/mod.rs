//! # Event Bus Module
//!
//! Typed [`AppEvent`]s published by the pipeline components. Handlers
//! filter by [`EventCategory`]; recent events back the dashboard feed.
//!
//! ```rust,ignore
//! use engravekit_core::event_bus::{EventBus, EventCategory, EventFilter};
//!
//! let bus = EventBus::shared();
//! bus.subscribe(EventFilter::Categories(vec![EventCategory::Job]), |event| {
//!     tracing::info!("{}", event.description())
//! });
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
