//! # EngraveKit Placement
//!
//! Tracks which parts of the engraving surface are used. Free space is a
//! set of disjoint rectangles; names are placed best-fit with guillotine
//! splits and shrunk step by step when the surface fills up. Committed
//! placements are persisted in order and replayed on startup, so the free
//! space after a restart is identical to the free space before it.

pub mod engine;
pub mod occupancy;
pub mod store;

pub use engine::{PlacementEngine, PlacementStats, ShrinkPolicy, TextAllocation};
pub use occupancy::OccupancyMap;
pub use store::{PlacementRecord, PlacementStore};
