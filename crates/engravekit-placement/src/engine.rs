//! Placement Engine
//!
//! Owns the occupancy map and the committed records. Allocation is
//! tentative and never mutates state; only [`PlacementEngine::commit`]
//! records a rectangle, and only after the record is persisted.
//!
//! Readers (status and placement queries) take short read locks and get
//! copies, so they never hold up the orchestrator's commit.

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use engravekit_core::{
    AppEvent, EventBus, JobId, PlacementError, PlacementEvent, Rect, Size, EPSILON,
};

use crate::occupancy::OccupancyMap;
use crate::store::{PlacementRecord, PlacementStore};

/// Text size search used by [`PlacementEngine::allocate_text`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShrinkPolicy {
    pub initial_height_mm: f64,
    pub min_height_mm: f64,
    pub step_mm: f64,
    /// Gap kept to the right of and above every name
    pub spacing_mm: f64,
}

impl Default for ShrinkPolicy {
    fn default() -> Self {
        Self {
            initial_height_mm: 5.0,
            min_height_mm: 2.0,
            step_mm: 1.0,
            spacing_mm: 1.5,
        }
    }
}

impl ShrinkPolicy {
    /// Heights to try, largest first; always ends at the minimum
    pub fn heights(&self) -> Vec<f64> {
        const MAX_STEPS: u32 = 1000;

        let mut heights = Vec::new();
        if self.initial_height_mm > self.min_height_mm + EPSILON && self.step_mm > 0.0 {
            for k in 0..MAX_STEPS {
                let h = self.initial_height_mm - f64::from(k) * self.step_mm;
                if h <= self.min_height_mm + EPSILON {
                    break;
                }
                heights.push(h);
            }
        }
        heights.push(self.min_height_mm);
        heights
    }
}

/// Result of a successful text allocation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TextAllocation {
    /// Reserved rectangle, spacing included
    pub rect: Rect,
    pub text_height_mm: f64,
    /// Ink extent at `text_height_mm`
    pub ink: Size,
}

/// Aggregate figures for the status view
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlacementStats {
    pub count: usize,
    /// Committed area over surface area, one decimal
    pub coverage_percent: f64,
    pub avg_text_height_mm: f64,
    pub free_rects: usize,
}

#[derive(Debug)]
struct Inner {
    map: OccupancyMap,
    records: Vec<PlacementRecord>,
}

pub struct PlacementEngine {
    inner: RwLock<Inner>,
    store: PlacementStore,
    events: Option<Arc<EventBus>>,
}

impl PlacementEngine {
    /// Load records from `store` and replay them onto a `surface` map
    pub fn open(store: PlacementStore, surface: Size) -> Result<Self, PlacementError> {
        let records = store.load()?;
        let map = OccupancyMap::replay(surface, records.iter().map(|r| &r.rect))?;
        check_disjoint(&records)?;
        tracing::info!(
            placements = records.len(),
            width = surface.width,
            height = surface.height,
            "Placement engine ready"
        );
        Ok(Self {
            inner: RwLock::new(Inner { map, records }),
            store,
            events: None,
        })
    }

    /// An engine without persistence
    pub fn in_memory(surface: Size) -> Self {
        Self {
            inner: RwLock::new(Inner {
                map: OccupancyMap::new(surface),
                records: Vec::new(),
            }),
            store: PlacementStore::in_memory(),
            events: None,
        }
    }

    /// Publish placement events on `bus`
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn surface(&self) -> Size {
        self.inner.read().map.surface_size()
    }

    /// Best-fit rectangle for `width` x `height`, without reserving it
    pub fn allocate(&self, width: f64, height: f64) -> Result<Rect, PlacementError> {
        self.inner.read().map.find(width, height)
    }

    /// Find room for a name, shrinking it step by step.
    ///
    /// `measure` returns the ink size of the text at a given height. Every
    /// height from the policy is tried in turn; `NoSpaceAvailable` is only
    /// returned after the minimum height also fails.
    pub fn allocate_text<F, E>(&self, policy: &ShrinkPolicy, mut measure: F) -> Result<TextAllocation, E>
    where
        F: FnMut(f64) -> Result<Size, E>,
        E: From<PlacementError>,
    {
        let mut last = Size::default();
        for height in policy.heights() {
            let ink = measure(height)?;
            let width = ink.width + policy.spacing_mm;
            let reserved_h = ink.height + policy.spacing_mm;
            last = Size::new(width, reserved_h);

            let inner = self.inner.read();
            match inner.map.find(width, reserved_h) {
                Ok(rect) => {
                    tracing::debug!(height, x = rect.x, y = rect.y, "text allocation found");
                    return Ok(TextAllocation {
                        rect,
                        text_height_mm: height,
                        ink,
                    });
                }
                // too large for the surface at this height counts as no fit
                Err(PlacementError::NoSpaceAvailable { .. })
                | Err(PlacementError::InvalidDimensions { .. })
                    if width > 0.0 && reserved_h > 0.0 =>
                {
                    tracing::debug!(height, width, "no room, shrinking");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(PlacementError::NoSpaceAvailable {
            width: last.width,
            height: last.height,
        }
        .into())
    }

    /// Record `rect` as engraved
    pub fn commit(
        &self,
        id: &str,
        rect: Rect,
        text: &str,
        text_height_mm: f64,
    ) -> Result<PlacementRecord, PlacementError> {
        self.append(PlacementRecord {
            id: id.to_string(),
            rect,
            text: text.to_string(),
            text_height_mm,
            created_at: Utc::now(),
            manual: false,
        })
    }

    /// Block out a rectangle that was engraved outside the pipeline
    pub fn reserve_manual(&self, rect: Rect, label: &str) -> Result<PlacementRecord, PlacementError> {
        self.append(PlacementRecord {
            id: JobId::new().to_string(),
            rect,
            text: label.to_string(),
            text_height_mm: 0.0,
            created_at: Utc::now(),
            manual: true,
        })
    }

    fn append(&self, record: PlacementRecord) -> Result<PlacementRecord, PlacementError> {
        let mut inner = self.inner.write();
        inner.map.check_bounds(&record.rect)?;
        if let Some(existing) = inner.records.iter().find(|r| r.rect.intersects(&record.rect)) {
            return Err(PlacementError::Overlap {
                existing: existing.text.clone(),
            });
        }

        inner.records.push(record.clone());
        if let Err(e) = self.store.save(inner.map.surface_size(), &inner.records) {
            inner.records.pop();
            return Err(e);
        }
        inner.map.occupy(&record.rect);
        drop(inner);

        tracing::info!(
            id = %record.id,
            text = %record.text,
            x = record.rect.x,
            y = record.rect.y,
            "Placement committed"
        );
        self.emit(PlacementEvent::Committed {
            id: record.id.clone(),
            text: record.text.clone(),
            rect: record.rect,
        });
        Ok(record)
    }

    /// Forget every placement
    pub fn clear_all(&self) -> Result<(), PlacementError> {
        self.reset()?;
        self.emit(PlacementEvent::Cleared { archive: None });
        Ok(())
    }

    /// Archive the placement file, then clear
    pub fn archive_and_clear(&self) -> Result<Option<PathBuf>, PlacementError> {
        let backup = self.store.archive()?;
        self.reset()?;
        self.emit(PlacementEvent::Cleared {
            archive: backup.as_ref().map(|p| p.display().to_string()),
        });
        Ok(backup)
    }

    fn reset(&self) -> Result<(), PlacementError> {
        let mut inner = self.inner.write();
        let surface = inner.map.surface_size();
        self.store.save(surface, &[])?;
        inner.records.clear();
        inner.map = OccupancyMap::new(surface);
        tracing::info!("All placements cleared");
        Ok(())
    }

    /// Move to a new surface size, replaying every record onto it
    pub fn resize(&self, surface: Size) -> Result<(), PlacementError> {
        let mut inner = self.inner.write();
        let map = OccupancyMap::replay(surface, inner.records.iter().map(|r| &r.rect))?;
        self.store.save(surface, &inner.records)?;
        inner.map = map;
        drop(inner);
        self.emit(PlacementEvent::SurfaceResized {
            width: surface.width,
            height: surface.height,
        });
        Ok(())
    }

    /// Copy of the records in commit order
    pub fn records(&self) -> Vec<PlacementRecord> {
        self.inner.read().records.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn free_rects(&self) -> Vec<Rect> {
        self.inner.read().map.free_rects().to_vec()
    }

    pub fn statistics(&self) -> PlacementStats {
        let inner = self.inner.read();
        let count = inner.records.len();
        let surface_area = inner.map.surface().area();
        let used: f64 = inner.records.iter().map(|r| r.rect.area()).sum();
        let coverage = if surface_area > 0.0 {
            (used / surface_area * 1000.0).round() / 10.0
        } else {
            0.0
        };
        let engraved: Vec<f64> = inner
            .records
            .iter()
            .filter(|r| !r.manual)
            .map(|r| r.text_height_mm)
            .collect();
        let avg = if engraved.is_empty() {
            0.0
        } else {
            let mean = engraved.iter().sum::<f64>() / engraved.len() as f64;
            (mean * 100.0).round() / 100.0
        };
        PlacementStats {
            count,
            coverage_percent: coverage,
            avg_text_height_mm: avg,
            free_rects: inner.map.free_rects().len(),
        }
    }

    fn emit(&self, event: PlacementEvent) {
        if let Some(bus) = &self.events {
            bus.emit(AppEvent::Placement(event));
        }
    }
}

fn check_disjoint(records: &[PlacementRecord]) -> Result<(), PlacementError> {
    for (i, a) in records.iter().enumerate() {
        if let Some(b) = records[..i].iter().find(|b| b.rect.intersects(&a.rect)) {
            return Err(PlacementError::Overlap {
                existing: b.text.clone(),
            });
        }
    }
    Ok(())
}

impl std::fmt::Debug for PlacementEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacementEngine")
            .field("placements", &self.len())
            .field("store", &self.store)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_heights() {
        assert_eq!(ShrinkPolicy::default().heights(), vec![5.0, 4.0, 3.0, 2.0]);

        let odd = ShrinkPolicy {
            initial_height_mm: 5.0,
            min_height_mm: 2.0,
            step_mm: 2.0,
            ..Default::default()
        };
        assert_eq!(odd.heights(), vec![5.0, 3.0, 2.0]);

        let flat = ShrinkPolicy {
            initial_height_mm: 2.0,
            ..Default::default()
        };
        assert_eq!(flat.heights(), vec![2.0]);
    }

    #[test]
    fn test_allocate_is_tentative() {
        let engine = PlacementEngine::in_memory(Size::new(200.0, 298.0));
        let a = engine.allocate(50.0, 6.5).unwrap();
        let b = engine.allocate(50.0, 6.5).unwrap();
        assert_eq!(a, b);
        assert!(engine.is_empty());
    }

    #[test]
    fn test_commit_rejects_overlap_and_out_of_bounds() {
        let engine = PlacementEngine::in_memory(Size::new(200.0, 298.0));
        engine
            .commit("j1", Rect::new(0.0, 0.0, 50.0, 6.5), "ALICE", 5.0)
            .unwrap();

        let overlap = engine.commit("j2", Rect::new(49.0, 0.0, 20.0, 6.5), "BOB", 5.0);
        assert_eq!(
            overlap.unwrap_err(),
            PlacementError::Overlap {
                existing: "ALICE".to_string()
            }
        );

        let outside = engine.commit("j3", Rect::new(190.0, 0.0, 20.0, 6.5), "CAROL", 5.0);
        assert!(matches!(outside, Err(PlacementError::OutOfBounds { .. })));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_statistics() {
        let engine = PlacementEngine::in_memory(Size::new(100.0, 100.0));
        engine
            .commit("j1", Rect::new(0.0, 0.0, 10.0, 10.0), "A", 5.0)
            .unwrap();
        engine
            .commit("j2", Rect::new(10.0, 0.0, 20.0, 10.0), "B", 4.0)
            .unwrap();
        engine
            .reserve_manual(Rect::new(50.0, 50.0, 6.0, 5.0), "sticker")
            .unwrap();

        let stats = engine.statistics();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.coverage_percent, 3.3);
        assert_eq!(stats.avg_text_height_mm, 4.5);
    }

    #[test]
    fn test_resize_replays_records() {
        let engine = PlacementEngine::in_memory(Size::new(200.0, 298.0));
        engine
            .commit("j1", Rect::new(0.0, 0.0, 150.0, 10.0), "LONG NAME", 5.0)
            .unwrap();

        assert!(matches!(
            engine.resize(Size::new(100.0, 100.0)),
            Err(PlacementError::OutOfBounds { .. })
        ));
        assert_eq!(engine.surface(), Size::new(200.0, 298.0));

        engine.resize(Size::new(150.0, 50.0)).unwrap();
        assert_eq!(engine.surface(), Size::new(150.0, 50.0));
        assert_eq!(
            engine.allocate(150.0, 40.0).unwrap(),
            Rect::new(0.0, 10.0, 150.0, 40.0)
        );
    }
}
