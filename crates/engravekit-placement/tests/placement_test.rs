use engravekit_core::{Error, PlacementError, Rect, Size};
use engravekit_placement::{PlacementEngine, PlacementStore, ShrinkPolicy};
use proptest::prelude::*;

fn board() -> Size {
    Size::new(200.0, 298.0)
}

/// Ink four times wider than tall, like a short name
fn short_name(height: f64) -> Result<Size, PlacementError> {
    Ok(Size::new(height * 4.0, height))
}

#[test]
fn test_shrinks_through_every_step_before_giving_up() {
    let engine = PlacementEngine::in_memory(board());
    engine
        .reserve_manual(Rect::new(0.0, 0.0, 200.0, 298.0), "full")
        .unwrap();

    let mut tried = Vec::new();
    let result = engine.allocate_text(&ShrinkPolicy::default(), |h| {
        tried.push(h);
        short_name(h)
    });

    assert_eq!(tried, vec![5.0, 4.0, 3.0, 2.0]);
    assert!(matches!(
        result,
        Err(PlacementError::NoSpaceAvailable { .. })
    ));
}

#[test]
fn test_shrinks_until_it_fits() {
    let engine = PlacementEngine::in_memory(board());
    // leave a 4.5mm strip along the top
    engine
        .reserve_manual(Rect::new(0.0, 0.0, 200.0, 293.5), "used")
        .unwrap();

    let mut tried = Vec::new();
    let allocation = engine
        .allocate_text(&ShrinkPolicy::default(), |h| {
            tried.push(h);
            short_name(h)
        })
        .unwrap();

    assert_eq!(tried, vec![5.0, 4.0, 3.0]);
    assert_eq!(allocation.text_height_mm, 3.0);
    assert_eq!(allocation.rect, Rect::new(0.0, 293.5, 13.5, 4.5));
    assert_eq!(allocation.ink, Size::new(12.0, 3.0));
}

#[test]
fn test_too_wide_names_shrink_instead_of_failing() {
    let engine = PlacementEngine::in_memory(Size::new(50.0, 50.0));
    // 12x wide: 60mm at 5mm, 48mm at 4mm
    let allocation = engine
        .allocate_text(&ShrinkPolicy::default(), |h| {
            Ok::<_, PlacementError>(Size::new(h * 12.0, h))
        })
        .unwrap();
    assert_eq!(allocation.text_height_mm, 4.0);
}

#[test]
fn test_measure_errors_abort_the_search() {
    let engine = PlacementEngine::in_memory(board());
    let result = engine.allocate_text(&ShrinkPolicy::default(), |_| {
        Err::<Size, Error>(Error::validation("bad glyph"))
    });
    assert!(matches!(result, Err(Error::Validation(_))));
}

#[test]
fn test_restart_replay_gives_same_decision() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("placements.json");

    let sizes = [(40.0, 6.5), (25.0, 6.5), (60.0, 5.5), (12.0, 3.5), (80.0, 6.5)];
    let (before, free_before) = {
        let engine = PlacementEngine::open(PlacementStore::new(&path), board()).unwrap();
        for (i, (w, h)) in sizes.iter().enumerate() {
            let rect = engine.allocate(*w, *h).unwrap();
            engine
                .commit(&format!("job{}", i), rect, &format!("NAME{}", i), 5.0)
                .unwrap();
        }
        (engine.allocate(33.0, 6.5).unwrap(), engine.free_rects())
    };

    let reopened = PlacementEngine::open(PlacementStore::new(&path), board()).unwrap();
    assert_eq!(reopened.len(), sizes.len());
    assert_eq!(reopened.free_rects(), free_before);
    assert_eq!(reopened.allocate(33.0, 6.5).unwrap(), before);
}

#[test]
fn test_clear_and_archive() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("placements.json");
    let engine = PlacementEngine::open(PlacementStore::new(&path), board()).unwrap();
    engine
        .commit("j1", Rect::new(0.0, 0.0, 10.0, 5.0), "AMY", 5.0)
        .unwrap();

    let backup = engine.archive_and_clear().unwrap().unwrap();
    assert!(backup.exists());
    assert!(engine.is_empty());
    assert_eq!(engine.free_rects(), vec![Rect::new(0.0, 0.0, 200.0, 298.0)]);

    let reopened = PlacementEngine::open(PlacementStore::new(&path), board()).unwrap();
    assert!(reopened.is_empty());

    engine
        .commit("j2", Rect::new(0.0, 0.0, 10.0, 5.0), "BEN", 5.0)
        .unwrap();
    engine.clear_all().unwrap();
    assert_eq!(engine.statistics().count, 0);
    assert_eq!(engine.statistics().coverage_percent, 0.0);
}

proptest! {
    #[test]
    fn allocations_never_overlap(
        requests in prop::collection::vec((1.0f64..120.0, 1.0f64..40.0), 1..60)
    ) {
        let engine = PlacementEngine::in_memory(board());
        let surface = Rect::new(0.0, 0.0, 200.0, 298.0);

        for (i, (w, h)) in requests.iter().enumerate() {
            match engine.allocate(*w, *h) {
                Ok(rect) => {
                    engine.commit(&i.to_string(), rect, "X", 5.0).unwrap();
                }
                Err(PlacementError::NoSpaceAvailable { .. }) => {}
                Err(e) => prop_assert!(false, "unexpected error {}", e),
            }
        }

        let records = engine.records();
        for (i, a) in records.iter().enumerate() {
            prop_assert!(surface.contains(&a.rect));
            for b in &records[i + 1..] {
                prop_assert!(!a.rect.intersects(&b.rect));
            }
        }

        let free = engine.free_rects();
        for (i, f) in free.iter().enumerate() {
            prop_assert!(surface.contains(f));
            prop_assert!(records.iter().all(|r| !r.rect.intersects(f)));
            for g in &free[i + 1..] {
                prop_assert!(!f.intersects(g));
            }
        }

        let used: f64 = records.iter().map(|r| r.rect.area()).sum();
        let free_area: f64 = free.iter().map(Rect::area).sum();
        prop_assert!((used + free_area - surface.area()).abs() < 1e-6);
    }
}
