use engravekit_core::{Error, JobPlacement, JobSource, JobStatus, Point, Rect};
use engravekit_pipeline::{JobOutcome, JobQueue, INTERRUPTED};
use engravekit_settings::JobSettings;
use proptest::prelude::*;
use tempfile::TempDir;

fn placement() -> JobPlacement {
    JobPlacement {
        rect: Rect::new(0.0, 0.0, 20.0, 6.5),
        text_height_mm: 5.0,
        origin: Point::new(0.0, 0.0),
    }
}

#[test]
fn test_queue_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("jobs.json");
    let settings = JobSettings::default();

    let (done_id, queued_id) = {
        let queue = JobQueue::open(&path, &settings).unwrap();
        let done = queue.enqueue("Ada", JobSource::Subscription).unwrap();
        let queued = queue.enqueue("Grace", JobSource::Gift).unwrap();
        queue.mark_placed(&done.id, placement()).unwrap();
        queue.mark_engraving(&done.id).unwrap();
        queue.mark_result(&done.id, JobOutcome::Done).unwrap();
        (done.id, queued.id)
    };

    let queue = JobQueue::open(&path, &settings).unwrap();
    assert_eq!(queue.all().len(), 2);
    assert_eq!(queue.get(&done_id).unwrap().status, JobStatus::Done);
    let queued = queue.get(&queued_id).unwrap();
    assert_eq!(queued.status, JobStatus::Queued);
    assert_eq!(queued.source, JobSource::Gift);

    // dedup still applies to the reloaded pending request
    assert!(matches!(
        queue.enqueue("grace", JobSource::Manual),
        Err(Error::Duplicate { .. })
    ));
}

#[test]
fn test_restart_recovers_interrupted_jobs() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("jobs.json");
    let settings = JobSettings::default();

    let (engraving_id, placed_id) = {
        let queue = JobQueue::open(&path, &settings).unwrap();
        let engraving = queue.enqueue("Linus", JobSource::Subscription).unwrap();
        let placed = queue.enqueue("Margaret", JobSource::Subscription).unwrap();
        queue.mark_placed(&engraving.id, placement()).unwrap();
        queue.mark_engraving(&engraving.id).unwrap();
        queue.mark_placed(&placed.id, placement()).unwrap();
        (engraving.id, placed.id)
    };

    let queue = JobQueue::open(&path, &settings).unwrap();

    let interrupted = queue.get(&engraving_id).unwrap();
    assert_eq!(interrupted.status, JobStatus::Failed);
    assert_eq!(interrupted.error.as_deref(), Some(INTERRUPTED));
    assert!(interrupted.completed_at.is_some());

    let placed = queue.get(&placed_id).unwrap();
    assert_eq!(placed.status, JobStatus::Queued);
    assert_eq!(placed.placement, None);

    // the interrupted name is no longer pending and can be submitted again
    assert!(queue.enqueue("linus", JobSource::Manual).is_ok());

    // recovery itself was persisted
    let reopened = JobQueue::open(&path, &settings).unwrap();
    assert_eq!(reopened.get(&engraving_id).unwrap().status, JobStatus::Failed);
}

#[test]
fn test_terminal_jobs_are_immutable() {
    let queue = JobQueue::in_memory(&JobSettings::default());
    let job = queue.enqueue("Ken", JobSource::Manual).unwrap();
    queue
        .mark_result(
            &job.id,
            JobOutcome::Failed {
                error: "Emergency stop active".to_string(),
                retryable: false,
            },
        )
        .unwrap();

    assert!(queue.mark_result(&job.id, JobOutcome::Done).is_err());
    assert!(queue.mark_placed(&job.id, placement()).is_err());
    assert_eq!(queue.get(&job.id).unwrap().status, JobStatus::Failed);
}

#[test]
fn test_redo_requires_finished_job() {
    let queue = JobQueue::in_memory(&JobSettings::default());
    let job = queue.enqueue("Barbara", JobSource::Subscription).unwrap();
    assert!(queue.redo(&job.id).is_err());

    queue.mark_result(&job.id, JobOutcome::Done).unwrap();
    let again = queue.redo(&job.id).unwrap();
    assert_eq!(again.name, "Barbara");
    assert_eq!(again.source, JobSource::Manual);
    assert_ne!(again.id, job.id);

    assert!(matches!(
        queue.redo(&"missing".into()),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_history_is_pruned_oldest_first() {
    let settings = JobSettings {
        history_limit: 2,
        ..Default::default()
    };
    let queue = JobQueue::in_memory(&settings);
    for name in ["a1", "a2", "a3"] {
        let job = queue.enqueue(name, JobSource::Test).unwrap();
        queue.mark_result(&job.id, JobOutcome::Done).unwrap();
    }
    queue.enqueue("pending", JobSource::Test).unwrap();

    let names: Vec<_> = queue.all().into_iter().map(|j| j.name).collect();
    assert_eq!(names, vec!["a2", "a3", "pending"]);
}

proptest! {
    #[test]
    fn prop_one_pending_request_per_name(
        names in prop::collection::vec(prop::sample::select(vec!["ada", "Ada ", "GRACE", "grace", "linus", " Linus"]), 1..40)
    ) {
        let queue = JobQueue::in_memory(&JobSettings::default());
        let mut accepted = 0;
        for name in &names {
            match queue.enqueue(name, JobSource::Subscription) {
                Ok(_) => accepted += 1,
                Err(Error::Duplicate { .. }) => {}
                Err(e) => panic!("unexpected error: {}", e),
            }
        }

        let mut distinct: Vec<String> = names.iter().map(|n| n.trim().to_lowercase()).collect();
        distinct.sort();
        distinct.dedup();
        prop_assert_eq!(accepted, distinct.len());
        prop_assert_eq!(queue.len(), distinct.len());
    }
}
