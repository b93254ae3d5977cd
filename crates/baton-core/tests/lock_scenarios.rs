//! Lock state machine scenarios, driven in virtual time.
//!
//! "Other writers" act from `ManualClock` sleep hooks: the hook for sleep
//! number N runs while this writer is suspended in its N-th sleep.

use std::sync::Arc;
use std::time::Duration;

use baton_core::app::{LockContext, LockCoordinator, ReporterBuilder};
use baton_core::document::{markup, parse};
use baton_core::domain::{
    AcquiringPhase, BatonError, CreatingPhase, ErrorKind, HoldingPhase, LockState, LockTiming,
    ReportFragment, WriterId,
};
use baton_core::impls::{InMemoryDocumentStore, ManualClock, RecordingEventSink};
use baton_core::ports::{Blob, BlobId, StoreError};
use rstest::{fixture, rstest};
use ulid::Ulid;

use LockState::{Acquired, InitialRead};

const OTHER_WRITER: &str = "writer-other";

const CREATE_WAIT: LockState = LockState::Creating(CreatingPhase::Waiting);
const CREATE_SEARCH: LockState = LockState::Creating(CreatingPhase::Searching);
const CREATE: LockState = LockState::Creating(CreatingPhase::Creating);
const WAIT: LockState = LockState::Acquiring(AcquiringPhase::Waiting);
const ACQUIRE: LockState = LockState::Acquiring(AcquiringPhase::Acquiring);
const WRITE: LockState = LockState::Acquiring(AcquiringPhase::Writing);
const HOLD: LockState = LockState::Holding(HoldingPhase::Holding);
const CHECK: LockState = LockState::Holding(HoldingPhase::Checking);

struct Harness {
    store: Arc<InMemoryDocumentStore>,
    clock: ManualClock,
    sink: Arc<RecordingEventSink>,
    context: LockContext,
}

impl Harness {
    async fn run(&self) -> Result<Blob, BatonError> {
        let mut coordinator =
            LockCoordinator::new(self.clock.clone(), Arc::clone(&self.sink)).with_seed(7);
        coordinator
            .acquire_and_apply(self.store.as_ref(), &self.context, |current| match current {
                None => "Initial Body".to_string(),
                Some(_) => "Updated Body".to_string(),
            })
            .await
    }

    fn body(&self, text: &str) -> String {
        format!("{text}\n{}", self.context.footer())
    }

    fn locked_body(&self, text: &str, owner: &str) -> String {
        markup::with_lock(&self.body(text), owner)
    }

    fn states(&self) -> Vec<LockState> {
        self.sink.states()
    }
}

#[fixture]
fn harness() -> Harness {
    Harness {
        store: Arc::new(InMemoryDocumentStore::new()),
        clock: ManualClock::new(),
        sink: Arc::new(RecordingEventSink::new()),
        context: LockContext::new(
            "tachometer/pr-5",
            WriterId::from_ulid(Ulid::new()),
            LockTiming::default(),
        )
        .unwrap(),
    }
}

/// Five 500ms confirmation rounds, then acquired.
fn confirmation() -> Vec<LockState> {
    let mut states = Vec::new();
    for _ in 0..5 {
        states.push(HOLD);
        states.push(CHECK);
    }
    states.push(Acquired);
    states
}

fn trace(prefix: &[LockState]) -> Vec<LockState> {
    let mut states = prefix.to_vec();
    states.extend(confirmation());
    states
}

fn assert_released(blob: &Blob) {
    assert!(
        !blob.body.contains(markup::LOCK_ID),
        "final body still carries a lock marker: {}",
        blob.body
    );
}

#[rstest]
#[tokio::test]
async fn creates_document_when_none_exists(harness: Harness) {
    let blob = harness.run().await.unwrap();

    assert_eq!(
        harness.states(),
        vec![
            InitialRead,
            CREATE_WAIT,
            CREATE_SEARCH,
            CREATE_WAIT,
            CREATE_SEARCH,
            CREATE,
            Acquired
        ]
    );
    assert_released(&blob);
    assert_eq!(blob.body, harness.body("Initial Body"));
    assert_eq!(harness.store.create_count(), 1);
    assert_eq!(harness.store.overwrite_count(), 0);
}

#[rstest]
#[tokio::test]
async fn updates_existing_unlocked_document(harness: Harness) {
    let id = harness.store.insert(harness.body("Initial Body"));

    let blob = harness.run().await.unwrap();

    assert_eq!(harness.states(), trace(&[InitialRead, WAIT, ACQUIRE, WRITE]));
    assert_released(&blob);
    assert_eq!(blob.id, id);
    assert_eq!(harness.store.body(id).unwrap(), harness.body("Updated Body"));
    // One lock write plus the final write.
    assert_eq!(harness.store.overwrite_count(), 2);
    assert_eq!(harness.store.create_count(), 0);
    assert_eq!(harness.clock.sleeps(), vec![Duration::from_millis(500); 5]);
}

#[rstest]
#[tokio::test]
async fn held_time_accumulates_per_check(harness: Harness) {
    harness.store.insert(harness.body("Initial Body"));

    harness.run().await.unwrap();

    let held: Vec<u128> = harness
        .sink
        .events()
        .iter()
        .filter(|e| matches!(e.state, HOLD | CHECK | Acquired))
        .map(|e| e.telemetry.total_held_time.as_millis())
        .collect();
    assert_eq!(
        held,
        vec![0, 500, 500, 1000, 1000, 1500, 1500, 2000, 2000, 2500, 2500]
    );
}

#[rstest]
#[tokio::test]
async fn finds_document_created_while_searching(harness: Harness) {
    let store = Arc::clone(&harness.store);
    let locked = harness.locked_body("Initial Body", OTHER_WRITER);
    let released = harness.body("Updated Body #1");
    harness.clock.on_sleep(move |number, _| match number {
        // The other job wins the create race while we wait to search again.
        2 => {
            store.insert(locked.clone());
        }
        // ...and releases its lock while we back off.
        3 => {
            store.set_body(BlobId::new(1), released.clone());
        }
        _ => {}
    });

    let blob = harness.run().await.unwrap();

    assert_eq!(
        harness.states(),
        trace(&[
            InitialRead,
            CREATE_WAIT,
            CREATE_SEARCH,
            CREATE_WAIT,
            CREATE_SEARCH,
            WAIT,
            ACQUIRE,
            WRITE
        ])
    );
    assert_released(&blob);
    assert_eq!(harness.store.create_count(), 0);
    assert_eq!(harness.store.blobs().len(), 1);
}

#[rstest]
#[tokio::test]
async fn resumes_lock_already_held_by_self(harness: Harness) {
    let owner = harness.context.owner_id().to_string();
    let id = harness
        .store
        .insert(harness.locked_body("Initial Body", &owner));

    let blob = harness.run().await.unwrap();

    assert_eq!(harness.states(), trace(&[InitialRead]));
    assert_released(&blob);
    assert_eq!(harness.store.body(id).unwrap(), harness.body("Updated Body"));
    // Only the final write: the marker was already ours.
    assert_eq!(harness.store.overwrite_count(), 1);
}

#[rstest]
#[tokio::test]
async fn waits_for_other_holder_to_release(harness: Harness) {
    let id = harness
        .store
        .insert(harness.locked_body("Initial Body", OTHER_WRITER));
    let store = Arc::clone(&harness.store);
    let released = harness.body("Updated Body #1");
    harness.clock.on_sleep(move |number, _| {
        if number == 1 {
            store.set_body(id, released.clone());
        }
    });

    let blob = harness.run().await.unwrap();

    assert_eq!(
        harness.states(),
        trace(&[InitialRead, WAIT, ACQUIRE, WAIT, ACQUIRE, WRITE])
    );
    assert_released(&blob);

    let timing = harness.context.timing();
    let backoff = harness.clock.sleeps()[0];
    assert!(backoff >= timing.min_wait_time && backoff <= timing.max_wait_time);
}

#[rstest]
#[tokio::test]
async fn restarts_acquisition_after_losing_hold(harness: Harness) {
    let id = harness.store.insert(harness.body("Initial Body"));
    let store = Arc::clone(&harness.store);
    let stolen = harness.locked_body("Updated Body #1", OTHER_WRITER);
    let released = harness.body("Updated Body #1");
    harness.clock.on_sleep(move |number, _| match number {
        // Another job overwrites our marker during the first hold.
        1 => {
            store.set_body(id, stolen.clone());
        }
        2 => {
            store.set_body(id, released.clone());
        }
        _ => {}
    });

    let blob = harness.run().await.unwrap();

    assert_eq!(
        harness.states(),
        trace(&[
            InitialRead,
            WAIT,
            ACQUIRE,
            WRITE,
            HOLD,
            CHECK,
            WAIT,
            ACQUIRE,
            WRITE
        ])
    );
    assert_released(&blob);

    // Wait time restarts from zero once the hold is lost.
    let events = harness.sink.events();
    let rewait = events.iter().filter(|e| e.state == WAIT).nth(1).unwrap();
    assert_eq!(rewait.telemetry.total_wait_time, Duration::ZERO);
}

#[rstest]
#[tokio::test]
async fn times_out_when_lock_is_never_released(harness: Harness) {
    let id = harness
        .store
        .insert(harness.locked_body("Initial Body", OTHER_WRITER));
    let before = harness.store.body(id).unwrap();

    let err = harness.run().await.unwrap_err();

    assert!(err.to_string().contains("Timed out waiting to acquire lock"));
    assert_eq!(err.kind(), ErrorKind::Contention);
    let BatonError::LockTimeout { total_wait, .. } = err else {
        panic!("expected a lock timeout, got {err:?}");
    };
    assert!(total_wait >= harness.context.timing().wait_timeout);

    assert_eq!(harness.states().last(), Some(&LockState::Failed));
    assert_eq!(harness.store.body(id).unwrap(), before);
    assert_eq!(harness.store.overwrite_count(), 0);
    assert_eq!(harness.store.create_count(), 0);
}

#[rstest]
#[tokio::test]
async fn store_failures_are_propagated_unretried(harness: Harness) {
    harness
        .store
        .fail_next(StoreError::Io("connection reset".into()));

    let err = harness.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(matches!(err, BatonError::Transport(StoreError::Io(_))));
    assert_eq!(harness.states(), vec![InitialRead]);
}

#[rstest]
#[tokio::test]
async fn short_timing_scales_the_protocol(mut harness: Harness) {
    let timing = LockTiming::default()
        .with_min_hold_time(Duration::from_millis(100))
        .with_wait_range(Duration::from_millis(10), Duration::from_millis(20));
    harness.context = LockContext::new(
        harness.context.domain_key(),
        harness.context.writer_id(),
        timing,
    )
    .unwrap();
    harness.store.insert(harness.body("Initial Body"));

    harness.run().await.unwrap();

    // check_delay is derived as min(500ms, 100ms / 2).
    assert_eq!(harness.clock.sleeps(), vec![Duration::from_millis(50); 2]);
}

#[tokio::test(start_paused = true)]
async fn concurrent_writers_converge_on_one_document() {
    let store = Arc::new(InMemoryDocumentStore::new());

    // Started in reverse so the document has to order the entries itself.
    let handles: Vec<_> = (0..4i64)
        .rev()
        .map(|job| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut reporter = ReporterBuilder::new()
                    .domain_key("tachometer/pr-9")
                    .seed(job as u64 + 1)
                    .build()
                    .unwrap();
                let fragment = ReportFragment::new(format!("job-{job}"), job, 1)
                    .with_detail(format!("<p>J{job}</p>"));
                reporter.report(store.as_ref(), &fragment).await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let blobs = store.blobs();
    assert_eq!(blobs.len(), 1);
    let body = &blobs[0].body;
    assert_eq!(markup::locked_by(body), None);
    for job in 0..4 {
        assert!(body.contains(&format!("<p>J{job}</p>")), "J{job} missing: {body}");
    }

    let root = parse(body);
    for container in [markup::summary_list_id(), markup::results_container_id()] {
        let indexes: Vec<&str> = root
            .find_by_id(&container)
            .unwrap()
            .element_children()
            .filter_map(|el| el.get_attr(markup::JOB_INDEX_ATTR))
            .collect();
        assert_eq!(indexes, vec!["0", "1", "2", "3"]);
    }
}
