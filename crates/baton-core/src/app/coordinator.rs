//! LockCoordinator - advisory mutual exclusion over a shared blob.
//!
//! The blob's own body is the lock medium: a marker naming the holder is
//! written into it, and a holder only trusts the lock after reading its own
//! marker back, unchallenged, for `min_hold_time`. Once confirmed, the
//! caller's mutation is applied to the freshest read and written back without
//! the marker, which releases the lock.
//!
//! The state machine is a plain loop over [`Step`]; every suspension point
//! goes through the injected [`Clock`], so the whole protocol can run in
//! virtual time.

use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};

use crate::app::context::LockContext;
use crate::document::markup;
use crate::domain::{
    AcquiringPhase, BatonError, CreatingPhase, HoldingPhase, LockEvent, LockState, LockTelemetry,
    as_millis,
};
use crate::ports::{Blob, BlobId, Clock, DocumentStore, EventSink, SystemClock, TracingEventSink};

/// How the lock was obtained; decides what `acquired` writes.
enum Finish {
    /// We created the blob ourselves. It already holds the mutated content.
    Created(Blob),
    /// Confirmed hold. Carries the read that confirmed it.
    Confirmed(Blob),
}

/// Internal state, carrying the data each state needs.
enum Step {
    InitialRead,
    CreateWait,
    CreateSearch,
    Create,
    /// `contested` is set when the last observation showed another holder;
    /// only then does the wait actually sleep.
    Wait { id: BlobId, contested: bool },
    Acquire(BlobId),
    Write(Blob),
    Hold(BlobId),
    Check(BlobId),
    Acquired(Finish),
    Failed,
}

impl Step {
    fn state(&self) -> LockState {
        match self {
            Step::InitialRead => LockState::InitialRead,
            Step::CreateWait => LockState::Creating(CreatingPhase::Waiting),
            Step::CreateSearch => LockState::Creating(CreatingPhase::Searching),
            Step::Create => LockState::Creating(CreatingPhase::Creating),
            Step::Wait { .. } => LockState::Acquiring(AcquiringPhase::Waiting),
            Step::Acquire(_) => LockState::Acquiring(AcquiringPhase::Acquiring),
            Step::Write(_) => LockState::Acquiring(AcquiringPhase::Writing),
            Step::Hold(_) => LockState::Holding(HoldingPhase::Holding),
            Step::Check(_) => LockState::Holding(HoldingPhase::Checking),
            Step::Acquired(_) => LockState::Acquired,
            Step::Failed => LockState::Failed,
        }
    }
}

pub struct LockCoordinator<C = SystemClock, E = TracingEventSink> {
    clock: C,
    events: E,
    rng: StdRng,
}

impl Default for LockCoordinator {
    fn default() -> Self {
        Self::new(SystemClock, TracingEventSink)
    }
}

impl<C: Clock, E: EventSink> LockCoordinator<C, E> {
    pub fn new(clock: C, events: E) -> Self {
        Self {
            clock,
            events,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic backoff, for tests and reproducible simulations.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Acquire the lock on the context's blob (creating the blob if none
    /// exists), apply `mutate` to the current content and write the result
    /// as the final, unlocked body.
    ///
    /// `mutate` receives `None` when the blob is being created, otherwise the
    /// latest confirmed-exclusive content with the lock marker removed. It is
    /// called exactly once on success and never on failure.
    ///
    /// # Errors
    /// - `BatonError::LockTimeout` when another writer keeps the lock for
    ///   `wait_timeout`; nothing is written.
    /// - `BatonError::Transport` for any store failure, unretried.
    pub async fn acquire_and_apply<S, F>(
        &mut self,
        store: &S,
        context: &LockContext,
        mut mutate: F,
    ) -> Result<Blob, BatonError>
    where
        S: DocumentStore + ?Sized,
        F: FnMut(Option<&str>) -> String + Send,
    {
        let timing = context.timing().clone();
        let mut telemetry = LockTelemetry::default();
        let mut step = Step::InitialRead;

        loop {
            self.events.emit(&LockEvent::new(
                context.owner_id(),
                step.state(),
                telemetry,
            ));

            step = match step {
                Step::InitialRead => match find_match(store, context).await? {
                    None => Step::CreateWait,
                    Some(blob) => match markup::locked_by(&blob.body) {
                        Some(owner) if owner == context.owner_id() => {
                            info!(blob = %blob.id, "resuming lock already held by this writer");
                            Step::Hold(blob.id)
                        }
                        _ => Step::Wait {
                            id: blob.id,
                            contested: false,
                        },
                    },
                },

                Step::CreateWait => {
                    telemetry.create_attempts += 1;
                    let delay = timing.create_delay(telemetry.create_attempts, &mut self.rng);
                    telemetry.wait_time = delay;
                    self.clock.sleep(delay).await;
                    Step::CreateSearch
                }

                Step::CreateSearch => match find_match(store, context).await? {
                    Some(blob) => {
                        info!(blob = %blob.id, "found document created by another writer");
                        Step::Wait {
                            id: blob.id,
                            contested: held_by_other(&blob, context),
                        }
                    }
                    None if telemetry.create_attempts < timing.create_attempts => Step::CreateWait,
                    None => Step::Create,
                },

                Step::Create => {
                    let body = context.finalize(&mutate(None));
                    let blob = store.create(&body).await?;
                    info!(blob = %blob.id, "created new document");
                    Step::Acquired(Finish::Created(blob))
                }

                Step::Wait { id, contested } => {
                    if !contested {
                        telemetry.wait_time = Duration::ZERO;
                        Step::Acquire(id)
                    } else if telemetry.total_wait_time >= timing.wait_timeout {
                        Step::Failed
                    } else {
                        let delay = timing.wait_delay(&mut self.rng);
                        telemetry.wait_time = delay;
                        self.clock.sleep(delay).await;
                        telemetry.total_wait_time += delay;
                        Step::Acquire(id)
                    }
                }

                Step::Acquire(id) => {
                    let blob = store.read(id).await?;
                    if held_by_other(&blob, context) {
                        Step::Wait {
                            id,
                            contested: true,
                        }
                    } else {
                        Step::Write(blob)
                    }
                }

                Step::Write(blob) => {
                    let body = markup::with_lock(&blob.body, context.owner_id());
                    let written = store.overwrite(blob.id, &body).await?;
                    telemetry.total_held_time = Duration::ZERO;
                    Step::Hold(written.id)
                }

                Step::Hold(id) => {
                    self.clock.sleep(timing.check_delay).await;
                    telemetry.total_held_time += timing.check_delay;
                    Step::Check(id)
                }

                Step::Check(id) => {
                    let blob = store.read(id).await?;
                    match markup::locked_by(&blob.body) {
                        Some(owner) if owner == context.owner_id() => {
                            if telemetry.total_held_time < timing.min_hold_time {
                                Step::Hold(id)
                            } else {
                                Step::Acquired(Finish::Confirmed(blob))
                            }
                        }
                        other => {
                            info!(
                                blob = %id,
                                held_by = other.as_deref().unwrap_or("nobody"),
                                held_ms = as_millis(telemetry.total_held_time),
                                "lost the lock while confirming it"
                            );
                            telemetry.total_wait_time = Duration::ZERO;
                            Step::Wait {
                                id,
                                contested: other.is_some(),
                            }
                        }
                    }
                }

                Step::Acquired(Finish::Created(blob)) => return Ok(blob),

                Step::Acquired(Finish::Confirmed(blob)) => {
                    info!(
                        blob = %blob.id,
                        waited_ms = as_millis(telemetry.total_wait_time),
                        "lock acquired"
                    );
                    let current = markup::strip_lock(&blob.body);
                    let body = context.finalize(&mutate(Some(&current)));
                    return Ok(store.overwrite(blob.id, &body).await?);
                }

                Step::Failed => {
                    warn!(
                        waited_ms = as_millis(telemetry.total_wait_time),
                        "giving up on the lock"
                    );
                    return Err(BatonError::LockTimeout {
                        total_wait: telemetry.total_wait_time,
                        total_held: telemetry.total_held_time,
                    });
                }
            };
        }
    }
}

/// First blob of the store carrying the context's footer fingerprint.
async fn find_match<S>(store: &S, context: &LockContext) -> Result<Option<Blob>, BatonError>
where
    S: DocumentStore + ?Sized,
{
    let blobs = store.list().await?;
    Ok(blobs.into_iter().find(|blob| context.matches(blob)))
}

fn held_by_other(blob: &Blob, context: &LockContext) -> bool {
    markup::locked_by(&blob.body).is_some_and(|owner| owner != context.owner_id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LockTiming, WriterId};
    use crate::impls::{InMemoryDocumentStore, ManualClock, RecordingEventSink};
    use std::sync::Arc;
    use ulid::Ulid;

    fn context() -> LockContext {
        LockContext::new(
            "wf/pr-1",
            WriterId::from_ulid(Ulid::new()),
            LockTiming::default(),
        )
        .unwrap()
    }

    fn coordinator() -> (
        LockCoordinator<ManualClock, Arc<RecordingEventSink>>,
        Arc<RecordingEventSink>,
    ) {
        let sink = Arc::new(RecordingEventSink::new());
        let coordinator = LockCoordinator::new(ManualClock::new(), Arc::clone(&sink)).with_seed(42);
        (coordinator, sink)
    }

    #[tokio::test]
    async fn creates_when_nothing_matches() {
        let store = InMemoryDocumentStore::new();
        store.insert("unrelated comment");
        let ctx = context();
        let (mut coordinator, _) = coordinator();

        let blob = coordinator
            .acquire_and_apply(&store, &ctx, |current| {
                assert!(current.is_none());
                "<p>first</p>".to_string()
            })
            .await
            .unwrap();

        assert_eq!(store.create_count(), 1);
        assert!(blob.body.starts_with("<p>first</p>"));
        assert!(ctx.matches(&blob));
        assert_eq!(markup::locked_by(&blob.body), None);
    }

    #[tokio::test]
    async fn mutation_sees_content_without_marker() {
        let store = InMemoryDocumentStore::new();
        let ctx = context();
        let id = store.insert(format!("<p>old</p>\n{}", ctx.footer()));
        let (mut coordinator, _) = coordinator();

        let blob = coordinator
            .acquire_and_apply(&store, &ctx, |current| {
                let current = current.unwrap();
                assert!(!current.contains(markup::LOCK_ID));
                current.replace("old", "new")
            })
            .await
            .unwrap();

        assert_eq!(blob.id, id);
        assert_eq!(store.body(id).unwrap(), format!("<p>new</p>\n{}", ctx.footer()));
    }

    #[tokio::test]
    async fn confirmation_waits_at_least_min_hold_time() {
        let store = InMemoryDocumentStore::new();
        let ctx = context();
        store.insert(ctx.footer());
        let (mut coordinator, sink) = coordinator();

        coordinator
            .acquire_and_apply(&store, &ctx, |c| c.unwrap_or_default().to_string())
            .await
            .unwrap();

        let last = sink.events().last().cloned().unwrap();
        assert_eq!(last.state, LockState::Acquired);
        assert!(last.telemetry.total_held_time >= ctx.timing().min_hold_time);
        assert!(coordinator.clock().elapsed() >= ctx.timing().min_hold_time);
    }
}
