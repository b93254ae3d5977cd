//! Reporter - post or update one report in the shared document.
//!
//! Wires the pieces together: the coordinator takes the lock and the merger
//! is the mutation applied while it is held.
//!
//! # Fail-fast construction
//! `ReporterBuilder::build()` validates the configuration up front (domain
//! key present, timing usable) so a misconfigured job fails before touching
//! the store.

use tracing::info;

use crate::app::context::LockContext;
use crate::app::coordinator::LockCoordinator;
use crate::document::DocumentMerger;
use crate::domain::{BatonError, LockTiming, ReportFragment, TimingError, WriterId};
use crate::ports::{
    Blob, Clock, DocumentStore, EventSink, IdGenerator, SystemClock, TracingEventSink,
    UlidGenerator,
};

/// Merge `fragment` into the document of `context`'s domain, creating the
/// document if it does not exist yet. Returns the final blob.
pub async fn post_or_update_report<S, C, E>(
    coordinator: &mut LockCoordinator<C, E>,
    store: &S,
    context: &LockContext,
    merger: &DocumentMerger,
    fragment: &ReportFragment,
) -> Result<Blob, BatonError>
where
    S: DocumentStore + ?Sized,
    C: Clock,
    E: EventSink,
{
    info!(
        report = %fragment.report_id,
        run = fragment.run_number,
        writer = context.owner_id(),
        "posting report"
    );
    coordinator
        .acquire_and_apply(store, context, |current| merger.merge(current, fragment))
        .await
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("a coordination domain key is required")]
    MissingDomainKey,

    #[error("invalid lock timing: {0}")]
    InvalidTiming(#[from] TimingError),

    #[error(transparent)]
    Context(#[from] BatonError),
}

pub struct ReporterBuilder<C = SystemClock, E = TracingEventSink> {
    domain_key: Option<String>,
    writer_id: Option<WriterId>,
    timing: LockTiming,
    heading: Option<String>,
    seed: Option<u64>,
    clock: C,
    events: E,
}

impl ReporterBuilder {
    pub fn new() -> Self {
        Self {
            domain_key: None,
            writer_id: None,
            timing: LockTiming::default(),
            heading: None,
            seed: None,
            clock: SystemClock,
            events: TracingEventSink,
        }
    }
}

impl Default for ReporterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock + Clone, E: EventSink> ReporterBuilder<C, E> {
    /// Key of the coordination domain, e.g. `"{workflow}/pr-{number}"`.
    pub fn domain_key(mut self, key: impl Into<String>) -> Self {
        self.domain_key = Some(key.into());
        self
    }

    /// Reuse a writer id, e.g. to resume a lock after a restart. A fresh one
    /// is minted otherwise.
    pub fn writer_id(mut self, id: WriterId) -> Self {
        self.writer_id = Some(id);
        self
    }

    pub fn timing(mut self, timing: LockTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = Some(heading.into());
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn clock<C2: Clock + Clone>(self, clock: C2) -> ReporterBuilder<C2, E> {
        ReporterBuilder {
            domain_key: self.domain_key,
            writer_id: self.writer_id,
            timing: self.timing,
            heading: self.heading,
            seed: self.seed,
            clock,
            events: self.events,
        }
    }

    pub fn events<E2: EventSink>(self, events: E2) -> ReporterBuilder<C, E2> {
        ReporterBuilder {
            domain_key: self.domain_key,
            writer_id: self.writer_id,
            timing: self.timing,
            heading: self.heading,
            seed: self.seed,
            clock: self.clock,
            events,
        }
    }

    pub fn build(self) -> Result<Reporter<C, E>, BuildError> {
        let domain_key = self
            .domain_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(BuildError::MissingDomainKey)?;
        self.timing.validate()?;

        let writer_id = match self.writer_id {
            Some(id) => id,
            None => UlidGenerator::new(self.clock.clone()).generate_writer_id(),
        };
        let context = LockContext::new(domain_key, writer_id, self.timing)?;

        let merger = match self.heading {
            Some(heading) => DocumentMerger::new().with_heading(heading),
            None => DocumentMerger::new(),
        };
        let mut coordinator = LockCoordinator::new(self.clock, self.events);
        if let Some(seed) = self.seed {
            coordinator = coordinator.with_seed(seed);
        }

        Ok(Reporter {
            context,
            merger,
            coordinator,
        })
    }
}

/// One writer: its lock context, merger and coordinator.
pub struct Reporter<C = SystemClock, E = TracingEventSink> {
    context: LockContext,
    merger: DocumentMerger,
    coordinator: LockCoordinator<C, E>,
}

impl<C: Clock, E: EventSink> Reporter<C, E> {
    pub fn context(&self) -> &LockContext {
        &self.context
    }

    pub async fn report<S>(
        &mut self,
        store: &S,
        fragment: &ReportFragment,
    ) -> Result<Blob, BatonError>
    where
        S: DocumentStore + ?Sized,
    {
        post_or_update_report(
            &mut self.coordinator,
            store,
            &self.context,
            &self.merger,
            fragment,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::markup;
    use crate::impls::{InMemoryDocumentStore, ManualClock, NoopEventSink};
    use std::time::Duration;

    fn builder() -> ReporterBuilder<ManualClock, NoopEventSink> {
        ReporterBuilder::new()
            .clock(ManualClock::new())
            .events(NoopEventSink)
            .seed(1)
    }

    #[test]
    fn build_requires_domain_key() {
        assert!(matches!(builder().build(), Err(BuildError::MissingDomainKey)));
        assert!(matches!(
            builder().domain_key("  ").build(),
            Err(BuildError::MissingDomainKey)
        ));
    }

    #[test]
    fn build_rejects_invalid_timing() {
        let timing = LockTiming::default()
            .with_wait_range(Duration::from_secs(5), Duration::from_secs(1));
        assert!(matches!(
            builder().domain_key("k").timing(timing).build(),
            Err(BuildError::InvalidTiming(TimingError::InvertedWaitRange { .. }))
        ));
    }

    #[test]
    fn build_keeps_given_writer_id() {
        let id: WriterId = "writer-01ARZ3NDEKTSV4RRFFQ69G5FAV".parse().unwrap();
        let reporter = builder().domain_key("k").writer_id(id).build().unwrap();
        assert_eq!(reporter.context().writer_id(), id);
        assert_eq!(reporter.context().owner_id(), "writer-01ARZ3NDEKTSV4RRFFQ69G5FAV");
    }

    #[tokio::test]
    async fn two_reports_end_up_in_one_document() {
        let store = InMemoryDocumentStore::new();
        let mut first = builder().domain_key("wf/pr-3").build().unwrap();
        let mut second = builder().domain_key("wf/pr-3").build().unwrap();

        let a = ReportFragment::new("a", 0, 1).with_detail("<p>A</p>");
        let b = ReportFragment::new("b", 1, 1).with_detail("<p>B</p>");
        first.report(&store, &a).await.unwrap();
        let blob = second.report(&store, &b).await.unwrap();

        assert_eq!(store.blobs().len(), 1);
        assert!(blob.body.contains("<p>A</p>"));
        assert!(blob.body.contains("<p>B</p>"));
        assert!(blob.body.find("<p>A</p>") < blob.body.find("<p>B</p>"));
        assert_eq!(markup::locked_by(&blob.body), None);
        assert_eq!(blob.body.matches(markup::FOOTER_ATTR).count(), 1);
    }

    #[tokio::test]
    async fn other_domains_are_left_alone() {
        let store = InMemoryDocumentStore::new();
        let mut pr3 = builder().domain_key("wf/pr-3").build().unwrap();
        let mut pr4 = builder().domain_key("wf/pr-4").build().unwrap();

        let fragment = ReportFragment::new("a", 0, 1);
        pr3.report(&store, &fragment).await.unwrap();
        pr4.report(&store, &fragment).await.unwrap();

        assert_eq!(store.blobs().len(), 2);
    }
}
