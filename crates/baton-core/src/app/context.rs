//! LockContext - who we are and which blob belongs to us.

use crate::document::markup;
use crate::domain::{BatonError, LockTiming, WriterId};
use crate::ports::Blob;

/// Per-invocation lock identity. Immutable once built.
///
/// `domain_key` names the coordination domain (for CI: workflow plus pull
/// request). Blobs carrying the domain's footer fingerprint are ours; the
/// writer id distinguishes this process from every other contender.
#[derive(Debug, Clone)]
pub struct LockContext {
    domain_key: String,
    writer_id: WriterId,
    owner: String,
    footer: String,
    fingerprint: String,
    timing: LockTiming,
}

impl LockContext {
    /// Fails fast on unusable timing.
    pub fn new(
        domain_key: impl Into<String>,
        writer_id: WriterId,
        timing: LockTiming,
    ) -> Result<Self, BatonError> {
        timing.validate()?;
        let domain_key = domain_key.into();
        Ok(Self {
            footer: markup::footer(&domain_key),
            fingerprint: markup::footer_fingerprint(&domain_key),
            owner: writer_id.to_string(),
            domain_key,
            writer_id,
            timing,
        })
    }

    /// The id written into the lock marker.
    pub fn owner_id(&self) -> &str {
        &self.owner
    }

    pub fn writer_id(&self) -> WriterId {
        self.writer_id
    }

    pub fn domain_key(&self) -> &str {
        &self.domain_key
    }

    pub fn timing(&self) -> &LockTiming {
        &self.timing
    }

    pub fn footer(&self) -> &str {
        &self.footer
    }

    pub fn matches(&self, blob: &Blob) -> bool {
        blob.body.contains(&self.fingerprint)
    }

    /// Text written as a final, unlocked body: no marker, footer present.
    pub fn finalize(&self, body: &str) -> String {
        let body = markup::strip_lock(body);
        if body.contains(&self.fingerprint) {
            body
        } else if body.is_empty() {
            self.footer.clone()
        } else {
            format!("{body}\n{}", self.footer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::BlobId;
    use std::time::Duration;
    use ulid::Ulid;

    fn context(key: &str) -> LockContext {
        LockContext::new(key, WriterId::from_ulid(Ulid::new()), LockTiming::default()).unwrap()
    }

    #[test]
    fn matches_only_own_domain() {
        let ctx = context("wf-1/pr-7");
        let ours = Blob::new(BlobId::new(1), format!("<p>x</p>\n{}", ctx.footer()));
        let theirs = Blob::new(BlobId::new(2), markup::footer("wf-1/pr-8"));
        let plain = Blob::new(BlobId::new(3), "LGTM");

        assert!(ctx.matches(&ours));
        assert!(!ctx.matches(&theirs));
        assert!(!ctx.matches(&plain));
    }

    #[test]
    fn finalize_strips_marker_and_keeps_single_footer() {
        let ctx = context("k");
        let locked = markup::with_lock(&format!("<p>x</p>\n{}", ctx.footer()), ctx.owner_id());

        let final_body = ctx.finalize(&locked);
        assert_eq!(markup::locked_by(&final_body), None);
        assert_eq!(final_body.matches(ctx.footer()).count(), 1);
        assert_eq!(ctx.finalize(&final_body), final_body);
    }

    #[test]
    fn finalize_appends_missing_footer() {
        let ctx = context("k");
        assert_eq!(ctx.finalize("<p>x</p>"), format!("<p>x</p>\n{}", ctx.footer()));
    }

    #[test]
    fn invalid_timing_is_rejected() {
        let timing = LockTiming::default().with_check_delay(Duration::ZERO);
        let err = LockContext::new("k", WriterId::from_ulid(Ulid::new()), timing).unwrap_err();
        assert!(matches!(err, BatonError::InvalidTiming(_)));
    }
}
