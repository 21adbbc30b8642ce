//! The toggle orchestrator.
//!
//! [`ApplauseService`] ties the pieces together for the two public
//! operations:
//!
//! ```text
//! raw URL ──► CanonicalUrl ──► UrlDigest ──┐
//!                                          ├──► ApplauseStore ──► ClapState
//! Authorization ──► IdentityExtractor ─────┘
//! ```
//!
//! An unparseable URL is answered with an empty [`ClapState`] without touching
//! the store, for both operations.

use crate::canonical::CanonicalUrl;
use crate::digest::UrlDigest;
use crate::error::{Error, Result};
use crate::identity::{ActorId, IdentityExtractor};
use crate::metrics;
use crate::store::ApplauseStore;

/// What a reader sees for a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClapState {
    /// Number of members currently clapping the post.
    pub count: u64,
    /// Whether the requesting member is one of them.
    pub has_clapped: bool,
}

/// Answers "how many claps, and is one of them mine" and flips membership.
pub struct ApplauseService<S> {
    store: S,
    identity: IdentityExtractor,
}

impl<S: ApplauseStore> ApplauseService<S> {
    pub fn new(store: S, identity: IdentityExtractor) -> Self {
        Self { store, identity }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn identity(&self) -> &IdentityExtractor {
        &self.identity
    }

    /// Read the count and the caller's membership. Never writes.
    pub fn peek(&self, raw_url: &str, authorization: Option<&str>) -> Result<ClapState> {
        let Some(url) = canonicalize(raw_url) else {
            metrics::record_peek("invalid_url");
            return Ok(ClapState::default());
        };
        let digest = UrlDigest::of(&url);

        let state = self
            .read_state(&digest, authorization)
            .inspect_err(|err| log_storage_failure("peek", &digest, err))?;

        metrics::record_peek("ok");
        Ok(state)
    }

    /// Flip the caller's membership and return the state after the flip.
    ///
    /// Not idempotent: every authorized call flips exactly once, so a retried
    /// request undoes the first one.
    pub fn toggle(&self, raw_url: &str, authorization: Option<&str>) -> Result<ClapState> {
        let Some(url) = canonicalize(raw_url) else {
            metrics::record_toggle("invalid_url");
            return Ok(ClapState::default());
        };

        let Some(actor) = self.identity.extract(authorization) else {
            metrics::record_toggle("unauthorized");
            return Err(Error::Unauthorized);
        };

        let digest = UrlDigest::of(&url);
        let outcome = self
            .store
            .toggle(&digest, &url, &actor)
            .inspect_err(|err| log_storage_failure("toggle", &digest, err))?;

        metrics::record_toggle(if outcome.clapped { "clapped" } else { "unclapped" });
        Ok(ClapState {
            count: outcome.count,
            has_clapped: outcome.clapped,
        })
    }

    fn read_state(&self, digest: &UrlDigest, authorization: Option<&str>) -> Result<ClapState> {
        let count = self.store.get_count(digest)?;
        let has_clapped = match self.identity.extract(authorization) {
            Some(actor) => self.is_member(digest, &actor)?,
            None => false,
        };
        Ok(ClapState { count, has_clapped })
    }

    fn is_member(&self, digest: &UrlDigest, actor: &ActorId) -> Result<bool> {
        self.store.get_membership(digest, actor)
    }
}

fn canonicalize(raw_url: &str) -> Option<CanonicalUrl> {
    match CanonicalUrl::parse(raw_url) {
        Ok(url) => Some(url),
        Err(err) => {
            tracing::debug!(error = %err, "ignoring unparseable post URL");
            None
        }
    }
}

fn log_storage_failure(operation: &'static str, digest: &UrlDigest, err: &Error) {
    if err.is_storage() {
        metrics::record_storage_error(operation);
        tracing::error!(operation, %digest, error = %err, "applause storage failure");
    }
}
