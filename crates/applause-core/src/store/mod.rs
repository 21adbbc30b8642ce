//! Durable applause state.
//!
//! Two tables back the engine: one aggregate count per URL digest and one
//! membership row per (digest, member). The count is maintained in lockstep
//! with the membership rows inside a single transaction; it is never
//! recomputed from them.

pub mod schema;
mod sqlite;

pub use sqlite::{SqliteStore, SqliteStoreConfig};

use crate::canonical::CanonicalUrl;
use crate::digest::UrlDigest;
use crate::error::Result;
use crate::identity::ActorId;

/// Result of a toggle: the count and membership state after the flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    /// Aggregate count read back inside the toggle transaction.
    pub count: u64,
    /// True if the member is now clapping.
    pub clapped: bool,
}

/// Repository over the count and membership tables.
///
/// Each method is one transaction. Implementations must keep the count equal
/// to the number of membership rows for every digest they mutate.
pub trait ApplauseStore: Send + Sync {
    /// Aggregate count for a digest, 0 if the URL was never clapped.
    fn get_count(&self, digest: &UrlDigest) -> Result<u64>;

    /// Whether `actor` currently claps the URL.
    fn get_membership(&self, digest: &UrlDigest, actor: &ActorId) -> Result<bool>;

    /// Record a clap. No-op if the member already claps the URL.
    fn clap(&self, digest: &UrlDigest, url: &CanonicalUrl, actor: &ActorId) -> Result<()>;

    /// Remove a clap. No-op if the member does not clap the URL.
    fn unclap(&self, digest: &UrlDigest, actor: &ActorId) -> Result<()>;

    /// Flip the member's state and read back the resulting count, all in one
    /// write transaction.
    fn toggle(&self, digest: &UrlDigest, url: &CanonicalUrl, actor: &ActorId)
    -> Result<ToggleOutcome>;
}

impl<S: ApplauseStore + ?Sized> ApplauseStore for std::sync::Arc<S> {
    fn get_count(&self, digest: &UrlDigest) -> Result<u64> {
        (**self).get_count(digest)
    }

    fn get_membership(&self, digest: &UrlDigest, actor: &ActorId) -> Result<bool> {
        (**self).get_membership(digest, actor)
    }

    fn clap(&self, digest: &UrlDigest, url: &CanonicalUrl, actor: &ActorId) -> Result<()> {
        (**self).clap(digest, url, actor)
    }

    fn unclap(&self, digest: &UrlDigest, actor: &ActorId) -> Result<()> {
        (**self).unclap(digest, actor)
    }

    fn toggle(
        &self,
        digest: &UrlDigest,
        url: &CanonicalUrl,
        actor: &ActorId,
    ) -> Result<ToggleOutcome> {
        (**self).toggle(digest, url, actor)
    }
}
