//! Core of the applause service: per-post clap counts with per-member toggles.
//!
//! A signed-in reader can clap a post once and take the clap back later. The
//! count for a post is the number of members currently clapping it.
//!
//! This crate provides:
//! - URL canonicalization ([`CanonicalUrl`]) and content addressing ([`UrlDigest`])
//! - Member identity from platform bearer tokens ([`IdentityExtractor`])
//! - The transactional count/membership store ([`ApplauseStore`], [`SqliteStore`])
//! - The toggle orchestrator ([`ApplauseService`])
//! - Prometheus metrics helpers
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌───────────────────┐
//! │   CanonicalUrl   │   │ IdentityExtractor │
//! └────────┬─────────┘   └─────────┬─────────┘
//!          ▼                       │
//! ┌──────────────────┐             │
//! │    UrlDigest     │             │
//! └────────┬─────────┘             │
//!          ▼                       ▼
//! ┌─────────────────────────────────────────┐
//! │             ApplauseService             │
//! └────────────────────┬────────────────────┘
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │     ApplauseStore (SQLite, one tx)      │
//! └─────────────────────────────────────────┘
//! ```

mod canonical;
mod digest;
mod error;
pub mod identity;
pub mod metrics;
mod service;
pub mod store;

pub use canonical::CanonicalUrl;
pub use digest::{DIGEST_LEN, UrlDigest};
pub use error::{Error, Result};
pub use identity::{ActorId, IdentityExtractor};
pub use service::{ApplauseService, ClapState};
pub use store::{ApplauseStore, SqliteStore, SqliteStoreConfig, ToggleOutcome};
