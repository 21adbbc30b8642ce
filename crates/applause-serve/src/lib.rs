//! Applause Serve - HTTP API for per-post clap counts
//!
//! The theme widget on every post calls two endpoints: one to read the count
//! (and whether the signed-in member has clapped), one to toggle the member's
//! clap. Counting and storage live in `applause-core`; this crate is the
//! transport around it.
//!
//! # Authentication
//!
//! Toggling requires the member token the blogging platform hands its signed-in
//! readers, sent as `Authorization: Bearer <token>`. Reading does not.
//!
//! # Architecture
//!
//! - **AppState**: Shared application state (applause service, configuration, rate limiter)
//! - **Rate limit**: Per-client fixed-window middleware
//! - **Routes**: Endpoint handlers and the CORS/body-limit layers

mod error;
pub mod rate_limit;
mod routes;
mod state;

pub use self::error::ApiError;
pub use self::rate_limit::RateLimiter;
pub use self::routes::{X_HAS_CLAPPED, router};
pub use self::state::{AppState, Config};
