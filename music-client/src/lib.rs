//! Resilient outbound clients for the Echona mood app.
//!
//! Every upstream call made through this crate is bounded by a deadline,
//! retried according to a [`retry::RetryPolicy`], and fails with a
//! [`ClassifiedError`] drawn from a closed set of eight kinds. The
//! app-level Spotify token is held by a [`lease::LeaseManager`] that renews
//! it at most once at a time.
//!
//! Entry points:
//! - [`spotify::SpotifyClient`] for search, OAuth grants and per-user calls
//! - [`analysis::AnalysisClient`] for the mood analysis service
//! - [`config::ConfigLoader`] to build an [`config::AppConfig`]

pub mod analysis;
pub mod config;
pub mod error;
mod http;
pub mod lease;
pub mod oauth;
pub mod retry;
pub mod search;
pub mod spotify;

pub use analysis::{AnalysisClient, AnalysisError, AnalysisKind, AnalysisRequest};
pub use error::{ClassifiedError, ErrorKind, RawFailure};
pub use http::build_client;
pub use lease::{CredentialLease, LeaseManager};
pub use search::{FallbackSearch, SearchRequest, TrackSearch};
pub use spotify::{ServiceHealth, SpotifyClient};
