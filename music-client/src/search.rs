//! Track search that prefers the user's own token and falls back to the
//! app-level lease.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Instrument, debug_span, info};

use crate::error::{ClassifiedError, ErrorKind, RawFailure};
use crate::lease::LeaseManager;
use crate::retry::{self, RetryPolicy};
use crate::spotify::SearchResults;

/// Retries for a search made with the user's token.
pub const USER_SEARCH_RETRIES: u32 = 1;

/// Retries for a search made with the app-level lease.
pub const APP_SEARCH_RETRIES: u32 = 2;

/// Tracks returned per search.
pub const SEARCH_LIMIT: u32 = 10;

/// Transport for a single track search attempt.
#[async_trait]
pub trait TrackSearch: Send + Sync {
    async fn search_tracks(&self, query: &str, bearer: &str) -> Result<SearchResults, RawFailure>;
}

/// A search query, optionally on behalf of a signed-in user.
///
/// The query is validated as non-empty by the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub user_token: Option<String>,
}

impl SearchRequest {
    pub fn anonymous(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            user_token: None,
        }
    }

    pub fn as_user(query: impl Into<String>, user_token: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            user_token: Some(user_token.into()),
        }
    }

    /// The user token, if one was supplied and is not blank.
    pub fn user_token(&self) -> Option<&str> {
        self.user_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
    }
}

impl fmt::Debug for SearchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchRequest")
            .field("query", &self.query)
            .field("user_token", &self.user_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Orchestrates the user-then-app search fallback.
pub struct FallbackSearch {
    backend: Arc<dyn TrackSearch>,
    leases: Arc<LeaseManager>,
    user_policy: RetryPolicy,
    app_policy: RetryPolicy,
}

impl FallbackSearch {
    /// Uses `base` for delays and deadlines, with the standard retry budget
    /// for each path.
    pub fn new(backend: Arc<dyn TrackSearch>, leases: Arc<LeaseManager>, base: RetryPolicy) -> Self {
        Self::with_policies(
            backend,
            leases,
            base.with_max_attempts(USER_SEARCH_RETRIES),
            base.with_max_attempts(APP_SEARCH_RETRIES),
        )
    }

    pub fn with_policies(
        backend: Arc<dyn TrackSearch>,
        leases: Arc<LeaseManager>,
        user_policy: RetryPolicy,
        app_policy: RetryPolicy,
    ) -> Self {
        Self {
            backend,
            leases,
            user_policy,
            app_policy,
        }
    }

    /// Search as the user when possible, otherwise with app credentials.
    ///
    /// A user-path `Unauthorized` or `Forbidden` is swallowed and the app
    /// path runs; any other user-path error is returned as is. When both
    /// paths fail the app-path error is returned.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResults, ClassifiedError> {
        if let Some(user_token) = request.user_token() {
            let user_attempt = self
                .search_with(&request.query, user_token, &self.user_policy)
                .instrument(debug_span!("track_search", path = "user"))
                .await;
            match user_attempt {
                Ok(results) => return Ok(results),
                Err(err) if err.kind().is_authorization() => {
                    info!(
                        kind = %err.kind(),
                        "user token rejected for search; using app credentials"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        let lease = self.leases.ensure_lease().await?;
        let app_attempt = self
            .search_with(&request.query, lease.access_token(), &self.app_policy)
            .instrument(debug_span!("track_search", path = "app"))
            .await;

        if let Err(err) = &app_attempt
            && err.kind() == ErrorKind::Unauthorized
        {
            self.leases.invalidate().await;
        }
        app_attempt
    }

    async fn search_with(
        &self,
        query: &str,
        bearer: &str,
        policy: &RetryPolicy,
    ) -> Result<SearchResults, ClassifiedError> {
        let backend = &self.backend;
        retry::execute(move || backend.search_tracks(query, bearer), policy).await
    }
}
