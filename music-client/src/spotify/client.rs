use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{Instrument, debug_span};
use url::Url;

use crate::config::{AppConfig, RetryConfig, SpotifyConfig};
use crate::error::{ClassifiedError, ErrorKind, RawFailure};
use crate::http::build_client;
use crate::lease::{CredentialLease, GRANT_RETRIES, LeaseManager};
use crate::oauth::{SpotifyAccounts, TokenResponse};
use crate::retry::{self, RetryPolicy};
use crate::search::{APP_SEARCH_RETRIES, FallbackSearch, SearchRequest, USER_SEARCH_RETRIES};
use crate::spotify::{Paging, SearchResults, SpotifyApi, TimeRange, Track};

/// Retries for per-user calls and user-token grants.
pub const USER_CALL_RETRIES: u32 = 1;

/// Spotify's page size ceiling for list endpoints.
const MAX_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

/// Readiness report for the Spotify integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    pub configured: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

/// Entry point for everything Spotify.
///
/// Owns the app-level [`LeaseManager`]; build one client per process and
/// share it.
pub struct SpotifyClient {
    config: SpotifyConfig,
    retry: RetryConfig,
    accounts: SpotifyAccounts,
    api: Arc<SpotifyApi>,
    leases: Arc<LeaseManager>,
    search: FallbackSearch,
}

impl SpotifyClient {
    pub fn new(config: &AppConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::with_http(build_client()?, config))
    }

    pub fn with_http(http: reqwest::Client, config: &AppConfig) -> Self {
        let accounts = SpotifyAccounts::new(http.clone(), &config.spotify);
        let api = Arc::new(SpotifyApi::new(http, &config.spotify.api_url));
        let base = RetryPolicy::new(0, config.retry.base_delay(), config.spotify.timeout());
        let cap = config.retry.max_retries();

        let leases = Arc::new(
            LeaseManager::new(
                Arc::new(accounts.clone()),
                base.with_max_attempts(GRANT_RETRIES.min(cap)),
            )
            .with_safety_buffer(config.spotify.lease_buffer()),
        );
        let search = FallbackSearch::with_policies(
            api.clone(),
            Arc::clone(&leases),
            base.with_max_attempts(USER_SEARCH_RETRIES.min(cap)),
            base.with_max_attempts(APP_SEARCH_RETRIES.min(cap)),
        );

        Self {
            config: config.spotify.clone(),
            retry: config.retry.clone(),
            accounts,
            api,
            leases,
            search,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    pub fn leases(&self) -> &Arc<LeaseManager> {
        &self.leases
    }

    /// Policy with the configured delay and timeout and a retry budget of
    /// `retries`, capped by configuration.
    pub fn policy(&self, retries: u32) -> RetryPolicy {
        RetryPolicy::new(
            retries.min(self.retry.max_retries()),
            self.retry.base_delay(),
            self.config.timeout(),
        )
    }

    pub async fn ensure_lease(&self) -> Result<CredentialLease, ClassifiedError> {
        self.leases.ensure_lease().await
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResults, ClassifiedError> {
        self.search.search(request).await
    }

    pub async fn execute<F, Fut, T>(&self, operation: F, policy: &RetryPolicy) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<T, RawFailure>> + Send,
        T: Send,
    {
        retry::execute(operation, policy).await
    }

    pub fn classify(&self, failure: &RawFailure) -> ClassifiedError {
        retry::classify(failure)
    }

    /// Consent URL; empty `scopes` requests the default read scopes.
    pub fn authorize_url(&self, state: &str, scopes: &[&str]) -> Result<Url, url::ParseError> {
        self.accounts.authorize_url(state, scopes)
    }

    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, ClassifiedError> {
        let accounts = &self.accounts;
        self.execute(
            move || accounts.authorization_code_grant(code),
            &self.policy(USER_CALL_RETRIES),
        )
        .instrument(debug_span!("spotify_request", operation = "exchange_code"))
        .await
    }

    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, ClassifiedError> {
        let accounts = &self.accounts;
        self.execute(
            move || accounts.refresh_grant(refresh_token),
            &self.policy(USER_CALL_RETRIES),
        )
        .instrument(debug_span!("spotify_request", operation = "refresh_token"))
        .await
    }

    pub async fn current_user(&self, token: &str) -> Result<Value, ClassifiedError> {
        self.user_get("current_user", "me", token, &[]).await
    }

    pub async fn user_playlists(&self, token: &str, limit: u32) -> Result<Value, ClassifiedError> {
        self.user_get(
            "user_playlists",
            "me/playlists",
            token,
            &[("limit", page_size(limit))],
        )
        .await
    }

    pub async fn recently_played(&self, token: &str, limit: u32) -> Result<Value, ClassifiedError> {
        self.user_get(
            "recently_played",
            "me/player/recently-played",
            token,
            &[("limit", page_size(limit))],
        )
        .await
    }

    pub async fn top_tracks(
        &self,
        token: &str,
        time_range: TimeRange,
    ) -> Result<Paging<Track>, ClassifiedError> {
        self.user_get(
            "top_tracks",
            "me/top/tracks",
            token,
            &[("time_range", time_range.to_string())],
        )
        .await
    }

    pub async fn top_artists(
        &self,
        token: &str,
        time_range: TimeRange,
    ) -> Result<Value, ClassifiedError> {
        self.user_get(
            "top_artists",
            "me/top/artists",
            token,
            &[("time_range", time_range.to_string())],
        )
        .await
    }

    /// Start or resume playback. Empty `uris` resumes the current context.
    pub async fn start_playback(
        &self,
        token: &str,
        uris: &[String],
        device_id: Option<&str>,
    ) -> Result<(), ClassifiedError> {
        let body = if uris.is_empty() {
            json!({})
        } else {
            json!({ "uris": uris })
        };
        let query: Vec<(&str, String)> = device_id
            .map(|id| ("device_id", id.to_string()))
            .into_iter()
            .collect();
        let api = &self.api;
        let (body, query) = (&body, query.as_slice());

        self.execute(
            move || api.put_empty("me/player/play", token, query, body),
            &self.policy(USER_CALL_RETRIES),
        )
        .instrument(debug_span!("spotify_request", operation = "start_playback"))
        .await
    }

    /// Report readiness. Unconfigured credentials are reported without any
    /// network call; otherwise the app lease is acquired as a probe.
    pub async fn service_health(&self) -> ServiceHealth {
        if !self.is_configured() {
            return ServiceHealth {
                status: HealthStatus::Degraded,
                configured: false,
                timeout_ms: None,
                message: "Spotify credentials are missing".to_string(),
                error: None,
            };
        }

        let timeout_ms = Some(self.config.timeout_ms);
        match self.ensure_lease().await {
            Ok(_) => ServiceHealth {
                status: HealthStatus::Ok,
                configured: true,
                timeout_ms,
                message: "Spotify service ready".to_string(),
                error: None,
            },
            Err(err) => ServiceHealth {
                status: HealthStatus::Degraded,
                configured: true,
                timeout_ms,
                message: err.caller_message().to_string(),
                error: Some(err.kind()),
            },
        }
    }

    async fn user_get<T>(
        &self,
        operation: &'static str,
        path: &str,
        token: &str,
        query: &[(&str, String)],
    ) -> Result<T, ClassifiedError>
    where
        T: DeserializeOwned + Send,
    {
        let api = &self.api;
        self.execute(
            move || api.get_json(path, token, query),
            &self.policy(USER_CALL_RETRIES),
        )
        .instrument(debug_span!("spotify_request", operation))
        .await
    }
}

fn page_size(limit: u32) -> String {
    limit.clamp(1, MAX_PAGE_SIZE).to_string()
}
