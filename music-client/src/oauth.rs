//! Spotify accounts service: the three OAuth grants and the authorize URL.
//!
//! All grants POST a form to `{accounts_url}/api/token` with HTTP Basic
//! client authentication.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::SpotifyConfig;
use crate::error::RawFailure;
use crate::http::send_json;
use crate::lease::ClientCredentialsGrant;

/// Scopes requested when the caller does not name any.
pub const DEFAULT_SCOPES: &[&str] = &["user-read-email", "user-read-private"];

/// Token endpoint response, shared by all grant types.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Token lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Absent for client-credentials grants and for most refreshes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("scope", &self.scope)
            .finish()
    }
}

/// HTTP client for the accounts service.
#[derive(Clone)]
pub struct SpotifyAccounts {
    http: reqwest::Client,
    token_url: String,
    authorize_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl SpotifyAccounts {
    pub fn new(http: reqwest::Client, config: &SpotifyConfig) -> Self {
        let base = config.accounts_url.trim_end_matches('/');
        Self {
            http,
            token_url: format!("{base}/api/token"),
            authorize_url: format!("{base}/authorize"),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        }
    }

    /// URL the user is redirected to for consent.
    pub fn authorize_url(&self, state: &str, scopes: &[&str]) -> Result<Url, url::ParseError> {
        let scopes = if scopes.is_empty() { DEFAULT_SCOPES } else { scopes };
        Url::parse_with_params(
            &self.authorize_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", scopes.join(" ").as_str()),
                ("state", state),
            ],
        )
    }

    /// Exchange an authorization code for user tokens.
    pub async fn authorization_code_grant(&self, code: &str) -> Result<TokenResponse, RawFailure> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])
        .await
    }

    /// Obtain a fresh user access token from a refresh token.
    pub async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenResponse, RawFailure> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse, RawFailure> {
        send_json(
            self.http
                .post(&self.token_url)
                .basic_auth(&self.client_id, Some(&self.client_secret))
                .form(params),
        )
        .await
    }
}

#[async_trait]
impl ClientCredentialsGrant for SpotifyAccounts {
    async fn client_credentials_grant(&self) -> Result<TokenResponse, RawFailure> {
        self.token_request(&[("grant_type", "client_credentials")])
            .await
    }
}
