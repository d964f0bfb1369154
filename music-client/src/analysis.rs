//! Client for the mood analysis service.
//!
//! `/analyze` goes through the shared retry engine. `/health` is a single
//! bounded probe.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{Instrument, debug_span};

use crate::config::AppConfig;
use crate::error::ClassifiedError;
use crate::http::{build_client, send_json};
use crate::retry::{self, RetryPolicy, with_deadline};

const DEFAULT_RETRIES: u32 = 2;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(350);

// Cold starts of the hosted service can take well over a minute.
const PRODUCTION_RETRIES: u32 = 3;
const PRODUCTION_BASE_DELAY: Duration = Duration::from_millis(3000);
const PRODUCTION_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    /// Rejected before any network call.
    #[error("{0}")]
    InvalidRequest(&'static str),

    #[error(transparent)]
    Upstream(#[from] ClassifiedError),
}

impl AnalysisError {
    pub fn response_status(&self) -> u16 {
        match self {
            AnalysisError::InvalidRequest(_) => 400,
            AnalysisError::Upstream(err) => err.kind().response_status(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    Face,
    Text,
}

impl FromStr for AnalysisKind {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "face" => Ok(AnalysisKind::Face),
            "text" => Ok(AnalysisKind::Text),
            _ => Err(AnalysisError::InvalidRequest(
                "type must be either 'face' or 'text'",
            )),
        }
    }
}

/// Body posted to `/analyze`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    #[serde(rename = "type")]
    pub kind: AnalysisKind,
    /// Base64 image, required for face analysis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Free text, required for text analysis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl AnalysisRequest {
    pub fn face(image: impl Into<String>) -> Self {
        Self {
            kind: AnalysisKind::Face,
            image: Some(image.into()),
            text: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: AnalysisKind::Text,
            image: None,
            text: Some(text.into()),
        }
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        match self.kind {
            AnalysisKind::Face if self.image.as_deref().is_none_or(str::is_empty) => Err(
                AnalysisError::InvalidRequest("Image payload is required for face analysis"),
            ),
            AnalysisKind::Text
                if self
                    .text
                    .as_deref()
                    .is_none_or(|text| text.trim().is_empty()) =>
            {
                Err(AnalysisError::InvalidRequest(
                    "Text payload is required for text analysis",
                ))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for AnalysisRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisRequest")
            .field("kind", &self.kind)
            .field("image_len", &self.image.as_ref().map(String::len))
            .field("text_len", &self.text.as_ref().map(String::len))
            .finish()
    }
}

pub struct AnalysisClient {
    http: reqwest::Client,
    analyze_url: String,
    health_url: String,
    policy: RetryPolicy,
    health_timeout: Duration,
}

impl AnalysisClient {
    pub fn new(config: &AppConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::with_http(build_client()?, config))
    }

    pub fn with_http(http: reqwest::Client, config: &AppConfig) -> Self {
        let base = config.analysis.service_url.trim_end_matches('/');
        let policy = if config.environment.is_production() {
            RetryPolicy::new(PRODUCTION_RETRIES, PRODUCTION_BASE_DELAY, PRODUCTION_TIMEOUT)
        } else {
            RetryPolicy::new(
                DEFAULT_RETRIES,
                DEFAULT_BASE_DELAY,
                config.analysis.request_timeout(),
            )
        };
        Self {
            http,
            analyze_url: format!("{base}/analyze"),
            health_url: format!("{base}/health"),
            policy,
            health_timeout: config.analysis.health_timeout(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Validate and submit `request`, returning the service's JSON verdict.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<Value, AnalysisError> {
        request.validate()?;

        let (http, url) = (&self.http, self.analyze_url.as_str());
        let verdict = retry::execute(
            move || send_json(http.post(url).json(request)),
            &self.policy,
        )
        .instrument(debug_span!("analysis_request", kind = ?request.kind))
        .await?;
        Ok(verdict)
    }

    pub async fn health(&self) -> Result<Value, ClassifiedError> {
        with_deadline(send_json(self.http.get(&self.health_url)), self.health_timeout).await
    }
}
