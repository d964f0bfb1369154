//! App-level credential lease with single-flight renewal.
//!
//! The lease is the only shared mutable state in the client layer. Reads
//! take a shared lock. A renewal is a shared future parked in a slot, so
//! concurrent callers observing an expired lease join the same grant
//! sequence and all receive its outcome.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{Instrument, debug, debug_span, info, warn};

use crate::error::{ClassifiedError, RawFailure};
use crate::oauth::TokenResponse;
use crate::retry::{self, RetryPolicy};

/// Subtracted from the granted lifetime so renewal happens before expiry.
pub const DEFAULT_SAFETY_BUFFER: Duration = Duration::from_secs(60);

/// Lifetime assumed when the grant omits `expires_in` or reports zero.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Retries allowed for one client-credentials grant.
pub const GRANT_RETRIES: u32 = 2;

// Keeps `Instant` arithmetic in range for absurd `expires_in` values.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// An app-level access token and the instant it stops being usable.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialLease {
    access_token: String,
    issued_at: Instant,
    expires_at: Instant,
}

impl CredentialLease {
    /// Build a lease from a grant issued at `issued_at`.
    ///
    /// The effective buffer is `min(safety_buffer, lifetime / 2)`, so a
    /// short-lived token is still usable for half its lifetime.
    pub fn from_grant(
        access_token: String,
        expires_in: Option<u64>,
        issued_at: Instant,
        safety_buffer: Duration,
    ) -> Self {
        let lifetime = match expires_in {
            Some(secs) if secs > 0 => Duration::from_secs(secs).min(MAX_TOKEN_LIFETIME),
            _ => DEFAULT_TOKEN_LIFETIME,
        };
        let buffer = safety_buffer.min(lifetime / 2);
        Self {
            access_token,
            issued_at,
            expires_at: issued_at + (lifetime - buffer),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Instant::now())
    }

    pub fn is_valid_at(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    /// Time left before the lease must be renewed.
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

impl fmt::Debug for CredentialLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialLease")
            .field("access_token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Transport for the OAuth client-credentials grant.
#[async_trait]
pub trait ClientCredentialsGrant: Send + Sync {
    async fn client_credentials_grant(&self) -> Result<TokenResponse, RawFailure>;
}

type Renewal = Shared<BoxFuture<'static, Result<CredentialLease, ClassifiedError>>>;

/// Holds the app-level lease and renews it on demand.
///
/// Long-lived; share it behind an `Arc`.
pub struct LeaseManager {
    grant: Arc<dyn ClientCredentialsGrant>,
    policy: RetryPolicy,
    safety_buffer: Duration,
    current: Arc<RwLock<Option<CredentialLease>>>,
    in_flight: Mutex<Option<Renewal>>,
}

impl LeaseManager {
    /// `policy` governs each renewal; its retry budget is normally
    /// [`GRANT_RETRIES`].
    pub fn new(grant: Arc<dyn ClientCredentialsGrant>, policy: RetryPolicy) -> Self {
        Self {
            grant,
            policy,
            safety_buffer: DEFAULT_SAFETY_BUFFER,
            current: Arc::new(RwLock::new(None)),
            in_flight: Mutex::new(None),
        }
    }

    pub fn with_safety_buffer(mut self, safety_buffer: Duration) -> Self {
        self.safety_buffer = safety_buffer;
        self
    }

    /// Return a valid lease, renewing it first if needed.
    ///
    /// At most one renewal runs at any time. Callers that arrive while it is
    /// running join it and receive its outcome, success or failure.
    pub async fn ensure_lease(&self) -> Result<CredentialLease, ClassifiedError> {
        if let Some(lease) = self.valid_lease().await {
            return Ok(lease);
        }

        let renewal = {
            let mut slot = self.in_flight.lock().await;
            if let Some(lease) = self.valid_lease().await {
                debug!("lease renewed by a concurrent caller");
                return Ok(lease);
            }
            match slot.as_ref() {
                Some(running) if running.peek().is_none() => {
                    debug!("joining in-flight lease renewal");
                    running.clone()
                }
                _ => {
                    let started = self.start_renewal();
                    *slot = Some(started.clone());
                    started
                }
            }
        };

        let outcome = renewal.clone().await;

        let mut slot = self.in_flight.lock().await;
        if slot.as_ref().is_some_and(|running| running.ptr_eq(&renewal)) {
            *slot = None;
        }
        outcome
    }

    /// Drop the held lease; the next `ensure_lease` renews.
    pub async fn invalidate(&self) {
        if self.current.write().await.take().is_some() {
            debug!("app credential lease invalidated");
        }
    }

    /// The held lease, valid or not.
    pub async fn current(&self) -> Option<CredentialLease> {
        self.current.read().await.clone()
    }

    async fn valid_lease(&self) -> Option<CredentialLease> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|lease| lease.is_valid())
            .cloned()
    }

    fn start_renewal(&self) -> Renewal {
        renew(
            Arc::clone(&self.grant),
            self.policy,
            self.safety_buffer,
            Arc::clone(&self.current),
        )
        .instrument(debug_span!("lease_renewal"))
        .boxed()
        .shared()
    }
}

/// Runs the grant under `policy` and installs the resulting lease.
///
/// Each attempt stamps the lease with the instant it was sent, and a lease
/// that is already unusable when the answer arrives counts as a failed
/// attempt.
async fn renew(
    grant: Arc<dyn ClientCredentialsGrant>,
    policy: RetryPolicy,
    safety_buffer: Duration,
    current: Arc<RwLock<Option<CredentialLease>>>,
) -> Result<CredentialLease, ClassifiedError> {
    let grant = &grant;
    let result = retry::execute(
        move || async move {
            let sent_at = Instant::now();
            let token = grant.client_credentials_grant().await?;
            let lease = CredentialLease::from_grant(
                token.access_token,
                token.expires_in,
                sent_at,
                safety_buffer,
            );
            if !lease.is_valid() {
                return Err(RawFailure::Malformed(
                    "granted token expired before it arrived".to_string(),
                ));
            }
            Ok(lease)
        },
        &policy,
    )
    .await;

    match result {
        Ok(lease) => {
            *current.write().await = Some(lease.clone());
            info!(
                valid_for_secs = lease.remaining().as_secs(),
                "app credential lease renewed"
            );
            Ok(lease)
        }
        Err(err) => {
            current.write().await.take();
            warn!(kind = %err.kind(), status = ?err.http_status(), "app credential lease renewal failed");
            Err(err)
        }
    }
}
