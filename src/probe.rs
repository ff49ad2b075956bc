//! Liveness check against the generation API, independent of raw network
//! reachability.
//!
//! A reachable network can still leave the API unusable (bad key, quota,
//! proxy). The probe answers that question with a cheap `GET /v1/models`
//! and caches the verdict for a short window.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};

use crate::error::Result;
use crate::retry::BackoffPolicy;
use crate::transport::{RawResponse, Transport};

/// Why the generation API is currently unusable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    MissingApiKey,
    InvalidCredentials,
    Forbidden,
    RateLimited,
    Unexpected { status: u16, message: String },
    Transport(String),
}

impl ProbeFailure {
    /// Credential and permission failures cannot clear without
    /// reconfiguration.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProbeFailure::RateLimited
                | ProbeFailure::Unexpected { .. }
                | ProbeFailure::Transport(_)
        )
    }
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::MissingApiKey => write!(f, "missing API key"),
            ProbeFailure::InvalidCredentials => write!(f, "invalid credentials"),
            ProbeFailure::Forbidden => write!(f, "forbidden"),
            ProbeFailure::RateLimited => write!(f, "rate limited"),
            ProbeFailure::Unexpected { status, message } if message.is_empty() => {
                write!(f, "unexpected status {status}")
            }
            ProbeFailure::Unexpected { status, message } => {
                write!(f, "unexpected status {status}: {message}")
            }
            ProbeFailure::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

/// Last known verdict of the probe
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceAvailability {
    pub available: bool,
    pub reason: Option<ProbeFailure>,
    pub last_probed_at: Option<DateTime<Utc>>,
}

impl ServiceAvailability {
    pub fn unknown() -> Self {
        Self {
            available: false,
            reason: None,
            last_probed_at: None,
        }
    }

    fn from_outcome(outcome: std::result::Result<(), ProbeFailure>, at: DateTime<Utc>) -> Self {
        match outcome {
            Ok(()) => Self {
                available: true,
                reason: None,
                last_probed_at: Some(at),
            },
            Err(reason) => Self {
                available: false,
                reason: Some(reason),
                last_probed_at: Some(at),
            },
        }
    }

    pub fn is_fresh(&self, window: Duration, now: DateTime<Utc>) -> bool {
        match self.last_probed_at {
            Some(at) => (now - at).to_std().map(|age| age < window).unwrap_or(true),
            None => false,
        }
    }
}

/// Map a probe exchange to availability, purely on the HTTP status
pub fn classify(result: &Result<RawResponse>) -> std::result::Result<(), ProbeFailure> {
    match result {
        Ok(resp) => match resp.status {
            200 => Ok(()),
            401 => Err(ProbeFailure::InvalidCredentials),
            403 => Err(ProbeFailure::Forbidden),
            429 => Err(ProbeFailure::RateLimited),
            status => Err(ProbeFailure::Unexpected {
                status,
                message: resp.body.trim().to_string(),
            }),
        },
        Err(e) => Err(ProbeFailure::Transport(e.to_string())),
    }
}

#[derive(Debug, Default)]
struct RateLimitState {
    consecutive: u32,
    retry_not_before: Option<DateTime<Utc>>,
}

pub struct ServiceProbe {
    transport: Arc<dyn Transport>,
    freshness: Duration,
    backoff: BackoffPolicy,
    state: watch::Sender<ServiceAvailability>,
    // Serializes probes so concurrent submissions share one exchange
    gate: Mutex<RateLimitState>,
}

impl ServiceProbe {
    pub fn new(transport: Arc<dyn Transport>, freshness: Duration, backoff: BackoffPolicy) -> Self {
        let (state, _) = watch::channel(ServiceAvailability::unknown());
        Self {
            transport,
            freshness,
            backoff,
            state,
            gate: Mutex::new(RateLimitState::default()),
        }
    }

    pub fn current(&self) -> ServiceAvailability {
        self.state.borrow().clone()
    }

    /// True only for a fresh, positive verdict
    pub fn is_trusted(&self) -> bool {
        let current = self.state.borrow();
        current.available && current.is_fresh(self.freshness, Utc::now())
    }

    /// Forget the verdict so the next submission probes again. Until then
    /// the API counts as unavailable.
    pub fn invalidate(&self) {
        self.state.send_modify(|s| {
            s.available = false;
            s.last_probed_at = None;
        });
    }

    /// Return a trusted verdict, probing unless a rate-limit backoff is
    /// still running.
    pub async fn ensure_available(&self) -> ServiceAvailability {
        let mut gate = self.gate.lock().await;

        // Another caller may have probed while we waited
        if self.is_trusted() {
            return self.current();
        }

        if let Some(not_before) = gate.retry_not_before {
            if Utc::now() < not_before {
                tracing::debug!(%not_before, "Probe deferred by rate-limit backoff");
                return self.current();
            }
        }

        self.probe_locked(&mut gate).await
    }

    /// Probe unconditionally
    pub async fn probe(&self) -> ServiceAvailability {
        let mut gate = self.gate.lock().await;
        self.probe_locked(&mut gate).await
    }

    async fn probe_locked(&self, gate: &mut RateLimitState) -> ServiceAvailability {
        let outcome = if self.transport.has_credentials() {
            classify(&self.transport.list_models().await)
        } else {
            Err(ProbeFailure::MissingApiKey)
        };

        let now = Utc::now();
        match &outcome {
            Ok(()) => {
                tracing::info!("Generation API reachable");
                *gate = RateLimitState::default();
            }
            Err(ProbeFailure::RateLimited) => {
                gate.consecutive += 1;
                let delay = self.backoff.delay(gate.consecutive);
                let wait = chrono::Duration::from_std(delay)
                    .unwrap_or_else(|_| chrono::Duration::zero());
                gate.retry_not_before = Some(now + wait);
                tracing::warn!(
                    attempts = gate.consecutive,
                    delay_ms = delay.as_millis() as u64,
                    "Generation API rate limited, backing off"
                );
            }
            Err(reason) => {
                *gate = RateLimitState::default();
                tracing::warn!(
                    retryable = reason.is_retryable(),
                    "Generation API unavailable: {}",
                    reason
                );
            }
        }

        let availability = ServiceAvailability::from_outcome(outcome, now);
        self.state.send_replace(availability.clone());
        availability
    }
}
