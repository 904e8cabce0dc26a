//! The admission gate: ban, daily and short-window checks over a shared store.

use axum::http::StatusCode;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, trace, warn};

use super::clock::{Clock, SystemClock};
use super::keys::ClientKeys;
use super::policy::{next_utc_midnight, AdmissionPolicy};
use super::store::{CounterStore, CounterUpdate, Expiry, StoreError, StoreResult};
use crate::metrics;

/// Outcome of evaluating one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The request may proceed; both counters were incremented.
    Admit,
    /// The request is refused.
    Reject(Rejection),
}

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// A ban flag is already present for the client
    Banned,
    /// The client used up its daily allowance
    DailyLimitExceeded { limit: u64 },
    /// This request tripped the short-window cap and a ban was written
    BanImposed { ban_ttl: Duration },
    /// The store failed or timed out; the gate fails closed
    StoreFailure,
}

impl Rejection {
    /// Stable reason code, used for metrics labels and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::Banned => "banned",
            Rejection::DailyLimitExceeded { .. } => "daily_limit_exceeded",
            Rejection::BanImposed { .. } => "rate_limit_exceeded",
            Rejection::StoreFailure => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::Banned | Rejection::BanImposed { .. } => StatusCode::FORBIDDEN,
            Rejection::DailyLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Rejection::StoreFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message.
    pub fn message(&self) -> String {
        match self {
            Rejection::Banned => "IP banned for violating rate limits".to_string(),
            Rejection::DailyLimitExceeded { limit } => {
                format!("Daily limit of {} requests exceeded", limit)
            }
            Rejection::BanImposed { ban_ttl } => {
                format!("Rate limit exceeded. IP banned for {}", describe_duration(*ban_ttl))
            }
            Rejection::StoreFailure => "Internal server error".to_string(),
        }
    }
}

fn describe_duration(d: Duration) -> String {
    const UNITS: [(u64, &str); 4] = [
        (604_800, "week"),
        (86_400, "day"),
        (3_600, "hour"),
        (60, "minute"),
    ];

    let secs = d.as_secs();
    for (size, name) in UNITS {
        if secs >= size && secs % size == 0 {
            let n = secs / size;
            return if n == 1 {
                format!("1 {}", name)
            } else {
                format!("{} {}s", n, name)
            };
        }
    }
    format!("{} seconds", secs)
}

/// Per-client admission control over a [`CounterStore`].
///
/// The gate keeps no mutable state of its own; every decision is a function of
/// what the store holds, so any number of gates may share one store.
pub struct AdmissionGate {
    store: Arc<dyn CounterStore>,
    policy: AdmissionPolicy,
    clock: Arc<dyn Clock>,
}

impl AdmissionGate {
    /// Create a gate that reads time from the system clock.
    pub fn new(store: Arc<dyn CounterStore>, policy: AdmissionPolicy) -> Self {
        Self::with_clock(store, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<dyn CounterStore>,
        policy: AdmissionPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            policy,
            clock,
        }
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// Decide whether `client` may proceed, recording the request on admit.
    ///
    /// Store errors never escape: they become [`Rejection::StoreFailure`].
    #[instrument(skip(self, client), fields(client = %client))]
    pub async fn evaluate(&self, client: &str) -> Decision {
        let started = Instant::now();
        metrics::EVALUATIONS_TOTAL.inc();

        let decision = match self.check_and_record(client).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, "Counter store failed, rejecting request");
                metrics::STORE_ERRORS_TOTAL.inc();
                Decision::Reject(Rejection::StoreFailure)
            }
        };

        match decision {
            Decision::Admit => metrics::ADMITTED_TOTAL.inc(),
            Decision::Reject(rejection) => metrics::REJECTED_TOTAL
                .with_label_values(&[rejection.reason()])
                .inc(),
        }
        metrics::EVALUATION_LATENCY.observe(started.elapsed().as_secs_f64());

        decision
    }

    async fn check_and_record(&self, client: &str) -> StoreResult<Decision> {
        let keys = ClientKeys::new(client);
        let now = self.clock.now();
        let ban_key = keys.ban();

        if self.bounded(self.store.exists(&ban_key)).await? {
            debug!("Client is banned");
            return Ok(Decision::Reject(Rejection::Banned));
        }

        let daily_key = keys.daily(now.date_naive());
        let daily = self
            .bounded(self.store.get_count(&daily_key))
            .await?
            .unwrap_or(0);
        if self.policy.daily_exhausted(daily) {
            debug!(daily, limit = self.policy.daily_limit, "Daily limit exceeded");
            return Ok(Decision::Reject(Rejection::DailyLimitExceeded {
                limit: self.policy.daily_limit,
            }));
        }

        let window_key = keys.window();
        let window = self
            .bounded(self.store.get_count(&window_key))
            .await?
            .unwrap_or(0);
        if self.policy.window_violated(window) {
            let ban_ttl = self.policy.ban_ttl;
            if let Err(e) = self
                .bounded(self.store.set_with_expiry(&ban_key, "1", ban_ttl))
                .await
            {
                warn!(error = %e, "Failed to persist ban flag");
            }
            info!(
                window,
                limit = self.policy.window_limit,
                ban_secs = ban_ttl.as_secs(),
                "Short-window limit exceeded, client banned"
            );
            metrics::BANS_IMPOSED_TOTAL.inc();
            return Ok(Decision::Reject(Rejection::BanImposed { ban_ttl }));
        }

        let updates = [
            CounterUpdate::new(window_key, Expiry::After(self.policy.window_ttl)),
            CounterUpdate::new(daily_key, Expiry::At(next_utc_midnight(now))),
        ];
        let counts = self.bounded(self.store.increment_batch(&updates)).await?;

        trace!(counts = ?counts, "Request admitted");
        Ok(Decision::Admit)
    }

    /// Run one store round trip under the policy's timeout.
    async fn bounded<T, F>(&self, call: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let limit = self.policy.store_timeout;
        tokio::time::timeout(limit, call)
            .await
            .map_err(|_| StoreError::Timeout(limit))?
    }
}
