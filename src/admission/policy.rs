//! Admission limits and expiry arithmetic.

use chrono::{DateTime, Days, Utc};
use std::time::Duration;

/// Default number of requests admitted per client per UTC day.
pub const DEFAULT_DAILY_LIMIT: u64 = 100;
/// Default short-window request count that trips a ban.
pub const DEFAULT_WINDOW_LIMIT: u64 = 10;
/// Default short-window length.
pub const DEFAULT_WINDOW_TTL: Duration = Duration::from_secs(60);
/// Default ban duration.
pub const DEFAULT_BAN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Default bound on one store round trip.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Limits applied by the admission gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionPolicy {
    /// Requests admitted per client per UTC day
    pub daily_limit: u64,
    /// Short-window request count that trips a ban
    pub window_limit: u64,
    /// Short-window TTL, refreshed on every admitted request
    pub window_ttl: Duration,
    /// How long a ban flag lives
    pub ban_ttl: Duration,
    /// Upper bound on a single store round trip
    pub store_timeout: Duration,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            daily_limit: DEFAULT_DAILY_LIMIT,
            window_limit: DEFAULT_WINDOW_LIMIT,
            window_ttl: DEFAULT_WINDOW_TTL,
            ban_ttl: DEFAULT_BAN_TTL,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

impl AdmissionPolicy {
    /// Whether the daily counter blocks admission.
    pub fn daily_exhausted(&self, daily_count: u64) -> bool {
        daily_count >= self.daily_limit
    }

    /// Whether the short window is already full.
    pub fn window_violated(&self, window_count: u64) -> bool {
        window_count >= self.window_limit
    }
}

/// The first instant of the next UTC day.
pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
    tomorrow.and_time(chrono::NaiveTime::MIN).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_policy() {
        let policy = AdmissionPolicy::default();
        assert_eq!(policy.daily_limit, 100);
        assert_eq!(policy.window_limit, 10);
        assert_eq!(policy.window_ttl, Duration::from_secs(60));
        assert_eq!(policy.ban_ttl, Duration::from_secs(604_800));
    }

    #[test]
    fn test_daily_exhausted_at_cap() {
        let policy = AdmissionPolicy::default();
        assert!(!policy.daily_exhausted(99));
        assert!(policy.daily_exhausted(100));
        assert!(policy.daily_exhausted(150));
    }

    #[test]
    fn test_window_violated_once_full() {
        let policy = AdmissionPolicy::default();
        assert!(!policy.window_violated(9));
        assert!(policy.window_violated(10));
        assert!(policy.window_violated(11));
    }

    #[test]
    fn test_next_midnight_late_evening() {
        let now = Utc.with_ymd_and_hms(2024, 6, 30, 23, 0, 0).unwrap();
        assert_eq!(
            next_utc_midnight(now),
            Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_midnight_exactly_at_midnight() {
        let now = Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap();
        assert_eq!(
            next_utc_midnight(now),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
    }
}
