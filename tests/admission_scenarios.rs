//! End-to-end admission scenarios against the in-memory store with a manual clock.

use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

use turnstile::admission::{
    AdmissionGate, AdmissionPolicy, ClientKeys, Clock, Decision, Expiry, ManualClock,
    MemoryStore, Rejection, StoreOp,
};

const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

fn setup_at(
    start: DateTime<Utc>,
    policy: AdmissionPolicy,
) -> (AdmissionGate, Arc<MemoryStore>, ManualClock) {
    let clock = ManualClock::new(start);
    let store = Arc::new(MemoryStore::with_clock(Arc::new(clock.clone())));
    let gate = AdmissionGate::with_clock(store.clone(), policy, Arc::new(clock.clone()));
    (gate, store, clock)
}

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 16, 12, 0, 0).unwrap()
}

#[tokio::test]
async fn test_burst_bans_on_eleventh_request() {
    let (gate, store, clock) = setup_at(noon(), AdmissionPolicy::default());

    for i in 1..=10 {
        assert_eq!(gate.evaluate("a").await, Decision::Admit, "request {} should pass", i);
        clock.advance(Duration::from_millis(50));
    }

    let eleventh = gate.evaluate("a").await;
    assert_eq!(eleventh, Decision::Reject(Rejection::BanImposed { ban_ttl: WEEK }));
    assert_eq!(status_of(eleventh), 403);

    store.clear_operations();
    let twelfth = gate.evaluate("a").await;
    assert_eq!(twelfth, Decision::Reject(Rejection::Banned));
    assert_eq!(store.operations(), vec![StoreOp::Exists("ban:a".to_string())]);

    // The rejected requests consumed no quota.
    assert_eq!(store.peek("window:a").as_deref(), Some("10"));
}

fn status_of(decision: Decision) -> u16 {
    match decision {
        Decision::Reject(rejection) => rejection.status().as_u16(),
        Decision::Admit => 200,
    }
}

#[tokio::test]
async fn test_ban_lasts_exactly_seven_days() {
    let (gate, store, clock) = setup_at(noon(), AdmissionPolicy::default());
    store.seed("window:a", "10", Some(Expiry::After(Duration::from_secs(60))));

    assert!(matches!(
        gate.evaluate("a").await,
        Decision::Reject(Rejection::BanImposed { .. })
    ));

    clock.advance(WEEK - Duration::from_secs(1));
    assert_eq!(gate.evaluate("a").await, Decision::Reject(Rejection::Banned));

    clock.advance(Duration::from_secs(1));
    assert_eq!(gate.evaluate("a").await, Decision::Admit);
}

#[tokio::test]
async fn test_daily_counter_resets_at_utc_midnight() {
    let policy = AdmissionPolicy {
        daily_limit: 3,
        ..AdmissionPolicy::default()
    };
    let start = Utc.with_ymd_and_hms(2024, 9, 16, 23, 0, 0).unwrap();
    let (gate, store, clock) = setup_at(start, policy);
    let first_key = ClientKeys::new("a").daily(start.date_naive());

    for _ in 0..3 {
        assert_eq!(gate.evaluate("a").await, Decision::Admit);
    }
    assert_eq!(
        gate.evaluate("a").await,
        Decision::Reject(Rejection::DailyLimitExceeded { limit: 3 })
    );
    assert_eq!(
        store.expires_at(&first_key),
        Some(Utc.with_ymd_and_hms(2024, 9, 17, 0, 0, 0).unwrap())
    );

    // One hour later, not 24 hours after the first write.
    clock.set(Utc.with_ymd_and_hms(2024, 9, 16, 23, 59, 59).unwrap());
    assert!(matches!(
        gate.evaluate("a").await,
        Decision::Reject(Rejection::DailyLimitExceeded { .. })
    ));

    clock.set(Utc.with_ymd_and_hms(2024, 9, 17, 0, 0, 0).unwrap());
    assert_eq!(store.peek(&first_key), None);
    assert_eq!(gate.evaluate("a").await, Decision::Admit);
}

#[tokio::test]
async fn test_daily_limit_does_not_touch_window() {
    let (gate, store, clock) = setup_at(noon(), AdmissionPolicy::default());
    let daily_key = ClientKeys::new("a").daily(clock.now().date_naive());
    store.seed(&daily_key, "100", None);
    store.seed("window:a", "4", None);

    assert_eq!(
        gate.evaluate("a").await,
        Decision::Reject(Rejection::DailyLimitExceeded { limit: 100 })
    );
    assert_eq!(store.peek("window:a").as_deref(), Some("4"));
}

#[tokio::test]
async fn test_window_ttl_refreshes_on_every_admission() {
    let (gate, store, clock) = setup_at(noon(), AdmissionPolicy::default());

    for _ in 0..9 {
        assert_eq!(gate.evaluate("a").await, Decision::Admit);
        clock.advance(Duration::from_secs(50));
    }
    // A calendar-aligned window would have reset long ago.
    assert_eq!(store.peek("window:a").as_deref(), Some("9"));

    clock.advance(Duration::from_secs(11));
    assert_eq!(store.peek("window:a"), None);
    assert_eq!(gate.evaluate("a").await, Decision::Admit);
    assert_eq!(store.peek("window:a").as_deref(), Some("1"));
}

#[tokio::test]
async fn test_full_window_within_one_minute_bans() {
    let (gate, _store, clock) = setup_at(noon(), AdmissionPolicy::default());

    for _ in 0..10 {
        assert_eq!(gate.evaluate("a").await, Decision::Admit);
        clock.advance(Duration::from_secs(5));
    }
    assert!(matches!(
        gate.evaluate("a").await,
        Decision::Reject(Rejection::BanImposed { .. })
    ));
}

#[tokio::test]
async fn test_outage_rejects_until_store_recovers() {
    let (gate, store, _) = setup_at(noon(), AdmissionPolicy::default());
    assert_eq!(gate.evaluate("a").await, Decision::Admit);

    store.set_available(false);
    for _ in 0..5 {
        assert_eq!(
            gate.evaluate("a").await,
            Decision::Reject(Rejection::StoreFailure)
        );
    }

    store.set_available(true);
    assert_eq!(store.peek("window:a").as_deref(), Some("1"));
    assert_eq!(gate.evaluate("a").await, Decision::Admit);
}

#[tokio::test]
async fn test_clients_are_counted_independently() {
    let (gate, store, _) = setup_at(noon(), AdmissionPolicy::default());
    let gate = Arc::new(gate);
    store.seed("ban:b", "1", None);

    let handles: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|client| {
            let gate = gate.clone();
            tokio::spawn(async move { gate.evaluate(client).await })
        })
        .collect();

    let mut decisions = Vec::new();
    for handle in handles {
        decisions.push(handle.await.unwrap());
    }

    assert_eq!(
        decisions,
        vec![
            Decision::Admit,
            Decision::Reject(Rejection::Banned),
            Decision::Admit,
        ]
    );
    assert_eq!(store.peek("window:a").as_deref(), Some("1"));
    assert_eq!(store.peek("window:c").as_deref(), Some("1"));
    assert_eq!(store.peek("window:b"), None);
}
