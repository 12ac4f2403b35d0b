// tests/event_cooldown.rs
// Replaying a derivation must not double-alert: the log's dedup key plus
// the cooldown window swallow repeats, and the window reopens afterwards.

use chrono::{Duration, Utc};
use indexpulse::events::{premium_events, AlertThresholds};
use indexpulse::model::PremiumRecord;
use indexpulse::store::EventLog;

fn premium(rate: f64) -> PremiumRecord {
    PremiumRecord {
        fund_code: "513100".into(),
        fund_name: "NDX ETF".into(),
        index_code: "nasdaq100".into(),
        price: Some(1.0 + rate / 100.0),
        nav: Some(1.0),
        nav_date: Some("2026-08-26".into()),
        premium_rate: Some(rate),
        volume: None,
        increase_percent: None,
        recorded_at: Utc::now(),
    }
}

#[test]
fn recrossing_within_cooldown_is_suppressed_then_allowed() {
    let th = AlertThresholds::default();
    let log = EventLog::new(100, 1800);
    let t0 = Utc::now();

    // First crossing into the high band: kept.
    let first = premium_events(Some(&premium(0.5)), &premium(1.8), &th, t0);
    assert_eq!(first.len(), 1);
    assert!(log.append(first[0].clone()));

    // Dip out and recross ten minutes later: derived again, same dedup
    // key, swallowed by the cooldown.
    let again = premium_events(
        Some(&premium(0.5)),
        &premium(1.8),
        &th,
        t0 + Duration::minutes(10),
    );
    assert_eq!(again.len(), 1);
    assert_eq!(again[0].dedup_key, first[0].dedup_key);
    assert!(!log.append(again[0].clone()));

    // Past the window the same crossing alerts again.
    let later = premium_events(
        Some(&premium(0.5)),
        &premium(1.8),
        &th,
        t0 + Duration::minutes(31),
    );
    assert!(log.append(later[0].clone()));
    assert_eq!(log.len(), 2);
}

#[test]
fn different_magnitude_bucket_is_a_new_alert() {
    let th = AlertThresholds::default();
    let log = EventLog::new(100, 1800);
    let t0 = Utc::now();

    let mild = premium_events(Some(&premium(0.5)), &premium(1.8), &th, t0);
    let severe = premium_events(Some(&premium(0.5)), &premium(3.4), &th, t0);
    assert_ne!(mild[0].dedup_key, severe[0].dedup_key);
    assert!(log.append(mild[0].clone()));
    assert!(log.append(severe[0].clone()));
}
