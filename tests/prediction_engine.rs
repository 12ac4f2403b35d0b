// tests/prediction_engine.rs
// Forecasts over a seeded store: factor selection per index, composite
// renormalization and the confidence discount for missing inputs.

use chrono::{DateTime, Duration, Utc};
use indexpulse::model::{
    Confidence, Direction, FactorKind, FlowDirection, FlowRecord, IndicatorKind, MacroIndicator,
    PremiumRecord, Quote,
};
use indexpulse::predict::{generate_predictions, predict_index};
use indexpulse::SnapshotStore;
use std::sync::Arc;

fn quote(code: &str, change_percent: f64) -> (String, Quote) {
    (
        code.to_string(),
        Quote {
            index_code: code.into(),
            index_name: code.to_uppercase(),
            price: 5000.0,
            change: change_percent * 50.0,
            change_percent,
            open: None,
            high: None,
            low: None,
            volume: None,
            amount: None,
            recorded_at: Utc::now(),
        },
    )
}

fn premium(fund: &str, index: &str, rate: f64) -> (String, PremiumRecord) {
    (
        fund.to_string(),
        PremiumRecord {
            fund_code: fund.into(),
            fund_name: format!("Fund {fund}"),
            index_code: index.into(),
            price: Some(1.0),
            nav: Some(1.0),
            nav_date: None,
            premium_rate: Some(rate),
            volume: None,
            increase_percent: None,
            recorded_at: Utc::now(),
        },
    )
}

fn indicator(kind: IndicatorKind, value: f64) -> (String, MacroIndicator) {
    (
        kind.as_str().to_string(),
        MacroIndicator {
            kind,
            value,
            change: 0.0,
            change_percent: 0.0,
            classification: String::new(),
            recorded_at: Utc::now(),
        },
    )
}

#[test]
fn aligned_signals_give_a_confident_bullish_call() {
    let store = SnapshotStore::new(100, 100, 0);
    // Momentum +1.5% (-> 0.5), discount -2% (-> 0.5), normal VIX (-> 0.2).
    store.quotes.write_batch(vec![quote("sp500", 1.5)]);
    store
        .premiums
        .write_batch(vec![premium("513500", "sp500", -2.0)]);
    store
        .indicators
        .write_batch(vec![indicator(IndicatorKind::Vix, 16.0)]);

    let p = predict_index(&store, "sp500", "S&P 500", Utc::now()).unwrap();
    assert_eq!(p.direction, Direction::Bullish);
    assert_eq!(p.confidence, Confidence::High);
    assert!((p.predicted_change_percent - 1.68).abs() < 1e-9);
    // No connect channel for a US index: momentum, premium, macro only.
    assert_eq!(p.factors.len(), 3);
    assert!(p.factors.iter().all(|f| f.kind != FactorKind::FundFlow));
    assert!(!p.is_expired(Utc::now()));
}

#[test]
fn connect_indices_pick_up_the_flow_factor() {
    let store = SnapshotStore::new(100, 100, 0);
    store.quotes.write_batch(vec![quote("csi300", 0.3)]);
    store.flows.write_batch(vec![(
        "north".to_string(),
        FlowRecord {
            flow_type: FlowDirection::North,
            sh_connect: 40.0,
            sz_connect: 35.0,
            total: 75.0,
            update_time: "14:30".into(),
            recorded_at: Utc::now(),
        },
    )]);

    let p = predict_index(&store, "csi300", "CSI 300", Utc::now()).unwrap();
    assert!(p.factors.iter().any(|f| f.kind == FactorKind::FundFlow));
}

#[test]
fn missing_signals_lower_confidence_not_direction() {
    let store = SnapshotStore::new(100, 100, 0);
    // Quote only; premium and macro absent for a US index.
    store.quotes.write_batch(vec![quote("nasdaq100", 1.5)]);

    let p = predict_index(&store, "nasdaq100", "Nasdaq 100", Utc::now()).unwrap();
    assert_eq!(p.direction, Direction::Bullish);
    // 1 of 3 applicable signals present: availability alone caps it low.
    assert_eq!(p.confidence, Confidence::Low);
    assert_eq!(p.factors.len(), 1);
}

fn quote_at(code: &str, price: f64, at: DateTime<Utc>) -> (String, Quote) {
    let (key, mut q) = quote(code, 0.0);
    q.price = price;
    q.change = 0.0;
    q.recorded_at = at;
    (key, q)
}

#[test]
fn flat_day_reading_falls_back_to_history_trend() {
    let store = SnapshotStore::new(100, 100, 0);
    let t0 = Utc::now();
    store
        .quotes
        .write_batch(vec![quote_at("hsi", 18000.0, t0)]);
    store
        .quotes
        .write_batch(vec![quote_at("hsi", 18360.0, t0 + Duration::seconds(60))]);

    let p = predict_index(&store, "hsi", "Hang Seng Index", Utc::now()).unwrap();
    let momentum = p
        .factors
        .iter()
        .find(|f| f.kind == FactorKind::Momentum)
        .unwrap();
    assert!(momentum.label.starts_with("short-term trend"));
    assert_eq!(momentum.value, "+2.00%");
    assert_eq!(p.direction, Direction::Bullish);
}

#[test]
fn no_quote_means_no_forecast() {
    let store = SnapshotStore::new(100, 100, 0);
    assert!(predict_index(&store, "hsi", "Hang Seng Index", Utc::now()).is_none());
}

#[test]
fn generate_publishes_only_indices_with_data() {
    let store = Arc::new(SnapshotStore::new(100, 100, 0));
    store.quotes.write_batch(vec![quote("sp500", 0.5), quote("hsi", -0.4)]);

    let published = generate_predictions(&store, Utc::now());
    assert_eq!(published, 2);
    let all = store.predictions.current_all(Utc::now());
    assert_eq!(all.len(), 2);
    assert!(store.predictions.current("csi300", Utc::now()).is_none());
}
