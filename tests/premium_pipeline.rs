// tests/premium_pipeline.rs
// Fixture-mode premium pipeline end to end: adapter -> store -> events.

use std::collections::HashMap;
use std::sync::Arc;

use indexpulse::ingest::providers::flow::FlowAdapter;
use indexpulse::ingest::providers::macro_risk::MacroAdapter;
use indexpulse::ingest::providers::premium::{fixture_body, fixture_row, PremiumAdapter};
use indexpulse::ingest::providers::quotes::QuotesAdapter;
use indexpulse::model::{EventType, Impact};
use indexpulse::{AdapterSet, AppConfig, EventFilter, IndexPulse, Pipeline};

fn adapters_with_premium(body: String) -> AdapterSet {
    AdapterSet {
        quotes: Arc::new(QuotesAdapter::from_fixtures(HashMap::new())),
        premium: Arc::new(PremiumAdapter::from_fixture(body)),
        flow: Arc::new(FlowAdapter::from_fixtures(None, None)),
        macro_risk: Arc::new(MacroAdapter::from_fixtures(HashMap::new())),
    }
}

#[tokio::test]
async fn missing_nav_flows_through_as_unavailable_not_zero() {
    let body = fixture_body(&[
        // Non-trading day: price quoted, NAV withheld.
        fixture_row("513500", "SP500 ETF", "1.020", "-", ""),
        fixture_row("513100", "NDX ETF", "1.100", "1.000", "2026-08-26"),
    ]);
    let service = IndexPulse::with_adapters(AppConfig::default(), adapters_with_premium(body));

    assert!(service.trigger_run(Pipeline::Premium).await);

    let sp = service.latest_premium("513500").unwrap();
    assert_eq!(sp.premium_rate, None);
    assert_eq!(sp.nav, None);
    assert_eq!(sp.price, Some(1.020));

    let ndx = service.latest_premium("513100").unwrap();
    assert!((ndx.premium_rate.unwrap() - 10.0).abs() < 1e-9);
}

#[tokio::test]
async fn band_crossing_alerts_once_and_plateau_stays_quiet() {
    let body = fixture_body(&[fixture_row("513100", "NDX ETF", "1.100", "1.000", "2026-08-26")]);
    let service = IndexPulse::with_adapters(AppConfig::default(), adapters_with_premium(body));

    assert!(service.trigger_run(Pipeline::Premium).await);
    let events = service.list_events(&EventFilter::default(), 10);
    assert_eq!(events.len(), 1);
    let ev = &events[0];
    assert_eq!(ev.event_type, EventType::PremiumAlert);
    assert_eq!(ev.target_index, "nasdaq100");
    assert_eq!(ev.impact, Impact::Positive); // impact carries the rate's sign
    assert_eq!(ev.importance, 5); // +10% is far beyond the top bucket

    // Same reading again: still inside the band, no second alert.
    assert!(service.trigger_run(Pipeline::Premium).await);
    assert_eq!(service.list_events(&EventFilter::default(), 10).len(), 1);
}

#[tokio::test]
async fn event_filters_narrow_by_type_and_importance() {
    let body = fixture_body(&[
        fixture_row("513100", "NDX ETF", "1.100", "1.000", "2026-08-26"),
        fixture_row("513500", "SP500 ETF", "0.980", "1.000", "2026-08-26"),
    ]);
    let service = IndexPulse::with_adapters(AppConfig::default(), adapters_with_premium(body));
    assert!(service.trigger_run(Pipeline::Premium).await);

    // 513100 +10% (importance 5), 513500 -2% discount (importance 3).
    assert_eq!(service.list_events(&EventFilter::default(), 10).len(), 2);

    let important = service.list_events(
        &EventFilter {
            min_importance: Some(5),
            ..Default::default()
        },
        10,
    );
    assert_eq!(important.len(), 1);
    assert_eq!(important[0].target_index, "nasdaq100");

    let sp_only = service.list_events(
        &EventFilter {
            target_index: Some("sp500".into()),
            ..Default::default()
        },
        10,
    );
    assert_eq!(sp_only.len(), 1);
    assert_eq!(sp_only[0].impact, Impact::Negative); // -2% discount
}
