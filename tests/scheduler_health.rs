// tests/scheduler_health.rs
// Failure accounting: a failed cycle leaves the store untouched, grows
// the failure streak and eventually flags the pipeline stale; a good
// cycle resets everything.

use std::collections::HashMap;
use std::sync::Arc;

use indexpulse::ingest::providers::flow::FlowAdapter;
use indexpulse::ingest::providers::macro_risk::MacroAdapter;
use indexpulse::ingest::providers::premium::PremiumAdapter;
use indexpulse::ingest::providers::quotes::QuotesAdapter;
use indexpulse::{AdapterSet, AppConfig, IndexPulse, Pipeline};

const SINA_FIXTURE: &str = concat!(
    "var hq_str_sh000300=\"CSI300,3455.12,3450.00,3460.20,3470.00,3440.10,0,0,123456,987654321\";\n",
    "var hq_str_hkHSI=\"HSI,HangSeng,18000.0,18100.0,18200.0,17900.0,17990.5,-109.5,-0.60,0,0,2345678\";\n",
);

fn dead_adapters() -> AdapterSet {
    AdapterSet {
        quotes: Arc::new(QuotesAdapter::from_fixtures(HashMap::new())),
        premium: Arc::new(PremiumAdapter::from_fixture("{}")),
        flow: Arc::new(FlowAdapter::from_fixtures(None, None)),
        macro_risk: Arc::new(MacroAdapter::from_fixtures(HashMap::new())),
    }
}

fn health_of(service: &IndexPulse, pipeline: Pipeline) -> indexpulse::JobHealth {
    service
        .job_health()
        .into_iter()
        .find(|(p, _)| *p == pipeline)
        .map(|(_, h)| h)
        .unwrap()
}

#[tokio::test]
async fn failure_streak_flags_stale_and_store_stays_empty() {
    let cfg = AppConfig {
        stale_after_failures: 2,
        ..AppConfig::default()
    };
    let service = IndexPulse::with_adapters(cfg, dead_adapters());

    assert!(service.trigger_run(Pipeline::Quotes).await);
    let h = health_of(&service, Pipeline::Quotes);
    assert_eq!(h.consecutive_failures, 1);
    assert!(!h.stale);
    assert!(h.last_error.is_some());
    assert!(h.last_success_at.is_none());

    assert!(service.trigger_run(Pipeline::Quotes).await);
    let h = health_of(&service, Pipeline::Quotes);
    assert_eq!(h.consecutive_failures, 2);
    assert!(h.stale);

    // Nothing reached the store across either failed cycle.
    assert!(service.latest_quote("csi300").is_none());
    assert_eq!(service.status().events_logged, 0);
}

#[tokio::test]
async fn good_cycle_resets_the_streak_and_publishes_predictions() {
    let mut bodies = HashMap::new();
    bodies.insert("sina".to_string(), SINA_FIXTURE.to_string());
    let adapters = AdapterSet {
        quotes: Arc::new(QuotesAdapter::from_fixtures(bodies)),
        ..dead_adapters()
    };
    let service = IndexPulse::with_adapters(AppConfig::default(), adapters);

    assert!(service.trigger_run(Pipeline::Quotes).await);
    let h = health_of(&service, Pipeline::Quotes);
    assert_eq!(h.consecutive_failures, 0);
    assert!(!h.stale);
    assert!(h.last_success_at.is_some());
    assert!(h.last_error.is_none());

    let csi = service.latest_quote("csi300").unwrap();
    assert!((csi.price - 3460.20).abs() < 1e-9);

    // A quotes cycle refreshes forecasts for every index with data.
    assert_eq!(service.current_predictions().len(), 2);
    assert!(service.current_prediction("csi300").is_some());
    assert!(service.current_prediction("sp500").is_none());

    let status = service.status();
    assert_eq!(status.tracked_indices, 6);
    assert_eq!(status.predictions_active, 2);
}

#[tokio::test]
async fn sibling_pipelines_track_health_independently() {
    let service = IndexPulse::with_adapters(AppConfig::default(), dead_adapters());
    assert!(service.trigger_run(Pipeline::Flow).await);

    assert_eq!(health_of(&service, Pipeline::Flow).consecutive_failures, 1);
    assert_eq!(health_of(&service, Pipeline::Premium).consecutive_failures, 0);
    assert!(health_of(&service, Pipeline::Premium).last_run_at.is_none());
}
