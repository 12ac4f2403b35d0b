// src/ingest/mod.rs
pub mod providers;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

use crate::error::FetchError;
use crate::model::{FlowRecord, MacroIndicator, PremiumRecord, Quote};

/// The output of one adapter run: one fully normalized batch for exactly
/// one domain. Either the whole batch reaches the store or none of it.
#[derive(Debug, Clone)]
pub enum NormalizedBatch {
    Quotes(Vec<Quote>),
    Premium(Vec<PremiumRecord>),
    Flow(Vec<FlowRecord>),
    Macro(Vec<MacroIndicator>),
}

impl NormalizedBatch {
    pub fn len(&self) -> usize {
        match self {
            NormalizedBatch::Quotes(v) => v.len(),
            NormalizedBatch::Premium(v) => v.len(),
            NormalizedBatch::Flow(v) => v.len(),
            NormalizedBatch::Macro(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One upstream's normalization adapter. A single attempt per invocation,
/// no internal retry (the scheduler owns cadence), no side effects beyond
/// the network call.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self) -> Result<NormalizedBatch, FetchError>;
    fn name(&self) -> &'static str;
}

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Shared HTTP client. The timeout is mandatory: a hung upstream becomes
/// that cycle's failure instead of wedging its pipeline.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("building http client")
}

/// One-time metrics registration.
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("pipeline_runs_total", "Pipeline cycles started.");
        describe_counter!(
            "pipeline_skipped_total",
            "Ticks skipped by the in-flight guard."
        );
        describe_counter!("pipeline_errors_total", "Failed pipeline cycles.");
        describe_counter!("events_emitted_total", "Alert events appended to the log.");
        describe_counter!("events_deduped_total", "Alert events suppressed by cooldown.");
        describe_counter!("predictions_published_total", "Forecasts published.");
        describe_counter!(
            "adapter_fetch_errors_total",
            "Sub-endpoint fetch/parse errors."
        );
        describe_histogram!("adapter_fetch_ms", "Adapter fetch+parse time, milliseconds.");
        describe_gauge!(
            "pipeline_last_success_ts",
            "Unix ts of the last successful cycle."
        );
    });
}

/// Tolerant numeric parse for upstream cells: empty, "-" and other
/// placeholders mean "unavailable" and come back as `None`, never 0.
/// Percent strings ("2.35%") drop the suffix.
pub(crate) fn lenient_f64(raw: &str) -> Option<f64> {
    let s = raw.trim().trim_end_matches('%');
    if s.is_empty() || s == "-" || s == "--" {
        return None;
    }
    s.replace(',', "").parse::<f64>().ok()
}

/// Strip a JSONP callback wrapper (`cb({...});`) when present, returning
/// the inner JSON. Plain JSON passes through untouched.
pub(crate) fn strip_jsonp(body: &str) -> &str {
    let trimmed = body.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return trimmed;
    }
    match (trimmed.find('('), trimmed.rfind(')')) {
        (Some(open), Some(close)) if close > open => &trimmed[open + 1..close],
        _ => trimmed,
    }
}
