//! # Pipeline scheduler
//! One owned scheduler instance drives the four ingestion pipelines on
//! independent cadences. Each pipeline runs at most one cycle at a time:
//! a tick that lands while the previous cycle is still in flight is
//! skipped, never queued. A failed cycle leaves the store untouched and
//! bumps the pipeline's failure streak; after enough consecutive failures
//! the pipeline is flagged stale in its health record.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::events;
use crate::ingest::providers::flow::FlowAdapter;
use crate::ingest::providers::macro_risk::MacroAdapter;
use crate::ingest::providers::premium::PremiumAdapter;
use crate::ingest::providers::quotes::QuotesAdapter;
use crate::ingest::{ensure_metrics_described, NormalizedBatch, SourceAdapter};
use crate::predict;
use crate::store::SnapshotStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pipeline {
    Quotes,
    Premium,
    Flow,
    Macro,
}

impl Pipeline {
    pub const fn all() -> [Pipeline; 4] {
        [
            Pipeline::Quotes,
            Pipeline::Premium,
            Pipeline::Flow,
            Pipeline::Macro,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Pipeline::Quotes => "quotes",
            Pipeline::Premium => "premium",
            Pipeline::Flow => "flow",
            Pipeline::Macro => "macro",
        }
    }

    fn interval(&self, cfg: &AppConfig) -> StdDuration {
        let secs = match self {
            Pipeline::Quotes => cfg.quotes_interval_secs,
            Pipeline::Premium => cfg.premium_interval_secs,
            Pipeline::Flow => cfg.flow_interval_secs,
            Pipeline::Macro => cfg.macro_interval_secs,
        };
        StdDuration::from_secs(secs.max(1))
    }
}

impl FromStr for Pipeline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quotes" => Ok(Pipeline::Quotes),
            "premium" => Ok(Pipeline::Premium),
            "flow" => Ok(Pipeline::Flow),
            "macro" => Ok(Pipeline::Macro),
            other => Err(format!("unknown pipeline: {other}")),
        }
    }
}

/// Observable state of one pipeline.
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobHealth {
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub next_scheduled_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    pub stale: bool,
}

struct JobState {
    in_flight: AtomicBool,
    health: Mutex<JobHealth>,
}

impl JobState {
    fn new() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
            health: Mutex::new(JobHealth::default()),
        }
    }
}

/// The four adapters the scheduler drives, behind the common trait so
/// tests can substitute fixture-mode instances.
pub struct AdapterSet {
    pub quotes: Arc<dyn SourceAdapter>,
    pub premium: Arc<dyn SourceAdapter>,
    pub flow: Arc<dyn SourceAdapter>,
    pub macro_risk: Arc<dyn SourceAdapter>,
}

impl AdapterSet {
    /// Live adapters sharing one HTTP client.
    pub fn http(client: reqwest::Client) -> Self {
        Self {
            quotes: Arc::new(QuotesAdapter::new(client.clone())),
            premium: Arc::new(PremiumAdapter::new(client.clone())),
            flow: Arc::new(FlowAdapter::new(client.clone())),
            macro_risk: Arc::new(MacroAdapter::new(client)),
        }
    }

    fn get(&self, pipeline: Pipeline) -> Arc<dyn SourceAdapter> {
        match pipeline {
            Pipeline::Quotes => Arc::clone(&self.quotes),
            Pipeline::Premium => Arc::clone(&self.premium),
            Pipeline::Flow => Arc::clone(&self.flow),
            Pipeline::Macro => Arc::clone(&self.macro_risk),
        }
    }
}

struct Inner {
    cfg: AppConfig,
    store: Arc<SnapshotStore>,
    adapters: AdapterSet,
    jobs: HashMap<Pipeline, JobState>,
}

pub struct Scheduler {
    inner: Arc<Inner>,
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(cfg: AppConfig, store: Arc<SnapshotStore>, adapters: AdapterSet) -> Self {
        ensure_metrics_described();
        let jobs = Pipeline::all()
            .into_iter()
            .map(|p| (p, JobState::new()))
            .collect();
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                cfg,
                store,
                adapters,
                jobs,
            }),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn one loop per pipeline. Each loop fires immediately, then on
    /// its cadence, until shutdown.
    pub fn start(&self) {
        let mut handles = self.handles.lock().expect("scheduler handles poisoned");
        for pipeline in Pipeline::all() {
            let inner = Arc::clone(&self.inner);
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            let period = pipeline.interval(&inner.cfg);
            tracing::info!(
                pipeline = pipeline.as_str(),
                interval_secs = period.as_secs(),
                "pipeline loop started"
            );
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Ok(mut h) = inner.jobs[&pipeline].health.lock() {
                                h.next_scheduled_at =
                                    Some(Utc::now() + Duration::from_std(period).unwrap_or_default());
                            }
                            run_pipeline(&inner, pipeline).await;
                        }
                        _ = shutdown_rx.changed() => {
                            tracing::info!(pipeline = pipeline.as_str(), "pipeline loop stopped");
                            break;
                        }
                    }
                }
            }));
        }
    }

    /// Run one pipeline immediately, outside its cadence. Returns false
    /// when a cycle was already in flight.
    pub async fn trigger(&self, pipeline: Pipeline) -> bool {
        run_pipeline(&self.inner, pipeline).await
    }

    pub fn health(&self) -> Vec<(Pipeline, JobHealth)> {
        Pipeline::all()
            .into_iter()
            .map(|p| {
                let h = self.inner.jobs[&p]
                    .health
                    .lock()
                    .map(|g| g.clone())
                    .unwrap_or_default();
                (p, h)
            })
            .collect()
    }

    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handles: Vec<JoinHandle<()>> =
            std::mem::take(&mut *self.handles.lock().expect("scheduler handles poisoned"));
        for handle in handles {
            let _ = handle.await;
        }
        tracing::info!("scheduler stopped");
    }
}

/// One full cycle: fetch, store, derive events, refresh predictions.
/// Returns false when skipped by the in-flight guard.
async fn run_pipeline(inner: &Arc<Inner>, pipeline: Pipeline) -> bool {
    let job = &inner.jobs[&pipeline];
    if job
        .in_flight
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        tracing::debug!(pipeline = pipeline.as_str(), "cycle still in flight, tick skipped");
        counter!("pipeline_skipped_total", "pipeline" => pipeline.as_str()).increment(1);
        return false;
    }

    counter!("pipeline_runs_total", "pipeline" => pipeline.as_str()).increment(1);
    let started = Utc::now();
    if let Ok(mut h) = job.health.lock() {
        h.last_run_at = Some(started);
    }

    let adapter = inner.adapters.get(pipeline);
    let result = adapter.fetch().await;
    match result {
        Ok(batch) => {
            let fetched = batch.len();
            let written = apply_batch(inner, pipeline, batch);
            let now = Utc::now();
            if let Ok(mut h) = job.health.lock() {
                h.last_success_at = Some(now);
                h.last_error = None;
                h.consecutive_failures = 0;
                h.stale = false;
            }
            gauge!("pipeline_last_success_ts", "pipeline" => pipeline.as_str())
                .set(now.timestamp() as f64);
            tracing::info!(
                pipeline = pipeline.as_str(),
                fetched,
                written,
                "cycle complete"
            );
        }
        Err(e) => {
            counter!("pipeline_errors_total", "pipeline" => pipeline.as_str()).increment(1);
            let (failures, stale) = {
                let mut h = job.health.lock().expect("job health poisoned");
                h.consecutive_failures += 1;
                h.last_error = Some(e.to_string());
                h.stale = h.consecutive_failures >= inner.cfg.stale_after_failures;
                (h.consecutive_failures, h.stale)
            };
            tracing::warn!(
                pipeline = pipeline.as_str(),
                error = %e,
                failures,
                stale,
                "cycle failed, snapshots unchanged"
            );
        }
    }

    job.in_flight.store(false, Ordering::Release);
    true
}

/// Store a normalized batch, derive alert events against the previous
/// snapshots, and (after a quotes cycle) refresh the predictions.
fn apply_batch(inner: &Arc<Inner>, pipeline: Pipeline, batch: NormalizedBatch) -> usize {
    let store = &inner.store;
    let th = &inner.cfg.thresholds;
    let now = Utc::now();
    let mut derived = Vec::new();

    let written = match batch {
        NormalizedBatch::Quotes(quotes) => {
            for q in &quotes {
                let prev = store.quotes.latest(&q.index_code);
                derived.extend(events::index_events(prev.as_deref(), q, th, now));
            }
            let written = store
                .quotes
                .write_batch(quotes.into_iter().map(|q| (q.index_code.clone(), q)).collect());
            predict::generate_predictions(store, now);
            written
        }
        NormalizedBatch::Premium(records) => {
            for r in &records {
                let prev = store.premiums.latest(&r.fund_code);
                derived.extend(events::premium_events(prev.as_deref(), r, th, now));
            }
            store
                .premiums
                .write_batch(records.into_iter().map(|r| (r.fund_code.clone(), r)).collect())
        }
        NormalizedBatch::Flow(records) => {
            for r in &records {
                let prev = store.flows.latest(r.flow_type.as_str());
                derived.extend(events::flow_events(prev.as_deref(), r, th, now));
            }
            store.flows.write_batch(
                records
                    .into_iter()
                    .map(|r| (r.flow_type.as_str().to_string(), r))
                    .collect(),
            )
        }
        NormalizedBatch::Macro(indicators) => store.indicators.write_batch(
            indicators
                .into_iter()
                .map(|i| (i.kind.as_str().to_string(), i))
                .collect(),
        ),
    };

    for event in derived {
        tracing::info!(
            pipeline = pipeline.as_str(),
            dedup_key = %event.dedup_key,
            title = %event.title,
            "event derived"
        );
        if store.events.append(event) {
            counter!("events_emitted_total").increment(1);
        } else {
            counter!("events_deduped_total").increment(1);
        }
    }

    written
}
