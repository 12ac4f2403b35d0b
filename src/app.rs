//! # Service facade
//! `IndexPulse` owns the store and the scheduler and exposes the read
//! surface: latest snapshots, bounded history, the event log, current
//! predictions, manual pipeline triggers and a health summary. Callers
//! never touch the store's locks directly.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::AppConfig;
use crate::ingest::build_client;
use crate::model::{Event, FlowRecord, MacroIndicator, Prediction, PremiumRecord, Quote};
use crate::scheduler::{AdapterSet, JobHealth, Pipeline, Scheduler};
use crate::store::{EventFilter, SnapshotStore};
use crate::universe::TRACKED_INDICES;

/// One health row per pipeline plus store-level counts.
#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub pipelines: Vec<PipelineStatus>,
    pub events_logged: usize,
    pub predictions_active: usize,
    pub tracked_indices: usize,
}

#[derive(Debug, Serialize)]
pub struct PipelineStatus {
    pub pipeline: Pipeline,
    #[serde(flatten)]
    pub health: JobHealth,
}

pub struct IndexPulse {
    store: Arc<SnapshotStore>,
    scheduler: Scheduler,
}

impl IndexPulse {
    /// Build with live HTTP adapters.
    pub fn new(cfg: AppConfig) -> Result<Self> {
        let client = build_client(Duration::from_secs(cfg.request_timeout_secs))?;
        Ok(Self::with_adapters(cfg, AdapterSet::http(client)))
    }

    /// Build with caller-supplied adapters. Tests pass fixture-mode ones.
    pub fn with_adapters(cfg: AppConfig, adapters: AdapterSet) -> Self {
        let store = Arc::new(SnapshotStore::new(
            cfg.history_retention,
            cfg.event_retention,
            cfg.event_cooldown_secs,
        ));
        let scheduler = Scheduler::new(cfg, Arc::clone(&store), adapters);
        Self { store, scheduler }
    }

    pub fn start(&self) {
        self.scheduler.start();
    }

    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    // Snapshot reads.

    pub fn latest_quote(&self, index_code: &str) -> Option<Arc<Quote>> {
        self.store.quotes.latest(index_code)
    }

    pub fn latest_premium(&self, fund_code: &str) -> Option<Arc<PremiumRecord>> {
        self.store.premiums.latest(fund_code)
    }

    pub fn latest_flow(&self, direction: &str) -> Option<Arc<FlowRecord>> {
        self.store.flows.latest(direction)
    }

    pub fn latest_indicator(&self, kind: &str) -> Option<Arc<MacroIndicator>> {
        self.store.indicators.latest(kind)
    }

    /// Quote history for one index, oldest first.
    pub fn quote_history(
        &self,
        index_code: &str,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Vec<Arc<Quote>> {
        self.store.quotes.history(index_code, since, limit)
    }

    pub fn premium_history(
        &self,
        fund_code: &str,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Vec<Arc<PremiumRecord>> {
        self.store.premiums.history(fund_code, since, limit)
    }

    pub fn flow_history(
        &self,
        direction: &str,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Vec<Arc<FlowRecord>> {
        self.store.flows.history(direction, since, limit)
    }

    pub fn indicator_history(
        &self,
        kind: &str,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Vec<Arc<MacroIndicator>> {
        self.store.indicators.history(kind, since, limit)
    }

    // Events and predictions.

    /// Newest first, filtered and truncated.
    pub fn list_events(&self, filter: &EventFilter, limit: usize) -> Vec<Arc<Event>> {
        self.store.events.list(filter, limit)
    }

    pub fn current_prediction(&self, index_code: &str) -> Option<Arc<Prediction>> {
        self.store.predictions.current(index_code, Utc::now())
    }

    pub fn current_predictions(&self) -> Vec<Arc<Prediction>> {
        self.store.predictions.current_all(Utc::now())
    }

    // Operations.

    /// Run one pipeline now. Returns false when a cycle was in flight.
    pub async fn trigger_run(&self, pipeline: Pipeline) -> bool {
        self.scheduler.trigger(pipeline).await
    }

    pub fn job_health(&self) -> Vec<(Pipeline, JobHealth)> {
        self.scheduler.health()
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            pipelines: self
                .scheduler
                .health()
                .into_iter()
                .map(|(pipeline, health)| PipelineStatus { pipeline, health })
                .collect(),
            events_logged: self.store.events.len(),
            predictions_active: self.store.predictions.current_all(Utc::now()).len(),
            tracked_indices: TRACKED_INDICES.len(),
        }
    }

    /// Shared store handle, mainly for tests asserting on internals.
    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }
}
