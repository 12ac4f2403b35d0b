//! Canonical record types shared by the whole pipeline.
//!
//! Adapters construct these, the snapshot store retains them, and the event
//! deriver and prediction engine read them. Every record is immutable once
//! written; a missing numeric input is an explicit `None`, never a zero.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Index quote snapshot, one per tracked index per cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub index_code: String,
    pub index_name: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<f64>,
    /// Turnover, only published by some upstreams.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

/// QDII fund premium snapshot.
///
/// `premium_rate` is `None` whenever the NAV is unpublished or zero
/// (non-trading day, delayed disclosure). It is never coerced to 0;
/// downstream consumers must treat `None` as "unavailable".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PremiumRecord {
    pub fund_code: String,
    pub fund_name: String,
    pub index_code: String,
    pub price: Option<f64>,
    pub nav: Option<f64>,
    pub nav_date: Option<String>,
    pub premium_rate: Option<f64>,
    pub volume: Option<f64>,
    /// Day change of the market price, percent.
    pub increase_percent: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

impl PremiumRecord {
    /// Premium over NAV in percent. Defined only for `nav > 0`.
    pub fn compute_premium(price: Option<f64>, nav: Option<f64>) -> Option<f64> {
        match (price, nav) {
            (Some(p), Some(n)) if n > 0.0 => Some((p - n) / n * 100.0),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDirection {
    North,
    South,
}

impl FlowDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowDirection::North => "north",
            FlowDirection::South => "south",
        }
    }
}

/// Cross-border stock-connect net flow, in units of 100M CNY.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub flow_type: FlowDirection,
    pub sh_connect: f64,
    pub sz_connect: f64,
    pub total: f64,
    /// Upstream intraday timestamp, e.g. "14:35".
    pub update_time: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Vix,
    Dxy,
    Treasury10y,
    Treasury2y,
    YieldCurve,
    FearGreed,
}

impl IndicatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::Vix => "vix",
            IndicatorKind::Dxy => "dxy",
            IndicatorKind::Treasury10y => "treasury_10y",
            IndicatorKind::Treasury2y => "treasury_2y",
            IndicatorKind::YieldCurve => "yield_curve",
            IndicatorKind::FearGreed => "fear_greed",
        }
    }
}

/// Macro risk indicator snapshot with its bucket label
/// (e.g. VIX "elevated", DXY "strong", yield curve "inverted").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroIndicator {
    pub kind: IndicatorKind,
    pub value: f64,
    pub change: f64,
    pub change_percent: f64,
    pub classification: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PremiumAlert,
    FundFlow,
    IndexMove,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PremiumAlert => "premium_alert",
            EventType::FundFlow => "fund_flow",
            EventType::IndexMove => "index_move",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    Positive,
    Negative,
    Neutral,
}

/// Derived alert event. Append-only; pruned by retention, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub event_type: EventType,
    pub target_index: String,
    pub title: String,
    pub summary: String,
    pub impact: Impact,
    /// Magnitude bucket, 1..=5.
    pub importance: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// The normalized record that triggered the alert.
    pub data_snapshot: serde_json::Value,
    /// `(event_type, target, value_bucket)`; suppresses re-alerting on a
    /// plateaued condition within the cooldown window.
    pub dedup_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorKind {
    Premium,
    FundFlow,
    Macro,
    Momentum,
}

/// One scored input of a prediction, kept for auditability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub kind: FactorKind,
    pub label: String,
    pub value: String,
    pub impact: Impact,
}

/// Short-horizon directional forecast. Superseded by the next scheduled
/// run; past `expires_at` it must be treated as stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub index_code: String,
    pub index_name: String,
    pub current_price: f64,
    pub predicted_change_percent: f64,
    pub confidence: Confidence,
    pub direction: Direction,
    pub factors: Vec<Factor>,
    pub summary: String,
    pub predicted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Prediction {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Implemented by every record the snapshot store retains; the store uses
/// it to enforce strictly increasing per-key timestamps.
pub trait Timestamped {
    fn recorded_at(&self) -> DateTime<Utc>;
}

impl Timestamped for Quote {
    fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}
impl Timestamped for PremiumRecord {
    fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}
impl Timestamped for FlowRecord {
    fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}
impl Timestamped for MacroIndicator {
    fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn premium_is_unavailable_without_positive_nav() {
        assert_eq!(PremiumRecord::compute_premium(Some(1.02), None), None);
        assert_eq!(PremiumRecord::compute_premium(Some(1.02), Some(0.0)), None);
        assert_eq!(PremiumRecord::compute_premium(None, Some(1.0)), None);

        let p = PremiumRecord::compute_premium(Some(1.03), Some(1.0)).unwrap();
        assert!((p - 3.0).abs() < 1e-9);
    }

    #[test]
    fn prediction_expiry_is_inclusive() {
        let now = Utc::now();
        let p = Prediction {
            index_code: "sp500".into(),
            index_name: "S&P 500".into(),
            current_price: 5000.0,
            predicted_change_percent: 1.0,
            confidence: Confidence::Medium,
            direction: Direction::Bullish,
            factors: vec![],
            summary: String::new(),
            predicted_at: now,
            expires_at: now + chrono::Duration::hours(48),
        };
        assert!(!p.is_expired(now));
        assert!(p.is_expired(now + chrono::Duration::hours(48)));
    }
}
