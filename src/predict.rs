//! # Prediction engine
//! Pure scoring that maps the current snapshots of one index into a
//! 48-hour directional forecast with an auditable factor breakdown.
//!
//! Each signal lands on a bounded [-1, +1] scale; a fixed weight vector
//! (summing to 1) blends the available ones. Confidence degrades with
//! missing signals and with disagreement between them; the forecast is
//! never a black box and never hides which inputs were absent.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::model::{
    Confidence, Direction, Factor, FactorKind, FlowDirection, Impact, IndicatorKind, Prediction,
};
use crate::store::SnapshotStore;
use crate::universe::{flow_direction_for_index, funds_for_index, TRACKED_INDICES};

/// Fixed weight vector; the four weights sum to 1.
pub const WEIGHT_MOMENTUM: f64 = 0.30;
pub const WEIGHT_FLOW: f64 = 0.25;
pub const WEIGHT_PREMIUM: f64 = 0.25;
pub const WEIGHT_MACRO: f64 = 0.20;

/// Composite beyond +-tau flips the direction off neutral.
pub const DIRECTION_TAU: f64 = 0.15;
/// Percent move a full-strength composite maps to.
pub const CALIBRATION_PCT: f64 = 4.0;

/// Forecast validity horizon.
pub const HORIZON_HOURS: i64 = 48;

/// One applicable signal: its weight, its score when computable, and the
/// audit factor describing what was seen.
#[derive(Debug, Clone)]
pub struct Signal {
    pub weight: f64,
    pub score: Option<f64>,
    pub factor: Option<Factor>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Composite {
    pub score: f64,
    pub available: usize,
    pub applicable: usize,
    pub dispersion: f64,
}

fn clamp(x: f64) -> f64 {
    x.clamp(-1.0, 1.0)
}

/// Weighted blend over the available signals, renormalized by the weight
/// mass actually present. Returns `None` when nothing is available.
///
/// Dispersion is taken over all applicable slots with each missing slot
/// counted at full deviation, so losing a dissenting signal can never
/// read as increased agreement.
pub fn combine(signals: &[Signal]) -> Option<Composite> {
    let applicable = signals.len();
    let present: Vec<(f64, f64)> = signals
        .iter()
        .filter_map(|s| s.score.map(|v| (s.weight, v)))
        .collect();
    if present.is_empty() {
        return None;
    }

    let weight_mass: f64 = present.iter().map(|(w, _)| w).sum();
    let score = present.iter().map(|(w, s)| w * s).sum::<f64>() / weight_mass;

    let n = present.len() as f64;
    let mean = present.iter().map(|(_, s)| s).sum::<f64>() / n;
    let missing = (applicable - present.len()) as f64;
    let variance = (present.iter().map(|(_, s)| (s - mean).powi(2)).sum::<f64>() + missing)
        / applicable as f64;

    Some(Composite {
        score,
        available: present.len(),
        applicable,
        dispersion: variance.sqrt(),
    })
}

/// Raw confidence in [0, 1]: the fraction of applicable signals present,
/// discounted by up to half for disagreement. Absent slots carry full
/// deviation inside the dispersion, so dropping any signal, dissenting
/// or not, never raises confidence.
pub fn confidence_score(c: &Composite) -> f64 {
    if c.applicable == 0 {
        return 0.0;
    }
    let availability = c.available as f64 / c.applicable as f64;
    availability * (1.0 - c.dispersion.min(1.0) / 2.0)
}

pub fn confidence_bucket(score: f64) -> Confidence {
    if score >= 0.75 {
        Confidence::High
    } else if score >= 0.45 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

pub fn direction_of(composite: f64) -> Direction {
    if composite > DIRECTION_TAU {
        Direction::Bullish
    } else if composite < -DIRECTION_TAU {
        Direction::Bearish
    } else {
        Direction::Neutral
    }
}

fn impact_of(score: f64) -> Impact {
    if score > 0.05 {
        Impact::Positive
    } else if score < -0.05 {
        Impact::Negative
    } else {
        Impact::Neutral
    }
}

/// Day momentum of the index itself: `change_percent / 3`, clamped. A flat
/// reading (no previous close published) falls back to the short-horizon
/// trend over stored history.
fn momentum_signal(store: &SnapshotStore, index_code: &str) -> Signal {
    let Some(quote) = store.quotes.latest(index_code) else {
        return Signal {
            weight: WEIGHT_MOMENTUM,
            score: None,
            factor: None,
        };
    };
    let (pct, basis) = if quote.change_percent != 0.0 {
        (quote.change_percent, "day momentum")
    } else if let Some(trend) = history_trend(store, index_code) {
        (trend, "short-term trend")
    } else {
        (0.0, "day momentum")
    };
    let score = clamp(pct / 3.0);
    let word = if pct >= 0.0 { "up" } else { "down" };
    Signal {
        weight: WEIGHT_MOMENTUM,
        score: Some(score),
        factor: Some(Factor {
            kind: FactorKind::Momentum,
            label: format!("{basis} {word}"),
            value: format!("{pct:+.2}%"),
            impact: impact_of(score),
        }),
    }
}

/// Percent move across the recent stored quotes (up to the last 10).
fn history_trend(store: &SnapshotStore, index_code: &str) -> Option<f64> {
    let hist = store.quotes.history(index_code, None, 10);
    if hist.len() < 2 {
        return None;
    }
    let first = hist.first()?;
    let last = hist.last()?;
    if first.price <= 0.0 {
        return None;
    }
    Some((last.price - first.price) / first.price * 100.0)
}

/// Recent connect-flow momentum: mean of the last totals over `/50`,
/// clamped. Only applicable to indices on a connect channel.
fn flow_signal(store: &SnapshotStore, direction: FlowDirection) -> Signal {
    let history = store.flows.history(direction.as_str(), None, 10);
    if history.is_empty() {
        return Signal {
            weight: WEIGHT_FLOW,
            score: None,
            factor: None,
        };
    }
    let mean = history.iter().map(|r| r.total).sum::<f64>() / history.len() as f64;
    let score = clamp(mean / 50.0);
    let side = match direction {
        FlowDirection::North => "northbound",
        FlowDirection::South => "southbound",
    };
    let word = if mean >= 0.0 { "net inflow" } else { "net outflow" };
    Signal {
        weight: WEIGHT_FLOW,
        score: Some(score),
        factor: Some(Factor {
            kind: FactorKind::FundFlow,
            label: format!("{side} {word}"),
            value: format!("{mean:+.1} x100M"),
            impact: impact_of(score),
        }),
    }
}

/// Mean tracked-fund premium, inverse sign: a rich premium predicts mean
/// reversion down, a discount leaves room to recover. Unavailable premiums
/// are excluded, never counted as zero.
fn premium_signal(store: &SnapshotStore, index_code: &str) -> Signal {
    let rates: Vec<f64> = funds_for_index(index_code)
        .filter_map(|f| store.premiums.latest(f.fund_code))
        .filter_map(|r| r.premium_rate)
        .collect();
    if rates.is_empty() {
        return Signal {
            weight: WEIGHT_PREMIUM,
            score: None,
            factor: None,
        };
    }
    let mean = rates.iter().sum::<f64>() / rates.len() as f64;
    let score = clamp(-mean / 4.0);
    let label = if mean > 1.0 {
        "QDII premium rich"
    } else if mean < -1.0 {
        "QDII discount"
    } else {
        "QDII premium normal"
    };
    Signal {
        weight: WEIGHT_PREMIUM,
        score: Some(score),
        factor: Some(Factor {
            kind: FactorKind::Premium,
            label: label.to_string(),
            value: format!("{mean:+.2}%"),
            impact: impact_of(score),
        }),
    }
}

/// Macro risk posture: VIX bucket plus a fixed penalty while the yield
/// curve is inverted. Extreme panic scores mildly positive (oversold
/// bounce); complacency and ordinary panic both score negative.
fn macro_signal(store: &SnapshotStore) -> Signal {
    let vix = store.indicators.latest(IndicatorKind::Vix.as_str());
    let curve = store.indicators.latest(IndicatorKind::YieldCurve.as_str());
    if vix.is_none() && curve.is_none() {
        return Signal {
            weight: WEIGHT_MACRO,
            score: None,
            factor: None,
        };
    }

    let mut score = 0.0;
    let mut label_parts: Vec<String> = Vec::new();
    let mut value = String::new();

    if let Some(v) = &vix {
        let (s, bucket) = vix_bucket_score(v.value);
        score += s;
        // A fast VIX spike or crush shifts the read further.
        if v.change_percent > 10.0 {
            score -= 0.2;
        } else if v.change_percent < -10.0 {
            score += 0.2;
        }
        label_parts.push(bucket.to_string());
        value = format!("VIX {:.1}", v.value);
    }
    if let Some(c) = &curve {
        if c.value < 0.0 {
            score -= 0.4;
            label_parts.push("yield curve inverted".to_string());
            if value.is_empty() {
                value = format!("spread {:+.2}%", c.value);
            }
        }
    }

    let score = clamp(score);
    Signal {
        weight: WEIGHT_MACRO,
        score: Some(score),
        factor: Some(Factor {
            kind: FactorKind::Macro,
            label: label_parts.join("; "),
            value,
            impact: impact_of(score),
        }),
    }
}

fn vix_bucket_score(value: f64) -> (f64, &'static str) {
    if value >= 30.0 {
        (0.3, "VIX extreme (oversold)")
    } else if value >= 25.0 {
        (-0.4, "VIX high (panic)")
    } else if value >= 20.0 {
        (-0.2, "VIX elevated")
    } else if value < 12.0 {
        (-0.4, "VIX very low (complacency)")
    } else {
        (0.2, "VIX normal")
    }
}

/// Build the applicable signal set for one index. Order is stable:
/// momentum, flow, premium, macro.
fn signals_for(store: &SnapshotStore, index_code: &str) -> Vec<Signal> {
    let mut signals = vec![momentum_signal(store, index_code)];
    if let Some(direction) = flow_direction_for_index(index_code) {
        signals.push(flow_signal(store, direction));
    }
    if funds_for_index(index_code).next().is_some() {
        signals.push(premium_signal(store, index_code));
    }
    signals.push(macro_signal(store));
    signals
}

/// Forecast one index from its current snapshots. `None` when no signal
/// at all is computable (typically: no quote has ever been ingested).
pub fn predict_index(
    store: &SnapshotStore,
    index_code: &str,
    index_name: &str,
    now: DateTime<Utc>,
) -> Option<Prediction> {
    let quote = store.quotes.latest(index_code)?;
    let signals = signals_for(store, index_code);
    let composite = combine(&signals)?;

    let predicted = (composite.score * CALIBRATION_PCT * 100.0).round() / 100.0;
    let direction = direction_of(composite.score);
    let confidence = confidence_bucket(confidence_score(&composite));

    let factors: Vec<Factor> = signals.into_iter().filter_map(|s| s.factor).collect();

    let direction_word = match direction {
        Direction::Bullish => "bullish",
        Direction::Bearish => "bearish",
        Direction::Neutral => "sideways",
    };
    let mut summary = format!(
        "{index_name} next {HORIZON_HOURS}h: {direction_word}, projected move {predicted:+.2}%"
    );
    let labels: Vec<&str> = factors.iter().take(2).map(|f| f.label.as_str()).collect();
    if !labels.is_empty() {
        summary.push_str(&format!(". Key drivers: {}", labels.join(", ")));
    }

    Some(Prediction {
        index_code: index_code.to_string(),
        index_name: index_name.to_string(),
        current_price: quote.price,
        predicted_change_percent: predicted,
        confidence,
        direction,
        factors,
        summary,
        predicted_at: now,
        expires_at: now + Duration::hours(HORIZON_HOURS),
    })
}

/// Regenerate and publish predictions for every tracked index. Called once
/// per quotes cycle; each publish supersedes the previous forecast.
pub fn generate_predictions(store: &Arc<SnapshotStore>, now: DateTime<Utc>) -> usize {
    let mut published = 0;
    for idx in TRACKED_INDICES {
        if let Some(p) = predict_index(store, idx.code, idx.name, now) {
            tracing::info!(
                index = idx.code,
                predicted = p.predicted_change_percent,
                direction = ?p.direction,
                confidence = ?p.confidence,
                "prediction published"
            );
            store.predictions.publish(p);
            published += 1;
        }
    }
    metrics::counter!("predictions_published_total").increment(published as u64);
    published
}
