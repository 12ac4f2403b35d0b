//! # Event deriver
//! Pure `(previous, new, thresholds) -> Vec<Event>` functions, one per
//! domain, evaluated once per adapter cycle per key. Deterministic: the
//! same `(previous, new)` pair always yields the same event set, so a
//! scheduler retry can replay a derivation and rely on the log's dedup
//! key to swallow the duplicates.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::model::{Event, EventType, FlowRecord, Impact, PremiumRecord, Quote};
use crate::universe::flow_target;

/// Alert bands and magnitude thresholds. Deserializable so operators can
/// tune them in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Premium band upper edge, percent. Above: overpriced alert.
    pub premium_high: f64,
    /// Premium band lower edge, percent (negative). Below: discount alert.
    pub premium_low: f64,
    /// Net flow magnitude, 100M CNY. Swings beyond this alert.
    pub flow_total: f64,
    /// Index day move magnitude, percent.
    pub index_move_percent: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            premium_high: 1.5,
            premium_low: -1.0,
            flow_total: 50.0,
            index_move_percent: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PremiumBand {
    High,
    Low,
}

impl PremiumBand {
    fn of(rate: f64, th: &AlertThresholds) -> Option<Self> {
        if rate >= th.premium_high {
            Some(PremiumBand::High)
        } else if rate <= th.premium_low {
            Some(PremiumBand::Low)
        } else {
            None
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            PremiumBand::High => "high",
            PremiumBand::Low => "low",
        }
    }
}

/// Importance bucket for a premium magnitude: 5 beyond 3%, stepping down.
fn premium_importance(rate_abs: f64) -> u8 {
    if rate_abs >= 3.0 {
        5
    } else if rate_abs >= 2.25 {
        4
    } else {
        3
    }
}

fn flow_importance(total_abs: f64) -> u8 {
    if total_abs >= 150.0 {
        5
    } else if total_abs >= 80.0 {
        4
    } else {
        3
    }
}

fn index_move_importance(change_abs: f64) -> u8 {
    if change_abs >= 5.0 {
        5
    } else if change_abs >= 3.0 {
        4
    } else {
        3
    }
}

fn build_event(
    event_type: EventType,
    target_index: &str,
    title: String,
    summary: String,
    impact: Impact,
    importance: u8,
    snapshot: serde_json::Value,
    value_bucket: String,
    now: DateTime<Utc>,
) -> Event {
    let dedup_key = format!("{}:{}:{}", event_type.as_str(), target_index, value_bucket);
    Event {
        id: Uuid::new_v4(),
        event_type,
        target_index: target_index.to_string(),
        title,
        summary,
        impact,
        importance,
        source_url: None,
        data_snapshot: snapshot,
        dedup_key,
        created_at: now,
    }
}

/// Premium alert: fires when the new rate is inside an alert band the
/// previous snapshot had not reached. An unavailable premium never alerts.
pub fn premium_events(
    prev: Option<&PremiumRecord>,
    new: &PremiumRecord,
    th: &AlertThresholds,
    now: DateTime<Utc>,
) -> Vec<Event> {
    let Some(rate) = new.premium_rate else {
        return Vec::new();
    };
    let Some(band) = PremiumBand::of(rate, th) else {
        return Vec::new();
    };
    let prev_band = prev
        .and_then(|p| p.premium_rate)
        .and_then(|r| PremiumBand::of(r, th));
    if prev_band == Some(band) {
        // Plateaued inside the band; the initial crossing already alerted.
        return Vec::new();
    }

    let importance = premium_importance(rate.abs());
    // Impact follows the sign of the rate itself.
    let (impact, title, summary) = match band {
        PremiumBand::High => (
            Impact::Positive,
            format!("[{}] premium alert {:+.2}%", new.fund_name, rate),
            format!(
                "{} trades {:.2}% above NAV; elevated pullback risk",
                new.fund_code, rate
            ),
        ),
        PremiumBand::Low => (
            Impact::Negative,
            format!("[{}] discount alert {:+.2}%", new.fund_name, rate),
            format!(
                "{} trades {:.2}% below NAV; possible entry opportunity",
                new.fund_code,
                rate.abs()
            ),
        ),
    };

    vec![build_event(
        EventType::PremiumAlert,
        &new.index_code,
        title,
        summary,
        impact,
        importance,
        serde_json::to_value(new).unwrap_or(serde_json::Value::Null),
        format!("{}:{}:{}", new.fund_code, band.as_str(), importance),
        now,
    )]
}

/// Fund-flow alert: fires on a single-step swing in `total` beyond the
/// threshold, or on a first observation already beyond it.
pub fn flow_events(
    prev: Option<&FlowRecord>,
    new: &FlowRecord,
    th: &AlertThresholds,
    now: DateTime<Utc>,
) -> Vec<Event> {
    let magnitude = match prev {
        Some(p) => (new.total - p.total).abs(),
        None => new.total.abs(),
    };
    if magnitude < th.flow_total {
        return Vec::new();
    }

    // Impact and wording both key off the net total itself, so a swing
    // down to a still-positive total reads as an inflow, not a sell-off.
    let impact = if new.total > 0.0 {
        Impact::Positive
    } else {
        Impact::Negative
    };
    let direction_word = if new.total > 0.0 { "inflow" } else { "outflow" };
    let side = match new.flow_type {
        crate::model::FlowDirection::North => "Northbound",
        crate::model::FlowDirection::South => "Southbound",
    };
    let importance = flow_importance(new.total.abs());
    let target = flow_target(new.flow_type);

    vec![build_event(
        EventType::FundFlow,
        target,
        format!("{} heavy {} {:.2} x100M", side, direction_word, new.total.abs()),
        format!(
            "SH connect {:+.2}, SZ connect {:+.2}, total {:+.2} x100M CNY",
            new.sh_connect, new.sz_connect, new.total
        ),
        impact,
        importance,
        serde_json::to_value(new).unwrap_or(serde_json::Value::Null),
        format!("{}:{}:{}", new.flow_type.as_str(), direction_word, importance),
        now,
    )]
}

/// Index-move alert: fires when `|change_percent|` reaches the threshold
/// having been below it in the previous snapshot.
pub fn index_events(
    prev: Option<&Quote>,
    new: &Quote,
    th: &AlertThresholds,
    now: DateTime<Utc>,
) -> Vec<Event> {
    let change = new.change_percent;
    if change.abs() < th.index_move_percent {
        return Vec::new();
    }
    if prev.is_some_and(|p| p.change_percent.abs() >= th.index_move_percent) {
        return Vec::new();
    }

    let rising = change > 0.0;
    let impact = if rising { Impact::Positive } else { Impact::Negative };
    let direction_word = if rising { "up" } else { "down" };
    let importance = index_move_importance(change.abs());

    vec![build_event(
        EventType::IndexMove,
        &new.index_code,
        format!("[{}] {} {:.2}%", new.index_name, direction_word, change.abs()),
        format!("at {:.2}, day change {:+.2}", new.price, new.change),
        impact,
        importance,
        serde_json::to_value(new).unwrap_or(serde_json::Value::Null),
        format!("{}:{}", direction_word, importance),
        now,
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FlowDirection;

    fn premium(code: &str, rate: Option<f64>) -> PremiumRecord {
        PremiumRecord {
            fund_code: code.into(),
            fund_name: format!("Fund {code}"),
            index_code: "sp500".into(),
            price: Some(1.0),
            nav: Some(1.0),
            nav_date: Some("2026-08-26".into()),
            premium_rate: rate,
            volume: None,
            increase_percent: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn premium_crossing_fires_once_with_impact_matching_rate_sign() {
        let th = AlertThresholds::default();
        let now = Utc::now();

        // 0.8% -> 1.8% crosses the +1.5% band: one positive-impact alert.
        let prev = premium("513500", Some(0.8));
        let new = premium("513500", Some(1.8));
        let evs = premium_events(Some(&prev), &new, &th, now);
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0].event_type, EventType::PremiumAlert);
        assert_eq!(evs[0].impact, Impact::Positive);
        assert_eq!(evs[0].importance, 3);

        let discount = premium("513500", Some(-1.4));
        let evs = premium_events(Some(&prev), &discount, &th, now);
        assert_eq!(evs[0].impact, Impact::Negative);
    }

    #[test]
    fn plateau_inside_band_does_not_refire() {
        let th = AlertThresholds::default();
        let now = Utc::now();
        let prev = premium("513500", Some(1.8));
        let new = premium("513500", Some(1.8));
        assert!(premium_events(Some(&prev), &new, &th, now).is_empty());
    }

    #[test]
    fn unavailable_premium_never_alerts() {
        let th = AlertThresholds::default();
        let new = premium("513500", None);
        assert!(premium_events(None, &new, &th, Utc::now()).is_empty());
    }

    #[test]
    fn derivation_is_idempotent() {
        let th = AlertThresholds::default();
        let now = Utc::now();
        let prev = premium("513100", Some(0.2));
        let new = premium("513100", Some(3.4));

        let a = premium_events(Some(&prev), &new, &th, now);
        let b = premium_events(Some(&prev), &new, &th, now);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.dedup_key, y.dedup_key);
            assert_eq!(x.title, y.title);
            assert_eq!(x.impact, y.impact);
            assert_eq!(x.importance, y.importance);
        }
        assert_eq!(a[0].importance, 5); // |3.4| beyond the 3% bucket
    }

    fn flow(total: f64) -> FlowRecord {
        FlowRecord {
            flow_type: FlowDirection::North,
            sh_connect: total / 2.0,
            sz_connect: total / 2.0,
            total,
            update_time: "14:30".into(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn flow_swing_crosses_threshold() {
        let th = AlertThresholds::default();
        let now = Utc::now();
        let evs = flow_events(Some(&flow(10.0)), &flow(85.0), &th, now);
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0].target_index, "csi300");
        assert_eq!(evs[0].impact, Impact::Positive);
        assert_eq!(evs[0].importance, 4);

        // A small step stays quiet even at a high absolute level.
        assert!(flow_events(Some(&flow(85.0)), &flow(95.0), &th, now).is_empty());
    }

    #[test]
    fn flow_impact_follows_the_net_total_not_the_step() {
        let th = AlertThresholds::default();
        let now = Utc::now();

        // A -70 swing down to a still-positive total: the alert fires on
        // the swing but reads as an inflow with positive impact.
        let evs = flow_events(Some(&flow(100.0)), &flow(30.0), &th, now);
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0].impact, Impact::Positive);
        assert!(evs[0].title.contains("inflow"));

        // Swinging into net selling flips both.
        let evs = flow_events(Some(&flow(20.0)), &flow(-60.0), &th, now);
        assert_eq!(evs[0].impact, Impact::Negative);
        assert!(evs[0].title.contains("outflow"));
    }

    fn quote(change_percent: f64) -> Quote {
        Quote {
            index_code: "hsi".into(),
            index_name: "Hang Seng Index".into(),
            price: 18000.0,
            change: change_percent * 180.0,
            change_percent,
            open: None,
            high: None,
            low: None,
            volume: None,
            amount: None,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn index_move_fires_on_first_breach_only() {
        let th = AlertThresholds::default();
        let now = Utc::now();
        let evs = index_events(Some(&quote(0.4)), &quote(-2.6), &th, now);
        assert_eq!(evs.len(), 1);
        assert_eq!(evs[0].impact, Impact::Negative);
        assert_eq!(evs[0].importance, 3);

        assert!(index_events(Some(&quote(-2.6)), &quote(-2.8), &th, now).is_empty());
        let big = index_events(None, &quote(5.5), &th, now);
        assert_eq!(big[0].importance, 5);
    }
}
