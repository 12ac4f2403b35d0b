//! Macro risk indicator adapter.
//!
//! VIX, the dollar index and treasury yields come from the Yahoo chart
//! API (treasury index quotes arrive x10 and are divided back; the
//! short-maturity bill symbol is already in percent). The fear/greed
//! proxy comes from the eastmoney push API with its x100 coded fields.
//! The yield-curve record is derived locally as `10y - 2y` with an
//! inversion flag. Sub-indicators fail independently.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, histogram};
use serde_json::Value;

use crate::error::FetchError;
use crate::ingest::providers::yahoo;
use crate::ingest::{strip_jsonp, NormalizedBatch, SourceAdapter};
use crate::model::{IndicatorKind, MacroIndicator};
use crate::universe::{eastmoney_fields, yahoo as yahoo_symbols};

const SENTIMENT_URL: &str = "https://push2.eastmoney.com/api/qt/stock/get";
const FEAR_GREED_KEY: &str = "fear_greed";

pub struct MacroAdapter {
    mode: Mode,
}

enum Mode {
    Http { client: reqwest::Client },
    /// Payloads keyed by Yahoo symbol or `fear_greed`.
    Fixture { bodies: HashMap<String, String> },
}

impl MacroAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http { client },
        }
    }

    pub fn from_fixtures(bodies: HashMap<String, String>) -> Self {
        Self {
            mode: Mode::Fixture { bodies },
        }
    }

    async fn chart_body(&self, symbol: &str) -> Result<String, FetchError> {
        match &self.mode {
            Mode::Fixture { bodies } => bodies
                .get(symbol)
                .cloned()
                .ok_or_else(|| FetchError::UpstreamUnavailable(format!("no fixture for {symbol}"))),
            Mode::Http { client } => {
                let resp = client
                    .get(yahoo::chart_url(symbol))
                    .query(&[("interval", "1d"), ("range", "5d")])
                    .send()
                    .await?;
                Ok(resp.text().await?)
            }
        }
    }

    async fn sentiment_body(&self) -> Result<String, FetchError> {
        match &self.mode {
            Mode::Fixture { bodies } => bodies
                .get(FEAR_GREED_KEY)
                .cloned()
                .ok_or_else(|| FetchError::UpstreamUnavailable("no fear_greed fixture".into())),
            Mode::Http { client } => {
                let resp = client
                    .get(SENTIMENT_URL)
                    .query(&[
                        ("secid", eastmoney_fields::SSE_SECID),
                        ("fields", eastmoney_fields::SENTIMENT_FIELDS),
                    ])
                    .send()
                    .await?;
                Ok(resp.text().await?)
            }
        }
    }

    async fn yahoo_indicator(
        &self,
        symbol: &str,
        kind: IndicatorKind,
        scale: f64,
    ) -> Result<MacroIndicator, FetchError> {
        let body = self.chart_body(symbol).await?;
        let chart = yahoo::parse_chart(&body)?;
        let value = chart.price / scale;
        let change = chart.change.unwrap_or(0.0) / scale;
        Ok(MacroIndicator {
            kind,
            value,
            change,
            change_percent: chart.change_percent.unwrap_or(0.0),
            classification: classify(kind, value),
            recorded_at: Utc::now(),
        })
    }
}

#[async_trait]
impl SourceAdapter for MacroAdapter {
    async fn fetch(&self) -> Result<NormalizedBatch, FetchError> {
        let t0 = std::time::Instant::now();
        let mut out = Vec::new();

        let fetches = [
            (yahoo_symbols::VIX, IndicatorKind::Vix, 1.0),
            (yahoo_symbols::DXY, IndicatorKind::Dxy, 1.0),
            // ^TNX quotes the 10y yield x10.
            (yahoo_symbols::TNX, IndicatorKind::Treasury10y, 10.0),
            (yahoo_symbols::IRX, IndicatorKind::Treasury2y, 1.0),
        ];
        for (symbol, kind, scale) in fetches {
            match self.yahoo_indicator(symbol, kind, scale).await {
                Ok(ind) => out.push(ind),
                Err(e) => {
                    tracing::warn!(indicator = kind.as_str(), error = %e, "indicator failed");
                    counter!("adapter_fetch_errors_total").increment(1);
                }
            }
        }

        if let Some(curve) = derive_yield_curve(&out) {
            out.push(curve);
        }

        match self.sentiment_body().await.and_then(|b| parse_fear_greed(&b)) {
            Ok(ind) => out.push(ind),
            Err(e) => {
                tracing::warn!(indicator = "fear_greed", error = %e, "indicator failed");
                counter!("adapter_fetch_errors_total").increment(1);
            }
        }

        histogram!("adapter_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        if out.is_empty() {
            return Err(FetchError::UpstreamUnavailable(
                "no macro indicator reachable".into(),
            ));
        }
        Ok(NormalizedBatch::Macro(out))
    }

    fn name(&self) -> &'static str {
        "macro"
    }
}

fn classify(kind: IndicatorKind, value: f64) -> String {
    match kind {
        IndicatorKind::Vix => {
            if value < 15.0 {
                "low"
            } else if value < 20.0 {
                "normal"
            } else if value < 30.0 {
                "elevated"
            } else {
                "high"
            }
        }
        IndicatorKind::Dxy => {
            if value > 105.0 {
                "strong"
            } else if value > 100.0 {
                "neutral"
            } else {
                "weak"
            }
        }
        IndicatorKind::Treasury10y | IndicatorKind::Treasury2y => "yield",
        IndicatorKind::YieldCurve => unreachable!("derived separately"),
        IndicatorKind::FearGreed => unreachable!("derived separately"),
    }
    .to_string()
}

fn derive_yield_curve(indicators: &[MacroIndicator]) -> Option<MacroIndicator> {
    let t10 = indicators.iter().find(|i| i.kind == IndicatorKind::Treasury10y)?;
    let t2 = indicators.iter().find(|i| i.kind == IndicatorKind::Treasury2y)?;
    let spread = t10.value - t2.value;
    Some(MacroIndicator {
        kind: IndicatorKind::YieldCurve,
        value: (spread * 1000.0).round() / 1000.0,
        change: t10.change - t2.change,
        change_percent: 0.0,
        classification: if spread < 0.0 { "inverted" } else { "normal" }.to_string(),
        recorded_at: Utc::now(),
    })
}

/// Market-sentiment proxy from the SSE composite day move. The coded
/// field `f170` arrives x100.
fn parse_fear_greed(body: &str) -> Result<MacroIndicator, FetchError> {
    let json: Value = serde_json::from_str(strip_jsonp(body))?;
    let data = json
        .get("data")
        .filter(|d| !d.is_null())
        .ok_or_else(|| FetchError::UpstreamMalformed("sentiment data missing".into()))?;
    let change_percent = data
        .get(eastmoney_fields::CHANGE_PERCENT)
        .and_then(Value::as_f64)
        .ok_or_else(|| FetchError::UpstreamMalformed("f170 missing".into()))?
        / 100.0;

    let (score, level) = if change_percent > 2.0 {
        (80.0, "extreme_greed")
    } else if change_percent > 1.0 {
        (65.0, "greed")
    } else if change_percent > 0.0 {
        (55.0, "neutral")
    } else if change_percent > -1.0 {
        (45.0, "neutral")
    } else if change_percent > -2.0 {
        (35.0, "fear")
    } else {
        (20.0, "extreme_fear")
    };

    Ok(MacroIndicator {
        kind: IndicatorKind::FearGreed,
        value: score,
        change: 0.0,
        change_percent: (change_percent * 100.0).round() / 100.0,
        classification: level.to_string(),
        recorded_at: Utc::now(),
    })
}
