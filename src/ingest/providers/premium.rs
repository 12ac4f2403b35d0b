//! QDII premium adapter (jisilu).
//!
//! The upstream returns `{"rows":[{"id":..,"cell":{..}}]}`, sometimes
//! wrapped in a JSONP callback. Cells mix numbers, percent strings and
//! "-" placeholders. The premium is recomputed here from the market price
//! and the NAV rather than trusted from the feed; when the NAV is absent
//! or zero (unpublished on non-trading days) the premium stays
//! unavailable; defaulting it to 0 would fabricate a fair-value signal.

use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, histogram};
use serde_json::Value;

use crate::error::FetchError;
use crate::ingest::{lenient_f64, strip_jsonp, NormalizedBatch, SourceAdapter};
use crate::model::PremiumRecord;
use crate::universe::index_for_fund;

const QDII_LIST_URL: &str = "https://www.jisilu.cn/data/qdii/qdii_list/";
const QDII_REFERER: &str = "https://www.jisilu.cn/data/qdii/";

pub struct PremiumAdapter {
    mode: Mode,
}

enum Mode {
    Http { client: reqwest::Client },
    Fixture { body: String },
}

impl PremiumAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http { client },
        }
    }

    pub fn from_fixture(body: impl Into<String>) -> Self {
        Self {
            mode: Mode::Fixture { body: body.into() },
        }
    }

    async fn body(&self) -> Result<String, FetchError> {
        match &self.mode {
            Mode::Fixture { body } => Ok(body.clone()),
            Mode::Http { client } => {
                let ts = Utc::now().timestamp_millis();
                let resp = client
                    .get(QDII_LIST_URL)
                    .query(&[
                        ("___jsl", format!("LST___t={ts}")),
                        ("rp", "25".to_string()),
                        ("page", "1".to_string()),
                    ])
                    .header("Referer", QDII_REFERER)
                    .header("X-Requested-With", "XMLHttpRequest")
                    .send()
                    .await?;
                Ok(resp.text().await?)
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for PremiumAdapter {
    async fn fetch(&self) -> Result<NormalizedBatch, FetchError> {
        let t0 = std::time::Instant::now();
        let body = self.body().await?;
        let records = parse_qdii_list(&body)?;
        histogram!("adapter_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        Ok(NormalizedBatch::Premium(records))
    }

    fn name(&self) -> &'static str {
        "premium"
    }
}

fn parse_qdii_list(body: &str) -> Result<Vec<PremiumRecord>, FetchError> {
    let json: Value = serde_json::from_str(strip_jsonp(body))?;
    let rows = json
        .get("rows")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::UpstreamMalformed("rows field missing".into()))?;

    let now = Utc::now();
    let mut out = Vec::new();
    for row in rows {
        let Some(cell) = row.get("cell") else {
            continue;
        };
        let Some(fund_code) = cell.get("fund_id").and_then(Value::as_str) else {
            continue;
        };
        // Only the monitored universe.
        let Some(index_code) = index_for_fund(fund_code) else {
            continue;
        };

        let price = cell_f64(cell, "price");
        let mut nav = cell_f64(cell, "nav");
        // Prefer the intraday NAV estimate when the upstream publishes one.
        if let Some(est) = cell_f64(cell, "estimate_nav").filter(|v| *v > 0.0) {
            nav = Some(est);
        }

        out.push(PremiumRecord {
            fund_code: fund_code.to_string(),
            fund_name: cell
                .get("fund_nm")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            index_code: index_code.to_string(),
            price,
            nav,
            nav_date: cell
                .get("nav_dt")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            premium_rate: PremiumRecord::compute_premium(price, nav),
            volume: cell_f64(cell, "volume"),
            increase_percent: cell_f64(cell, "increase_rt"),
            recorded_at: now,
        });
    }

    if out.is_empty() {
        counter!("adapter_fetch_errors_total").increment(1);
        tracing::warn!("qdii list carried no tracked funds");
    }
    Ok(out)
}

/// Numeric cell access tolerant of the upstream's mixed types: numbers,
/// percent strings, "-". Anything non-numeric is unavailable, not 0.
fn cell_f64(cell: &Value, key: &str) -> Option<f64> {
    match cell.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => lenient_f64(s),
        _ => None,
    }
}

// Fixture helpers shared with the integration tests.
#[doc(hidden)]
pub fn fixture_row(fund_code: &str, name: &str, price: &str, nav: &str, nav_dt: &str) -> String {
    format!(
        r#"{{"id":"{fund_code}","cell":{{"fund_id":"{fund_code}","fund_nm":"{name}","price":"{price}","nav":"{nav}","nav_dt":"{nav_dt}","volume":"12345.6","increase_rt":"0.55%"}}}}"#
    )
}

#[doc(hidden)]
pub fn fixture_body(rows: &[String]) -> String {
    format!(r#"{{"page":1,"rows":[{}]}}"#, rows.join(","))
}
