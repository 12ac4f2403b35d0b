//! Cross-border flow adapter (eastmoney stock-connect).
//!
//! The rtmin endpoints return minute rows as comma-joined strings
//! (`"time,sh,sz,total,..."`) under `data.s2n` (northbound) and
//! `data.n2s` (southbound), with values in units of 10k CNY. The latest
//! fully-numeric row wins; values are scaled to 100M CNY. A malformed
//! tail row falls back to the row before it instead of reading as zeros.

use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, histogram};
use serde_json::Value;

use crate::error::FetchError;
use crate::ingest::{lenient_f64, strip_jsonp, NormalizedBatch, SourceAdapter};
use crate::model::{FlowDirection, FlowRecord};

const NORTH_URL: &str = "https://push2.eastmoney.com/api/qt/kamt.rtmin/get";
const SOUTH_URL: &str = "https://push2.eastmoney.com/api/qt/kamtbs.rtmin/get";
const FLOW_REFERER: &str = "https://data.eastmoney.com/";

/// Upstream unit is 10k CNY; records carry 100M CNY.
const SCALE: f64 = 10_000.0;

pub struct FlowAdapter {
    mode: Mode,
}

enum Mode {
    Http { client: reqwest::Client },
    /// Payloads keyed by "north" / "south".
    Fixture {
        north: Option<String>,
        south: Option<String>,
    },
}

impl FlowAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            mode: Mode::Http { client },
        }
    }

    pub fn from_fixtures(north: Option<String>, south: Option<String>) -> Self {
        Self {
            mode: Mode::Fixture { north, south },
        }
    }

    async fn body(&self, direction: FlowDirection) -> Result<String, FetchError> {
        match &self.mode {
            Mode::Fixture { north, south } => {
                let body = match direction {
                    FlowDirection::North => north,
                    FlowDirection::South => south,
                };
                body.clone()
                    .ok_or_else(|| FetchError::UpstreamUnavailable("no flow fixture".into()))
            }
            Mode::Http { client } => {
                let url = match direction {
                    FlowDirection::North => NORTH_URL,
                    FlowDirection::South => SOUTH_URL,
                };
                let ts = Utc::now().timestamp_millis().to_string();
                let resp = client
                    .get(url)
                    .query(&[
                        ("fields1", "f1,f2,f3,f4"),
                        (
                            "fields2",
                            "f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61,f62,f63,f64,f65,f66",
                        ),
                        ("ut", "b2884a393a59ad64002292a3e90d46a5"),
                        ("cb", ""),
                        ("_", ts.as_str()),
                    ])
                    .header("Referer", FLOW_REFERER)
                    .send()
                    .await?;
                Ok(resp.text().await?)
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for FlowAdapter {
    async fn fetch(&self) -> Result<NormalizedBatch, FetchError> {
        let t0 = std::time::Instant::now();
        let mut records = Vec::new();
        let mut first_err: Option<FetchError> = None;

        for direction in [FlowDirection::North, FlowDirection::South] {
            let parsed = match self.body(direction).await {
                Ok(body) => parse_flow(&body, direction),
                Err(e) => Err(e),
            };
            match parsed {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(direction = direction.as_str(), error = %e, "flow side failed");
                    counter!("adapter_fetch_errors_total").increment(1);
                    first_err.get_or_insert(e);
                }
            }
        }

        histogram!("adapter_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        if records.is_empty() {
            return Err(first_err
                .unwrap_or_else(|| FetchError::UpstreamUnavailable("both flow sides empty".into())));
        }
        Ok(NormalizedBatch::Flow(records))
    }

    fn name(&self) -> &'static str {
        "flow"
    }
}

fn parse_flow(body: &str, direction: FlowDirection) -> Result<FlowRecord, FetchError> {
    let json: Value = serde_json::from_str(strip_jsonp(body))?;
    let rows_key = match direction {
        FlowDirection::North => "s2n",
        FlowDirection::South => "n2s",
    };
    let rows = json
        .get("data")
        .and_then(|d| d.get(rows_key))
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::UpstreamMalformed(format!("{rows_key} missing")))?;

    // Walk back from the newest minute to the last fully-numeric row.
    for row in rows.iter().rev() {
        let Some(line) = row.as_str() else { continue };
        let parts: Vec<&str> = line.split(',').collect();
        if parts.len() < 4 {
            continue;
        }
        let (Some(sh), Some(sz), Some(total)) = (
            lenient_f64(parts[1]),
            lenient_f64(parts[2]),
            lenient_f64(parts[3]),
        ) else {
            continue;
        };
        return Ok(FlowRecord {
            flow_type: direction,
            sh_connect: sh / SCALE,
            sz_connect: sz / SCALE,
            total: total / SCALE,
            update_time: parts[0].to_string(),
            recorded_at: Utc::now(),
        });
    }

    Err(FetchError::UpstreamMalformed(format!(
        "{rows_key} carried no numeric rows"
    )))
}
