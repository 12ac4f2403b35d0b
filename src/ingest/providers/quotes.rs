//! Index quote adapter.
//!
//! Domestic and Hong Kong indices come from Sina's realtime endpoint as
//! GBK-encoded `var hq_str_<code>="..."` lines with fixed comma positions
//! (A-share and HK layouts differ). US indices come from the Yahoo chart
//! API. One upstream failing does not discard quotes already parsed from
//! the other in the same run.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, histogram};

use crate::error::FetchError;
use crate::ingest::providers::yahoo;
use crate::ingest::{lenient_f64, NormalizedBatch, SourceAdapter};
use crate::model::Quote;
use crate::universe::{QuoteSource, TrackedIndex, TRACKED_INDICES};

const SINA_QUOTE_URL: &str = "https://hq.sinajs.cn/list=";
const SINA_REFERER: &str = "https://finance.sina.com.cn/";

pub struct QuotesAdapter {
    mode: Mode,
}

enum Mode {
    Http { client: reqwest::Client },
    /// Test payloads keyed by "sina" or the Yahoo symbol.
    Fixture { bodies: HashMap<String, String> },
}

impl QuotesAdapter {
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

    async fn sina_body(&self, codes: &str) -> Result<String, FetchError> {
        match &self.mode {
            Mode::Fixture { bodies } => bodies
                .get("sina")
                .cloned()
                .ok_or_else(|| FetchError::UpstreamUnavailable("no sina fixture".into())),
            Mode::Http { client } => {
                let resp = client
                    .get(format!("{SINA_QUOTE_URL}{codes}"))
                    .header("Referer", SINA_REFERER)
                    .send()
                    .await?;
                let bytes = resp.bytes().await?;
                // Sina serves GBK regardless of Accept headers.
                Ok(encoding_rs::GBK.decode(&bytes).0.into_owned())
            }
        }
    }

    async fn yahoo_body(&self, symbol: &str) -> Result<String, FetchError> {
        match &self.mode {
            Mode::Fixture { bodies } => bodies
                .get(symbol)
                .cloned()
                .ok_or_else(|| FetchError::UpstreamUnavailable(format!("no fixture for {symbol}"))),
            Mode::Http { client } => {
                let resp = client
                    .get(yahoo::chart_url(symbol))
                    .query(&[("interval", "1d"), ("range", "1d")])
                    .send()
                    .await?;
                Ok(resp.text().await?)
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for QuotesAdapter {
    async fn fetch(&self) -> Result<NormalizedBatch, FetchError> {
        let t0 = std::time::Instant::now();
        let now = Utc::now();
        let mut quotes = Vec::new();

        let sina_codes: Vec<&str> = TRACKED_INDICES
            .iter()
            .filter_map(|i| match i.source {
                QuoteSource::Sina(code) => Some(code),
                QuoteSource::Yahoo(_) => None,
            })
            .collect();

        match self.sina_body(&sina_codes.join(",")).await {
            Ok(body) => {
                for idx in TRACKED_INDICES {
                    let QuoteSource::Sina(code) = idx.source else {
                        continue;
                    };
                    match extract_hq_line(&body, code).and_then(|line| parse_sina_line(idx, line, now)) {
                        Some(q) => quotes.push(q),
                        None => {
                            tracing::warn!(index = idx.code, sina = code, "sina line missing or unparsable");
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "sina quote fetch failed");
                counter!("adapter_fetch_errors_total").increment(1);
            }
        }

        for idx in TRACKED_INDICES {
            let QuoteSource::Yahoo(symbol) = idx.source else {
                continue;
            };
            let parsed = match self.yahoo_body(symbol).await {
                Ok(body) => yahoo::parse_chart(&body),
                Err(e) => Err(e),
            };
            match parsed {
                Ok(chart) => quotes.push(Quote {
                    index_code: idx.code.to_string(),
                    index_name: chart.name.unwrap_or_else(|| idx.name.to_string()),
                    price: chart.price,
                    change: chart.change.unwrap_or(0.0),
                    change_percent: chart.change_percent.unwrap_or(0.0),
                    open: None,
                    high: chart.high,
                    low: chart.low,
                    volume: chart.volume,
                    amount: None,
                    recorded_at: now,
                }),
                Err(e) => {
                    tracing::warn!(index = idx.code, error = %e, "yahoo quote failed");
                    counter!("adapter_fetch_errors_total").increment(1);
                }
            }
        }

        histogram!("adapter_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

        if quotes.is_empty() {
            return Err(FetchError::UpstreamUnavailable(
                "no index quotes from any upstream".into(),
            ));
        }
        Ok(NormalizedBatch::Quotes(quotes))
    }

    fn name(&self) -> &'static str {
        "quotes"
    }
}

/// Pull the quoted payload of `var hq_str_<code>="..."` out of the body.
fn extract_hq_line<'a>(body: &'a str, code: &str) -> Option<&'a str> {
    let marker = format!("hq_str_{code}=\"");
    let start = body.find(&marker)? + marker.len();
    let rest = &body[start..];
    let end = rest.find('"')?;
    let line = &rest[..end];
    if line.is_empty() {
        None
    } else {
        Some(line)
    }
}

fn field(parts: &[&str], i: usize) -> Option<f64> {
    parts.get(i).and_then(|s| lenient_f64(s))
}

fn parse_sina_line(
    idx: &TrackedIndex,
    line: &str,
    now: chrono::DateTime<Utc>,
) -> Option<Quote> {
    let parts: Vec<&str> = line.split(',').collect();
    let QuoteSource::Sina(code) = idx.source else {
        return None;
    };

    if code.starts_with("sh") || code.starts_with("sz") {
        // A-share layout: name,open,prev_close,current,high,low,bid,ask,volume,amount,...
        if parts.len() < 10 {
            return None;
        }
        let price = field(&parts, 3)?;
        let prev_close = field(&parts, 2);
        let (change, change_percent) = match prev_close {
            Some(p) if p > 0.0 => (price - p, (price - p) / p * 100.0),
            _ => (0.0, 0.0),
        };
        Some(Quote {
            index_code: idx.code.to_string(),
            index_name: nonempty(parts[0]).unwrap_or(idx.name).to_string(),
            price,
            change,
            change_percent: round2(change_percent),
            open: field(&parts, 1),
            high: field(&parts, 4),
            low: field(&parts, 5),
            volume: field(&parts, 8),
            amount: field(&parts, 9),
            recorded_at: now,
        })
    } else if code.starts_with("hk") {
        // HK layout: name,name_cn,open,prev_close,high,low,current,change,change_pct,...,volume at 11
        if parts.len() < 10 {
            return None;
        }
        let price = field(&parts, 6)?;
        Some(Quote {
            index_code: idx.code.to_string(),
            index_name: nonempty(parts[0]).unwrap_or(idx.name).to_string(),
            price,
            change: field(&parts, 7).unwrap_or(0.0),
            change_percent: field(&parts, 8).unwrap_or(0.0),
            open: field(&parts, 2),
            high: field(&parts, 4),
            low: field(&parts, 5),
            volume: field(&parts, 11),
            amount: None,
            recorded_at: now,
        })
    } else {
        None
    }
}

fn nonempty(s: &str) -> Option<&str> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t)
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
