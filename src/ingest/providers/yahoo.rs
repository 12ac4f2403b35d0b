//! Shared parsing for the Yahoo Finance chart API, used by the quotes and
//! macro adapters.

use serde::Deserialize;

use crate::error::FetchError;

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}
#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}
#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: Meta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Meta {
    short_name: Option<String>,
    regular_market_price: Option<f64>,
    previous_close: Option<f64>,
    chart_previous_close: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_volume: Option<f64>,
}

/// One chart quote with derived change fields. Change is only computable
/// when a previous close is published.
#[derive(Debug, Clone)]
pub(crate) struct ChartQuote {
    pub name: Option<String>,
    pub price: f64,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<f64>,
}

pub(crate) fn parse_chart(body: &str) -> Result<ChartQuote, FetchError> {
    let resp: ChartResponse = serde_json::from_str(body)?;
    let meta = resp
        .chart
        .result
        .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
        .map(|r| r.meta)
        .ok_or_else(|| FetchError::UpstreamMalformed("chart result missing".into()))?;

    let price = meta
        .regular_market_price
        .ok_or_else(|| FetchError::UpstreamMalformed("regularMarketPrice missing".into()))?;
    let prev = meta.previous_close.or(meta.chart_previous_close);
    let change = prev.filter(|p| *p > 0.0).map(|p| price - p);
    let change_percent = prev
        .filter(|p| *p > 0.0)
        .map(|p| (price - p) / p * 100.0);

    Ok(ChartQuote {
        name: meta.short_name,
        price,
        change,
        change_percent,
        high: meta.regular_market_day_high,
        low: meta.regular_market_day_low,
        volume: meta.regular_market_volume,
    })
}

pub(crate) fn chart_url(symbol: &str) -> String {
    format!("https://query1.finance.yahoo.com/v8/finance/chart/{symbol}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_change_from_previous_close() {
        let body = r#"{"chart":{"result":[{"meta":{
            "shortName":"S&P 500",
            "regularMarketPrice":5100.0,
            "previousClose":5000.0,
            "regularMarketDayHigh":5110.0,
            "regularMarketDayLow":5010.0,
            "regularMarketVolume":1000000
        }}]}}"#;
        let q = parse_chart(body).unwrap();
        assert!((q.price - 5100.0).abs() < 1e-9);
        assert!((q.change.unwrap() - 100.0).abs() < 1e-9);
        assert!((q.change_percent.unwrap() - 2.0).abs() < 1e-9);
        assert_eq!(q.name.as_deref(), Some("S&P 500"));
    }

    #[test]
    fn missing_previous_close_leaves_change_unavailable() {
        let body = r#"{"chart":{"result":[{"meta":{"regularMarketPrice":42.0}}]}}"#;
        let q = parse_chart(body).unwrap();
        assert_eq!(q.change, None);
        assert_eq!(q.change_percent, None);
    }

    #[test]
    fn empty_result_is_malformed() {
        let body = r#"{"chart":{"result":[]}}"#;
        assert!(matches!(
            parse_chart(body),
            Err(FetchError::UpstreamMalformed(_))
        ));
    }
}
