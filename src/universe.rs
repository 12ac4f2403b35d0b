//! The monitored universe as typed constant tables: tracked indices with
//! their upstream symbols, QDII funds per index, and the coded numeric
//! field names used by the eastmoney push API. Keeping these as constants
//! (rather than runtime dictionaries) means an invalid symbol or field
//! access fails at the call site, not mid-scrape.

use crate::model::FlowDirection;

/// Which upstream publishes a given index quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteSource {
    /// Sina realtime quote, fixed-position comma line (`hq_str_*`).
    Sina(&'static str),
    /// Yahoo Finance chart API.
    Yahoo(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct TrackedIndex {
    pub code: &'static str,
    pub name: &'static str,
    pub source: QuoteSource,
}

pub const TRACKED_INDICES: &[TrackedIndex] = &[
    TrackedIndex {
        code: "csi300",
        name: "CSI 300",
        source: QuoteSource::Sina("sh000300"),
    },
    TrackedIndex {
        code: "star50",
        name: "STAR 50",
        source: QuoteSource::Sina("sh000688"),
    },
    TrackedIndex {
        code: "hsi",
        name: "Hang Seng Index",
        source: QuoteSource::Sina("hkHSI"),
    },
    TrackedIndex {
        code: "hstech",
        name: "Hang Seng Tech",
        source: QuoteSource::Sina("hkHSTECH"),
    },
    TrackedIndex {
        code: "sp500",
        name: "S&P 500",
        source: QuoteSource::Yahoo("^GSPC"),
    },
    TrackedIndex {
        code: "nasdaq100",
        name: "Nasdaq 100",
        source: QuoteSource::Yahoo("^NDX"),
    },
];

pub fn index_by_code(code: &str) -> Option<&'static TrackedIndex> {
    TRACKED_INDICES.iter().find(|i| i.code == code)
}

#[derive(Debug, Clone, Copy)]
pub struct TrackedFund {
    pub fund_code: &'static str,
    pub index_code: &'static str,
}

/// QDII ETFs whose premium we monitor, keyed to the index they track.
pub const TRACKED_FUNDS: &[TrackedFund] = &[
    // S&P 500
    TrackedFund { fund_code: "513500", index_code: "sp500" },
    TrackedFund { fund_code: "159612", index_code: "sp500" },
    TrackedFund { fund_code: "513650", index_code: "sp500" },
    TrackedFund { fund_code: "513850", index_code: "sp500" },
    // Nasdaq 100
    TrackedFund { fund_code: "513100", index_code: "nasdaq100" },
    TrackedFund { fund_code: "159941", index_code: "nasdaq100" },
    TrackedFund { fund_code: "513300", index_code: "nasdaq100" },
    TrackedFund { fund_code: "159632", index_code: "nasdaq100" },
    // Hang Seng Index
    TrackedFund { fund_code: "159920", index_code: "hsi" },
    TrackedFund { fund_code: "513660", index_code: "hsi" },
    TrackedFund { fund_code: "513030", index_code: "hsi" },
    // Hang Seng Tech
    TrackedFund { fund_code: "513180", index_code: "hstech" },
    TrackedFund { fund_code: "513130", index_code: "hstech" },
    TrackedFund { fund_code: "159740", index_code: "hstech" },
];

pub fn index_for_fund(fund_code: &str) -> Option<&'static str> {
    TRACKED_FUNDS
        .iter()
        .find(|f| f.fund_code == fund_code)
        .map(|f| f.index_code)
}

pub fn funds_for_index(index_code: &str) -> impl Iterator<Item = &'static TrackedFund> + '_ {
    TRACKED_FUNDS.iter().filter(move |f| f.index_code == index_code)
}

/// The index a flow alert targets: northbound money moves A-shares,
/// southbound money moves Hong Kong.
pub fn flow_target(direction: FlowDirection) -> &'static str {
    match direction {
        FlowDirection::North => "csi300",
        FlowDirection::South => "hsi",
    }
}

/// Whether the index trades on a cross-border connect channel at all
/// (US indices see neither north- nor southbound flow).
pub fn flow_direction_for_index(index_code: &str) -> Option<FlowDirection> {
    match index_code {
        "csi300" | "star50" => Some(FlowDirection::North),
        "hsi" | "hstech" => Some(FlowDirection::South),
        _ => None,
    }
}

/// Yahoo Finance symbols for the macro indicators.
pub mod yahoo {
    pub const VIX: &str = "^VIX";
    pub const DXY: &str = "DX-Y.NYB";
    /// 10-year treasury, quoted x10 by the upstream.
    pub const TNX: &str = "^TNX";
    /// Short-maturity bill rate, already quoted in percent.
    pub const IRX: &str = "^IRX";
}

/// Coded numeric fields of the eastmoney push API. Values under these keys
/// arrive scaled x100 and must be divided back.
pub mod eastmoney_fields {
    pub const LAST_PRICE: &str = "f43";
    pub const CHANGE_PERCENT: &str = "f170";
    pub const CHANGE: &str = "f169";
    /// The Shanghai Composite secid used for the market-sentiment proxy.
    pub const SSE_SECID: &str = "1.000001";
    /// Field list requested for the sentiment quote.
    pub const SENTIMENT_FIELDS: &str = "f43,f44,f45,f46,f47,f169,f170,f171";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fund_lookup_round_trips() {
        assert_eq!(index_for_fund("513500"), Some("sp500"));
        assert_eq!(index_for_fund("159920"), Some("hsi"));
        assert_eq!(index_for_fund("000001"), None);
        assert_eq!(funds_for_index("nasdaq100").count(), 4);
    }

    #[test]
    fn every_fund_references_a_tracked_index() {
        for f in TRACKED_FUNDS {
            assert!(
                index_by_code(f.index_code).is_some(),
                "{} points at unknown index {}",
                f.fund_code,
                f.index_code
            );
        }
    }
}
