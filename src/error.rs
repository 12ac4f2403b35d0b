//! Fetch-side error taxonomy.
//!
//! Adapter failures stay inside their own pipeline and cycle; there is no
//! retry within a cycle; the next scheduled run is the retry mechanism.
//! Staleness (a key missing N consecutive cycles) is a health warning, not
//! an error, and lives on `scheduler::JobHealth`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Network failure or timeout. The previous snapshot stays current.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// The whole payload could not be parsed. Single bad fields inside an
    /// otherwise valid payload are degraded field-by-field instead.
    #[error("upstream payload malformed: {0}")]
    UpstreamMalformed(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            FetchError::UpstreamUnavailable(e.to_string())
        } else if e.is_decode() {
            FetchError::UpstreamMalformed(e.to_string())
        } else {
            FetchError::UpstreamUnavailable(e.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::UpstreamMalformed(e.to_string())
    }
}
