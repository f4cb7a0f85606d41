use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure to build the IP range table. Fatal to classifier readiness.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open range list {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read range list: {0}")]
    Read(#[from] csv::Error),
}

/// Failure of a single aggregation call. Partial statistics are never
/// returned alongside one of these.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("start date {start} must be on or before end date {end}")]
    InvalidWindow { start: NaiveDate, end: NaiveDate },

    #[error("{field} date {date} is outside the supported range")]
    DateOutOfRange { field: &'static str, date: NaiveDate },

    #[error("event stream went backwards at {0}")]
    OutOfOrder(DateTime<Utc>),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}
