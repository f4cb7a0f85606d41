//! Query window and the consolidated statistic returned to callers.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Years accepted for window bounds; both bounds must render as `YYYY-MM-DD`.
const MIN_YEAR: i32 = 1;
const MAX_YEAR: i32 = 9999;

/// Inclusive range of UTC calendar days. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl TimeWindow {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        for (field, date) in [("start", self.start), ("end", self.end)] {
            if let Some(date) = date.filter(|d| !(MIN_YEAR..=MAX_YEAR).contains(&d.year())) {
                return Err(QueryError::DateOutOfRange { field, date });
            }
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if end < start {
                return Err(QueryError::InvalidWindow { start, end });
            }
        }
        Ok(())
    }

    /// Inclusive lower bound: midnight at the start day.
    pub fn lower_bound(&self) -> Option<DateTime<Utc>> {
        self.start
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|t| t.and_utc())
    }

    /// Exclusive upper bound: midnight after the end day.
    pub fn upper_bound(&self) -> Option<DateTime<Utc>> {
        self.end
            .and_then(|d| d.succ_opt())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|t| t.and_utc())
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.lower_bound().map_or(true, |lo| ts >= lo)
            && self.upper_bound().map_or(true, |hi| ts < hi)
    }
}

/// One primary address with its hit count, ranked by [`Statistic::requests_per_ip`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestsPerIp {
    pub ip: String,
    /// Forwarded-for chain of the first request seen from `ip`.
    pub ips: Vec<String>,
    pub country: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistic {
    pub domain: String,
    pub start_time: Option<NaiveDate>,
    pub end_time: Option<NaiveDate>,
    pub current_visitors: i64,
    pub total_page_views: i64,
    pub total_visitors: i64,
    pub page_views_per_hour: BTreeMap<String, i64>,
    pub quick_syncs_per_hour: BTreeMap<String, i64>,
    pub visitors_per_country: BTreeMap<String, i64>,
    pub requests_per_ip: Vec<RequestsPerIp>,
    pub referrers: BTreeMap<String, i64>,
    pub visitors_per_utm_source: BTreeMap<String, i64>,
    pub revenue_per_utm_source: BTreeMap<String, f64>,
    pub revenue_per_referrer: BTreeMap<String, f64>,
}
