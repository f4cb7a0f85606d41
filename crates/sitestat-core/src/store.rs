//! Storage boundary consumed by the aggregation engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{Event, RequestRecord};
use crate::stats::TimeWindow;

/// Keyset position in a `(timestamp, id)`-ordered stream.
///
/// Rows strictly after this key are returned by the next page, so rows that
/// share a timestamp are never delivered twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub timestamp: DateTime<Utc>,
    pub id: String,
}

impl PageCursor {
    pub fn after_event(event: &Event) -> Self {
        Self {
            timestamp: event.timestamp,
            id: event.id.clone(),
        }
    }

    pub fn after_request(request: &RequestRecord) -> Self {
        Self {
            timestamp: request.timestamp,
            id: request.id.clone(),
        }
    }
}

/// Read side of the event/request store.
///
/// All counts use `visitor_id` as the visitor identity. Page readers must
/// return rows ordered ascending by `(timestamp, id)` and strictly after
/// `after` when it is set.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// Number of page-view events for `domain` in `window`.
    async fn count_pageviews(&self, domain: &str, window: &TimeWindow) -> anyhow::Result<i64>;

    /// Distinct visitors with at least one page view in `window`.
    async fn count_visitors(&self, domain: &str, window: &TimeWindow) -> anyhow::Result<i64>;

    /// Distinct visitors with a page view newer than `since`.
    async fn count_active_visitors(
        &self,
        domain: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<i64>;

    async fn events_page(
        &self,
        domain: &str,
        window: &TimeWindow,
        after: Option<&PageCursor>,
        limit: usize,
    ) -> anyhow::Result<Vec<Event>>;

    async fn requests_page(
        &self,
        domain: &str,
        window: &TimeWindow,
        after: Option<&PageCursor>,
        limit: usize,
    ) -> anyhow::Result<Vec<RequestRecord>>;

    /// Host of the earliest referrer ever recorded for `visitor_id`, across
    /// all time and all domains, skipping events whose referrer host is in
    /// `excluded_hosts`.
    async fn earliest_external_referrer(
        &self,
        visitor_id: &str,
        excluded_hosts: &[String],
    ) -> anyhow::Result<Option<String>>;
}
