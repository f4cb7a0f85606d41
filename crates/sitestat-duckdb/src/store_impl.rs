use async_trait::async_trait;
use chrono::{DateTime, Utc};

use sitestat_core::event::{Event, RequestRecord};
use sitestat_core::stats::TimeWindow;
use sitestat_core::store::{EventStore, PageCursor};

use crate::DuckDbBackend;

#[async_trait]
impl EventStore for DuckDbBackend {
    async fn count_pageviews(&self, domain: &str, window: &TimeWindow) -> anyhow::Result<i64> {
        DuckDbBackend::count_pageviews(self, domain, window).await
    }

    async fn count_visitors(&self, domain: &str, window: &TimeWindow) -> anyhow::Result<i64> {
        DuckDbBackend::count_visitors(self, domain, window).await
    }

    async fn count_active_visitors(
        &self,
        domain: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        DuckDbBackend::count_active_visitors(self, domain, since).await
    }

    async fn events_page(
        &self,
        domain: &str,
        window: &TimeWindow,
        after: Option<&PageCursor>,
        limit: usize,
    ) -> anyhow::Result<Vec<Event>> {
        DuckDbBackend::events_page(self, domain, window, after, limit).await
    }

    async fn requests_page(
        &self,
        domain: &str,
        window: &TimeWindow,
        after: Option<&PageCursor>,
        limit: usize,
    ) -> anyhow::Result<Vec<RequestRecord>> {
        DuckDbBackend::requests_page(self, domain, window, after, limit).await
    }

    async fn earliest_external_referrer(
        &self,
        visitor_id: &str,
        excluded_hosts: &[String],
    ) -> anyhow::Result<Option<String>> {
        DuckDbBackend::earliest_external_referrer(self, visitor_id, excluded_hosts).await
    }
}
