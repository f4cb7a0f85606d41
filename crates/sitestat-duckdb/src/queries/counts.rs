//! Scalar pre-pass counts. Visitor identity is `visitor_id` throughout.

use anyhow::Result;
use chrono::{DateTime, Utc};

use sitestat_core::event::PAGEVIEW;
use sitestat_core::stats::TimeWindow;

use crate::backend::format_timestamp;
use crate::queries::append_window_filter;
use crate::DuckDbBackend;

impl DuckDbBackend {
    pub async fn count_pageviews(&self, domain: &str, window: &TimeWindow) -> Result<i64> {
        self.count_in_window("COUNT(*)", domain, window).await
    }

    pub async fn count_visitors(&self, domain: &str, window: &TimeWindow) -> Result<i64> {
        self.count_in_window("COUNT(DISTINCT visitor_id)", domain, window)
            .await
    }

    pub async fn count_active_visitors(&self, domain: &str, since: DateTime<Utc>) -> Result<i64> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .prepare(
                "SELECT COUNT(DISTINCT visitor_id) FROM events \
                 WHERE domain = ?1 AND event_name = ?2 AND created_at > CAST(?3 AS TIMESTAMP)",
            )?
            .query_row(
                duckdb::params![domain, PAGEVIEW, format_timestamp(&since)],
                |row| row.get(0),
            )?;
        Ok(count)
    }

    async fn count_in_window(
        &self,
        aggregate: &str,
        domain: &str,
        window: &TimeWindow,
    ) -> Result<i64> {
        let mut filter_sql = String::new();
        let mut params: Vec<Box<dyn duckdb::types::ToSql + Send>> = vec![
            Box::new(domain.to_string()),
            Box::new(PAGEVIEW.to_string()),
        ];
        let mut param_idx = 3;
        append_window_filter(window, &mut filter_sql, &mut params, &mut param_idx);

        let sql = format!(
            "SELECT {aggregate} FROM events WHERE domain = ?1 AND event_name = ?2{filter_sql}"
        );

        let conn = self.conn.lock().await;
        let param_refs: Vec<&dyn duckdb::types::ToSql> = params.iter().map(|p| p.as_ref() as &dyn duckdb::types::ToSql).collect();
        let count: i64 = conn
            .prepare(&sql)?
            .query_row(param_refs.as_slice(), |row| row.get(0))?;
        Ok(count)
    }
}
