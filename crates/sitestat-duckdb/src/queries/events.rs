use anyhow::Result;

use sitestat_core::event::Event;
use sitestat_core::stats::TimeWindow;
use sitestat_core::store::PageCursor;

use crate::backend::parse_timestamp;
use crate::queries::{append_cursor_filter, append_window_filter};
use crate::DuckDbBackend;

impl DuckDbBackend {
    /// One page of events for `domain` in `window`, ordered by
    /// `(created_at, id)` and strictly after `after`.
    pub async fn events_page(
        &self,
        domain: &str,
        window: &TimeWindow,
        after: Option<&PageCursor>,
        limit: usize,
    ) -> Result<Vec<Event>> {
        let mut filter_sql = String::new();
        let mut params: Vec<Box<dyn duckdb::types::ToSql + Send>> = vec![Box::new(domain.to_string())];
        let mut param_idx = 2;
        append_window_filter(window, &mut filter_sql, &mut params, &mut param_idx);
        append_cursor_filter(after, &mut filter_sql, &mut params, &mut param_idx);

        let sql = format!(
            r#"
            SELECT id, domain, event_name, CAST(created_at AS VARCHAR), visitor_id,
                   session_id, path, user_agent, referrer_url, referrer_domain,
                   country, query_params, event_data, status_code, duration_ms
            FROM events
            WHERE domain = ?1{filter_sql}
            ORDER BY created_at ASC, id ASC
            LIMIT ?{param_idx}
            "#
        );
        params.push(Box::new(limit as i64));

        let conn = self.conn.lock().await;
        let param_refs: Vec<&dyn duckdb::types::ToSql> = params.iter().map(|p| p.as_ref() as &dyn duckdb::types::ToSql).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            Ok((
                Event {
                    id: row.get(0)?,
                    domain: row.get(1)?,
                    event_name: row.get(2)?,
                    timestamp: Default::default(),
                    visitor_id: row.get(4)?,
                    session_id: row.get(5)?,
                    path: row.get(6)?,
                    user_agent: row.get(7)?,
                    referrer: row.get(8)?,
                    referrer_domain: row.get(9)?,
                    country: row.get(10)?,
                    query_params: row.get(11)?,
                    event_data: row.get(12)?,
                    status_code: row.get(13)?,
                    duration_ms: row.get(14)?,
                },
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (mut event, created_at) = row?;
            event.timestamp = parse_timestamp(&created_at)?;
            events.push(event);
        }
        Ok(events)
    }
}
