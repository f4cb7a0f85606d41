use anyhow::Result;
use tracing::debug;

use sitestat_core::event::RequestRecord;
use sitestat_core::stats::TimeWindow;
use sitestat_core::store::PageCursor;

use crate::backend::parse_timestamp;
use crate::queries::{append_cursor_filter, append_window_filter};
use crate::DuckDbBackend;

struct RequestRow {
    id: String,
    domain: String,
    created_at: String,
    path: String,
    user_agent: Option<String>,
    primary_ip: String,
    secondary_ips: String,
    country: String,
    status_code: i16,
    duration_ms: Option<i64>,
}

impl DuckDbBackend {
    /// One page of request records, same ordering contract as `events_page`.
    pub async fn requests_page(
        &self,
        domain: &str,
        window: &TimeWindow,
        after: Option<&PageCursor>,
        limit: usize,
    ) -> Result<Vec<RequestRecord>> {
        let mut filter_sql = String::new();
        let mut params: Vec<Box<dyn duckdb::types::ToSql + Send>> = vec![Box::new(domain.to_string())];
        let mut param_idx = 2;
        append_window_filter(window, &mut filter_sql, &mut params, &mut param_idx);
        append_cursor_filter(after, &mut filter_sql, &mut params, &mut param_idx);

        let sql = format!(
            r#"
            SELECT id, domain, CAST(created_at AS VARCHAR), path, user_agent,
                   primary_ip, secondary_ips, country, status_code, duration_ms
            FROM requests
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
            Ok(RequestRow {
                id: row.get(0)?,
                domain: row.get(1)?,
                created_at: row.get(2)?,
                path: row.get(3)?,
                user_agent: row.get(4)?,
                primary_ip: row.get(5)?,
                secondary_ips: row.get(6)?,
                country: row.get(7)?,
                status_code: row.get(8)?,
                duration_ms: row.get(9)?,
            })
        })?;

        let mut requests = Vec::new();
        for row in rows {
            let row = row?;
            // The primary address is what the grouping keys on, so a malformed
            // chain degrades to an empty one.
            let secondary_ips = match serde_json::from_str::<Vec<String>>(&row.secondary_ips) {
                Ok(ips) => ips,
                Err(e) => {
                    debug!(request_id = %row.id, error = %e, "Skipping malformed secondary_ips");
                    Vec::new()
                }
            };
            requests.push(RequestRecord {
                timestamp: parse_timestamp(&row.created_at)?,
                secondary_ips,
                id: row.id,
                domain: row.domain,
                path: row.path,
                user_agent: row.user_agent,
                primary_ip: row.primary_ip,
                country: row.country,
                status_code: row.status_code,
                duration_ms: row.duration_ms,
            });
        }
        Ok(requests)
    }
}
