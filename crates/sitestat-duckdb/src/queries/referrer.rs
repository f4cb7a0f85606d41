use anyhow::Result;

use crate::DuckDbBackend;

impl DuckDbBackend {
    /// Earliest non-excluded referrer host seen for `visitor_id`.
    ///
    /// Not restricted to a domain or time window: a visitor's first external
    /// touch may predate the window being aggregated.
    pub async fn earliest_external_referrer(
        &self,
        visitor_id: &str,
        excluded_hosts: &[String],
    ) -> Result<Option<String>> {
        let mut params: Vec<Box<dyn duckdb::types::ToSql + Send>> = vec![Box::new(visitor_id.to_string())];
        let mut exclusion_sql = String::new();
        if !excluded_hosts.is_empty() {
            let placeholders: Vec<String> = (0..excluded_hosts.len())
                .map(|i| format!("?{}", i + 2))
                .collect();
            exclusion_sql = format!(" AND referrer_domain NOT IN ({})", placeholders.join(", "));
            for host in excluded_hosts {
                params.push(Box::new(host.clone()));
            }
        }

        let sql = format!(
            r#"
            SELECT referrer_domain
            FROM events
            WHERE visitor_id = ?1
              AND referrer_domain IS NOT NULL
              AND referrer_domain != ''{exclusion_sql}
            ORDER BY created_at ASC, id ASC
            LIMIT 1
            "#
        );

        let conn = self.conn.lock().await;
        let param_refs: Vec<&dyn duckdb::types::ToSql> = params.iter().map(|p| p.as_ref() as &dyn duckdb::types::ToSql).collect();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(param_refs.as_slice())?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }
}
