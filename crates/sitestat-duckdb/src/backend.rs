use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::Connection;
use tokio::sync::Mutex;
use tracing::info;

use sitestat_core::event::{Event, RequestRecord};

use crate::schema::{init_sql, TIMESTAMP_FORMAT};

/// A DuckDB backend for sitestat.
///
/// DuckDB is single-writer: concurrent reads are fine, but concurrent writes
/// cause contention. We wrap the connection in `Arc<Mutex<_>>` so the async
/// runtime serialises all writes through the buffer-flush task while still
/// allowing the struct to be shared across Axum handlers.
///
/// Memory and thread limits are enforced by [`init_sql`] at open time.
pub struct DuckDbBackend {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl DuckDbBackend {
    /// Open (or create) a DuckDB database file at `path`.
    ///
    /// `memory_limit` is a DuckDB size string such as `"1GB"` or `"512MB"`.
    pub fn open(path: &str, memory_limit: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(&init_sql(memory_limit))?;
        info!(
            "DuckDB opened at {} with memory_limit={}, threads=2",
            path, memory_limit
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an **in-memory** DuckDB database.
    ///
    /// Intended for tests only; data is discarded when the struct is
    /// dropped.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(&init_sql("1GB"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert a batch of classified events and their request records in a
    /// single transaction.
    ///
    /// Called by the buffer-flush background task. Returns immediately when
    /// both slices are empty.
    pub async fn insert_hits(&self, events: &[Event], requests: &[RequestRecord]) -> Result<()> {
        if events.is_empty() && requests.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().await;

        // One transaction for the whole batch: atomic, and one fsync instead of N.
        let tx = conn.transaction()?;

        for event in events {
            tx.execute(
                r#"INSERT INTO events (
                    id, domain, event_name, created_at, visitor_id, session_id,
                    path, user_agent, referrer_url, referrer_domain, country,
                    query_params, event_data, status_code, duration_ms
                ) VALUES (
                    ?1, ?2, ?3, CAST(?4 AS TIMESTAMP), ?5, ?6,
                    ?7, ?8, ?9, ?10, ?11,
                    ?12, ?13, ?14, ?15
                )"#,
                duckdb::params![
                    event.id,
                    event.domain,
                    event.event_name,
                    format_timestamp(&event.timestamp),
                    event.visitor_id,
                    event.session_id,
                    event.path,
                    event.user_agent,
                    event.referrer,
                    event.referrer_domain,
                    event.country,
                    event.query_params,
                    event.event_data,
                    event.status_code,
                    event.duration_ms,
                ],
            )?;
        }

        for request in requests {
            tx.execute(
                r#"INSERT INTO requests (
                    id, domain, created_at, path, user_agent,
                    primary_ip, secondary_ips, country, status_code, duration_ms
                ) VALUES (
                    ?1, ?2, CAST(?3 AS TIMESTAMP), ?4, ?5,
                    ?6, ?7, ?8, ?9, ?10
                )"#,
                duckdb::params![
                    request.id,
                    request.domain,
                    format_timestamp(&request.timestamp),
                    request.path,
                    request.user_agent,
                    request.primary_ip,
                    serde_json::to_string(&request.secondary_ips)?,
                    request.country,
                    request.status_code,
                    request.duration_ms,
                ],
            )?;
        }

        tx.commit()?;
        tracing::info!(
            events = events.len(),
            requests = requests.len(),
            "Inserted hits into DuckDB"
        );
        Ok(())
    }

    /// Execute `SELECT 1` as a lightweight liveness check.
    ///
    /// Called by the `/health` endpoint. Returns an error if the connection
    /// is unavailable (file locked, disk full, etc.).
    pub async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    /// Acquire the DuckDB connection lock for direct queries.
    ///
    /// Intended for integration tests that need to verify stored data.
    /// Production code should use the typed methods above.
    pub async fn conn_for_test(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse `CAST(ts AS VARCHAR)` output; the fraction is omitted when zero.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|t| t.and_utc())
        .with_context(|| format!("unexpected timestamp {raw:?}"))
}
