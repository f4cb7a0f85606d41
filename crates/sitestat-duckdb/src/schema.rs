/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`.
/// All statements use `IF NOT EXISTS` so they are safe to re-run on every
/// startup.
///
/// `memory_limit` comes from `Config.duckdb_memory_limit`
/// (env `SITESTAT_DUCKDB_MEMORY`, default `"1GB"`). Always set an explicit
/// limit: the DuckDB default (80% of system RAM) is not acceptable for a
/// server process.
///
/// Both tables are read in `(domain, created_at, id)` order by the keyset
/// readers, so each carries an index with exactly that prefix.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- EVENTS (semantic occurrences: pageview, quicksync, ...)
-- ===========================================
CREATE TABLE IF NOT EXISTS events (
    id              VARCHAR PRIMARY KEY,           -- UUID v4
    domain          VARCHAR NOT NULL,              -- lower-cased site domain
    event_name      VARCHAR NOT NULL,
    created_at      TIMESTAMP NOT NULL,
    visitor_id      VARCHAR NOT NULL,              -- client id or sha256(ip + ua)[0:16]
    session_id      VARCHAR,
    path            VARCHAR NOT NULL,
    user_agent      VARCHAR,
    referrer_url    VARCHAR,
    referrer_domain VARCHAR,                       -- lower-cased host of referrer_url
    country         VARCHAR(2) NOT NULL,           -- ISO 3166-1 alpha-2, 'ZZ' when unknown
    query_params    VARCHAR,                       -- JSON object string
    event_data      VARCHAR,                       -- JSON string
    status_code     SMALLINT NOT NULL,
    duration_ms     BIGINT
);

-- Keyset pagination and window counts
CREATE INDEX IF NOT EXISTS idx_events_domain_time
    ON events(domain, created_at, id);

-- Page-view counts and active visitors
CREATE INDEX IF NOT EXISTS idx_events_domain_name_time
    ON events(domain, event_name, created_at);

-- Earliest-referrer point query
CREATE INDEX IF NOT EXISTS idx_events_visitor_time
    ON events(visitor_id, created_at, id);

-- ===========================================
-- REQUESTS (network-layer facts per HTTP request)
-- ===========================================
CREATE TABLE IF NOT EXISTS requests (
    id              VARCHAR PRIMARY KEY,
    domain          VARCHAR NOT NULL,
    created_at      TIMESTAMP NOT NULL,
    path            VARCHAR NOT NULL,
    user_agent      VARCHAR,
    primary_ip      VARCHAR NOT NULL,
    secondary_ips   VARCHAR NOT NULL DEFAULT '[]', -- JSON array of forwarded-for entries
    country         VARCHAR(2) NOT NULL,
    status_code     SMALLINT NOT NULL,
    duration_ms     BIGINT
);

CREATE INDEX IF NOT EXISTS idx_requests_domain_time
    ON requests(domain, created_at, id);
"#
    )
}

/// Timestamp layout used for every TIMESTAMP bind parameter.
///
/// DuckDB stores microseconds, so six fractional digits round-trip exactly.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
