use std::time::Duration;

/// Events fetched per page during the streaming pass.
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    /// Path of the `start,end,country` range list loaded at startup.
    pub ip2country_path: String,
    pub duckdb_memory_limit: String,
    pub page_size: usize,
    pub stats_timeout_secs: u64,
    pub buffer_flush_interval_ms: u64,
    pub buffer_max_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let page_size: usize = std::env::var("SITESTAT_PAGE_SIZE")
            .unwrap_or_else(|_| DEFAULT_PAGE_SIZE.to_string())
            .parse()
            .map_err(|e| format!("invalid page size: {e}"))?;
        if page_size == 0 {
            return Err("SITESTAT_PAGE_SIZE must be greater than zero".to_string());
        }

        Ok(Self {
            port: std::env::var("SITESTAT_PORT")
                .unwrap_or_else(|_| "3100".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("SITESTAT_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            ip2country_path: std::env::var("SITESTAT_IP2COUNTRY_PATH")
                .unwrap_or_else(|_| "./dbip-country-lite.csv".to_string()),
            duckdb_memory_limit: std::env::var("SITESTAT_DUCKDB_MEMORY")
                .unwrap_or_else(|_| "1GB".to_string()),
            page_size,
            stats_timeout_secs: std::env::var("SITESTAT_STATS_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            buffer_flush_interval_ms: std::env::var("SITESTAT_BUFFER_FLUSH_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            buffer_max_size: std::env::var("SITESTAT_BUFFER_MAX")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
        })
    }

    pub fn buffer_flush_interval(&self) -> Duration {
        Duration::from_millis(self.buffer_flush_interval_ms)
    }

    pub fn stats_timeout(&self) -> Duration {
        Duration::from_secs(self.stats_timeout_secs)
    }
}
