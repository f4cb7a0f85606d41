use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info};

use sitestat_core::{
    config::Config,
    event::{Event, RequestRecord},
    geo::Classifier,
};
use sitestat_duckdb::DuckDbBackend;

/// Hits accepted by the ingest endpoint but not yet written to DuckDB.
#[derive(Debug, Default)]
pub struct PendingHits {
    pub events: Vec<Event>,
    pub requests: Vec<RequestRecord>,
}

impl PendingHits {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.requests.is_empty()
    }
}

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
pub struct AppState {
    /// The DuckDB backend. Internally uses `Arc<tokio::sync::Mutex<Connection>>`
    /// so it is already cheap to clone and async-safe.
    pub db: Arc<DuckDbBackend>,

    /// IPv4 range classifier, loaded once in `main` before the server binds.
    pub classifier: Arc<Classifier>,

    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,

    /// In-memory hit buffer.
    ///
    /// Lock, drain, release, then flush to DB. The lock is held only long
    /// enough to `std::mem::take` the buffer so the DB write does not block
    /// incoming ingest requests.
    pub buffer: Arc<Mutex<PendingHits>>,
}

impl AppState {
    pub fn new(db: DuckDbBackend, classifier: Classifier, config: Config) -> Self {
        Self {
            db: Arc::new(db),
            classifier: Arc::new(classifier),
            config: Arc::new(config),
            buffer: Arc::new(Mutex::new(PendingHits::default())),
        }
    }

    /// Append one classified event and its request record to the buffer.
    ///
    /// Reaching `config.buffer_max_size` buffered events triggers an
    /// immediate flush instead of waiting for the timer.
    pub async fn push_hit(&self, event: Event, request: RequestRecord) {
        let should_flush = {
            let mut buf = self.buffer.lock().await;
            buf.events.push(event);
            buf.requests.push(request);
            buf.len() >= self.config.buffer_max_size
        };

        if should_flush {
            self.flush_buffer().await;
        }
    }

    /// Drain the buffer and write all pending hits to DuckDB.
    pub async fn flush_buffer(&self) {
        let batch: PendingHits = {
            let mut buf = self.buffer.lock().await;
            std::mem::take(&mut *buf)
        };

        if batch.is_empty() {
            return;
        }

        match self.db.insert_hits(&batch.events, &batch.requests).await {
            Ok(()) => {
                info!(count = batch.len(), "Buffer flushed to DuckDB");
            }
            Err(e) => {
                error!(count = batch.len(), error = %e, "Buffer flush failed, hits lost");
            }
        }
    }

    /// Background loop: flush the buffer on a fixed interval.
    ///
    /// Spawned from `main.rs`; runs until the process exits.
    pub async fn run_buffer_flush_loop(self: Arc<Self>) {
        let interval = self.config.buffer_flush_interval();
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.flush_buffer().await;
        }
    }
}
