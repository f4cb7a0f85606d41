use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::warn;

use crate::error::LoadError;
use crate::geo::{loader, range_table::ip_to_int, RangeTable, UNKNOWN_COUNTRY};

/// Read-only country classifier over a loaded [`RangeTable`].
///
/// Constructed once at startup and shared behind `Arc`; cloning is cheap and
/// every clone reads the same table.
#[derive(Debug, Clone)]
pub struct Classifier {
    table: Arc<RangeTable>,
}

impl Classifier {
    pub fn new(table: RangeTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    /// Load the range list at `path`. A failure here means the classifier is
    /// not ready and the process should not start.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        Ok(Self::new(loader::load_path(path)?))
    }

    /// Country code for `ip`, or [`UNKNOWN_COUNTRY`] when the address does
    /// not parse as IPv4 or falls outside every range.
    pub fn lookup(&self, ip: &str) -> &str {
        lookup_in(&self.table, ip)
    }

    /// Classify every address in `ips`, preserving input order.
    ///
    /// Work is split into one contiguous chunk per worker and the call waits
    /// for all workers before returning. A worker that fails to complete
    /// leaves its slots at [`UNKNOWN_COUNTRY`].
    pub async fn lookup_batch(&self, ips: &[String]) -> Vec<String> {
        if ips.is_empty() {
            return Vec::new();
        }

        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .min(ips.len());
        let chunk_size = ips.len().div_ceil(workers);

        let mut answers = vec![UNKNOWN_COUNTRY.to_string(); ips.len()];
        let mut tasks = JoinSet::new();
        for (chunk_idx, chunk) in ips.chunks(chunk_size).enumerate() {
            let table = Arc::clone(&self.table);
            let chunk = chunk.to_vec();
            tasks.spawn_blocking(move || {
                let countries: Vec<String> = chunk
                    .iter()
                    .map(|ip| lookup_in(&table, ip).to_string())
                    .collect();
                (chunk_idx * chunk_size, countries)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((offset, countries)) => {
                    for (slot, country) in answers[offset..].iter_mut().zip(countries) {
                        *slot = country;
                    }
                }
                Err(e) => warn!(error = %e, "Batch lookup worker failed"),
            }
        }
        answers
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

fn lookup_in<'a>(table: &'a RangeTable, ip: &str) -> &'a str {
    ip_to_int(ip)
        .and_then(|n| table.lookup(n))
        .map(|range| range.country.as_str())
        .unwrap_or(UNKNOWN_COUNTRY)
}
