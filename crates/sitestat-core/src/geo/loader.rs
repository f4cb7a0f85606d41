//! Range-list parsing.
//!
//! The source is line oriented, three optionally quoted fields per line:
//!
//! ```text
//! "1.0.0.0","1.0.0.255","AU"
//! ```
//!
//! Rows that cannot be used (IPv6 ranges, wrong field count, inverted
//! bounds) are skipped one at a time. Only an unreadable source fails the
//! whole load.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{debug, info};

use crate::error::LoadError;
use crate::geo::range_table::{ip_to_int, IpRange, RangeTable};

/// Read the range list at `path` into a [`RangeTable`].
pub fn load_path(path: impl AsRef<Path>) -> Result<RangeTable, LoadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.display().to_string(),
        source,
    })?;
    let table = load_reader(file)?;
    info!(path = %path.display(), ranges = table.len(), "IP range table loaded");
    Ok(table)
}

pub fn load_reader<R: Read>(reader: R) -> Result<RangeTable, LoadError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut table = RangeTable::new();
    let mut skipped = 0usize;

    for (line, record) in csv_reader.records().enumerate() {
        let record = match record {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(LoadError::Read(e)),
            Err(e) => {
                debug!(line = line + 1, error = %e, "Skipping unreadable range row");
                skipped += 1;
                continue;
            }
        };

        match parse_record(&record) {
            Some(range) => table.insert(range),
            None => {
                debug!(line = line + 1, "Skipping range row");
                skipped += 1;
            }
        }
    }

    info!(loaded = table.len(), skipped, "Range list parsed");
    Ok(table)
}

fn parse_record(record: &csv::StringRecord) -> Option<IpRange> {
    if record.len() != 3 {
        return None;
    }
    let start = ip_to_int(&record[0])?;
    let end = ip_to_int(&record[1])?;
    let country = record[2].trim();
    if end < start || country.is_empty() {
        return None;
    }
    Some(IpRange {
        start,
        end,
        country: country.to_string(),
    })
}
