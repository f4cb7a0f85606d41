//! IPv4 range-to-country classification.
//!
//! [`RangeTable`] holds the sorted ranges, [`loader`] builds it from a
//! `start,end,country` list, and [`Classifier`] is the read API shared with
//! the ingestion path.

mod classifier;
pub mod loader;
mod range_table;

pub use classifier::Classifier;
pub use range_table::{int_to_ip, ip_to_int, IpRange, RangeTable};

/// Country code returned for addresses that match no range or do not parse.
pub const UNKNOWN_COUNTRY: &str = "ZZ";
