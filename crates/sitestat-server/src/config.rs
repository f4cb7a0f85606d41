/// Re-export `Config` from `sitestat-core` for use within this crate.
///
/// Environment parsing lives in `sitestat-core` so integration tests can
/// build a `Config` without depending on the server binary.
pub use sitestat_core::config::Config;
