pub mod classify;
pub mod health;
pub mod ingest;
pub mod stats;
