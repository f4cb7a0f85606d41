pub mod aggregate;
pub mod attribution;
pub mod config;
pub mod error;
pub mod event;
pub mod geo;
pub mod stats;
pub mod store;
pub mod visitor;
