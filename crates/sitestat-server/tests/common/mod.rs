#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use serde_json::Value;

use sitestat_core::config::Config;
use sitestat_core::geo::{loader::load_reader, Classifier};
use sitestat_duckdb::DuckDbBackend;
use sitestat_server::app::build_app;
use sitestat_server::state::AppState;

pub const RANGES: &str = "\
\"1.0.0.0\",\"1.0.0.255\",\"AU\"
\"1.0.1.0\",\"1.0.3.255\",\"CN\"
\"8.8.8.0\",\"8.8.8.255\",\"US\"
";

pub fn test_config() -> Config {
    Config {
        port: 0,
        data_dir: "/tmp/sitestat-test".to_string(),
        ip2country_path: "/nonexistent/ranges.csv".to_string(),
        duckdb_memory_limit: "1GB".to_string(),
        page_size: 2,
        stats_timeout_secs: 30,
        buffer_flush_interval_ms: 5000,
        buffer_max_size: 100,
    }
}

pub fn test_classifier() -> Classifier {
    Classifier::new(load_reader(RANGES.as_bytes()).expect("ranges"))
}

/// Fresh in-memory backend + state + app for each test.
pub fn setup_with(config: Config) -> (Arc<AppState>, axum::Router) {
    let db = DuckDbBackend::open_in_memory().expect("in-memory DuckDB");
    let state = Arc::new(AppState::new(db, test_classifier(), config));
    let app = build_app(Arc::clone(&state));
    (state, app)
}

pub fn setup() -> (Arc<AppState>, axum::Router) {
    setup_with(test_config())
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request")
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse JSON")
}
