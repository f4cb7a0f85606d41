use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use sitestat_core::geo::Classifier;
use sitestat_server::state::AppState;

/// `sitestat health`: liveness probe for Docker HEALTHCHECK.
///
/// Calls `GET http://localhost:$SITESTAT_PORT/health`.
/// Exits 0 if the server responds with HTTP 200, exits 1 otherwise.
fn run_health_check() -> ! {
    let port = std::env::var("SITESTAT_PORT").unwrap_or_else(|_| "3100".to_string());
    let url = format!("http://localhost:{}/health", port);
    match ureq::get(&url).call() {
        Ok(resp) if resp.status() == 200 => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("health") {
        run_health_check();
    }

    // Structured JSON logging. Level controlled via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sitestat=info".parse()?),
        )
        .json()
        .init();

    let cfg = sitestat_core::config::Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    // The classifier must be ready before any request is accepted.
    let classifier = Classifier::load(&cfg.ip2country_path).map_err(|e| {
        tracing::error!(path = %cfg.ip2country_path, error = %e, "Range list failed to load");
        e
    })?;
    if classifier.is_empty() {
        tracing::warn!(
            path = %cfg.ip2country_path,
            "Range list loaded no ranges; every address will classify as ZZ"
        );
    }

    std::fs::create_dir_all(&cfg.data_dir)?;
    let db_path = format!("{}/sitestat.db", cfg.data_dir);
    let db = sitestat_duckdb::DuckDbBackend::open(&db_path, &cfg.duckdb_memory_limit)?;

    let state = Arc::new(AppState::new(db, classifier, cfg.clone()));

    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            state.run_buffer_flush_loop().await;
        });
    }

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = sitestat_server::app::build_app(Arc::clone(&state));

    info!(port = cfg.port, page_size = cfg.page_size, "Sitestat listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let state_for_shutdown = Arc::clone(&state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    tokio::time::timeout(
        std::time::Duration::from_secs(5),
        state_for_shutdown.flush_buffer(),
    )
    .await
    .ok();

    Ok(())
}
