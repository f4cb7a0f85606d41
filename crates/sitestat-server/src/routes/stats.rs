use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;

use sitestat_core::{
    aggregate::AggregationEngine,
    stats::{Statistic, TimeWindow},
};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub domain: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// `GET /stats?domain=..&start=..&end=..` - statistics for one site.
#[tracing::instrument(skip(state))]
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let domain = query
        .domain
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| AppError::invalid_field("domain", "domain is required"))?
        .to_string();
    let window = parse_window(&query)?;
    Ok(Json(run_aggregation(&state, &domain, window).await?))
}

/// `GET /api/stats/{domain}?start=..&end=..` - path-addressed variant of `/stats`.
#[tracing::instrument(skip(state))]
pub async fn domain_stats(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let window = parse_window(&query)?;
    Ok(Json(run_aggregation(&state, &domain, window).await?))
}

fn parse_window(query: &StatsQuery) -> Result<TimeWindow, AppError> {
    Ok(TimeWindow::new(
        parse_date("start", query.start.as_deref())?,
        parse_date("end", query.end.as_deref())?,
    ))
}

fn parse_date(field: &'static str, raw: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| AppError::invalid_field(field, format!("{field} must be YYYY-MM-DD"))),
    }
}

/// Run one aggregation bounded by the configured timeout. On timeout the
/// in-flight pass is dropped and nothing partial is returned.
async fn run_aggregation(
    state: &AppState,
    domain: &str,
    window: TimeWindow,
) -> Result<Statistic, AppError> {
    let engine = AggregationEngine::new(state.db.as_ref()).with_page_size(state.config.page_size);
    match tokio::time::timeout(state.config.stats_timeout(), engine.aggregate(domain, window)).await
    {
        Ok(result) => Ok(result?),
        Err(_) => {
            tracing::warn!(domain, "Statistics query timed out");
            Err(AppError::Timeout)
        }
    }
}
