use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;

use sitestat_core::{
    event::{encode_query_params, non_empty, normalize_domain, Event, IngestPayload, RequestRecord},
    visitor::{compute_visitor_id, referrer_host},
};

use crate::{error::AppError, state::AppState};

/// `POST /ingest`: accept one observed hit from the edge proxy.
///
/// The hit is classified, enriched, and buffered; it becomes visible to
/// `/stats` after the next buffer flush.
///
/// ## Enrichment
/// - `country`: range lookup on the first forwarded-for address.
/// - `visitor_id`: client-supplied, else `sha256(ip + user_agent)[0..8]` as hex.
/// - `referrer_domain`: lower-cased host of `referrer`.
/// - `query_params`: query string as a JSON object, first value per key.
///
/// ## Response
/// `200 OK` with `{ "ok": true }`.
#[tracing::instrument(skip(state, payload))]
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IngestPayload>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(payload) = payload.map_err(|rejection| match rejection {
        JsonRejection::MissingJsonContentType(_) => AppError::UnsupportedMediaType,
        other => AppError::bad_request(other.body_text()),
    })?;

    let (event, request) = build_hit(&state, payload)?;
    state.push_hit(event, request).await;

    Ok(Json(json!({ "ok": true })))
}

fn build_hit(state: &AppState, payload: IngestPayload) -> Result<(Event, RequestRecord), AppError> {
    let Some(client_ip) = payload
        .client_ip
        .first()
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
    else {
        return Err(AppError::invalid_field("clientIp", "clientIp is required"));
    };

    let domain = normalize_domain(&payload.domain);
    if domain.is_empty() {
        return Err(AppError::invalid_field("domain", "domain is required"));
    }
    if payload.path.trim().is_empty() {
        return Err(AppError::invalid_field("path", "path is required"));
    }
    let event_name = payload.event_name.trim().to_string();
    if event_name.is_empty() {
        return Err(AppError::invalid_field("eventName", "eventName is required"));
    }

    let query_params = encode_query_params(&payload.query).map_err(anyhow::Error::from)?;
    let event_data = match payload.event_data {
        None | Some(serde_json::Value::Null) => None,
        Some(data) => Some(serde_json::to_string(&data).map_err(anyhow::Error::from)?),
    };

    let user_agent = payload.client_user_agent.trim().to_string();
    let visitor_id = non_empty(payload.visitor_id)
        .unwrap_or_else(|| compute_visitor_id(&client_ip, &user_agent));
    let referrer = non_empty(payload.referrer);
    let referrer_domain = referrer.as_deref().and_then(referrer_host);
    let country = state.classifier.lookup(&client_ip).to_string();
    let duration_ms = (payload.duration != 0).then_some(payload.duration);
    let user_agent = non_empty(Some(user_agent));
    let now = Utc::now();

    let request = RequestRecord {
        id: uuid::Uuid::new_v4().to_string(),
        domain: domain.clone(),
        timestamp: now,
        path: payload.path.clone(),
        user_agent: user_agent.clone(),
        primary_ip: client_ip,
        secondary_ips: payload.client_ip.iter().skip(1).cloned().collect(),
        country: country.clone(),
        status_code: payload.status_code,
        duration_ms,
    };

    let event = Event {
        id: uuid::Uuid::new_v4().to_string(),
        domain,
        event_name,
        timestamp: now,
        visitor_id,
        session_id: non_empty(payload.session_id),
        path: payload.path,
        user_agent,
        referrer,
        referrer_domain,
        country,
        query_params,
        event_data,
        status_code: payload.status_code,
        duration_ms,
    };

    Ok((event, request))
}
