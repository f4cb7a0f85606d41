use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, state::AppState};

/// Maximum addresses accepted by one `/api/classify` call.
pub const MAX_BATCH: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    pub ips: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub countries: Vec<String>,
}

/// `POST /api/classify` - country codes for a batch of addresses, in input order.
#[tracing::instrument(skip(state, body), fields(count = body.ips.len()))]
pub async fn classify(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ClassifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    if body.ips.len() > MAX_BATCH {
        return Err(AppError::BatchTooLarge(body.ips.len()));
    }
    let countries = state.classifier.lookup_batch(&body.ips).await;
    Ok(Json(ClassifyResponse { countries }))
}
