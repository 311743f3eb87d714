use crate::auth;
use crate::hub::BroadcastHub;
use crate::model::StoredReading;
use crate::store::{clamp_limit, ReadingStore};
use crate::ws;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReadingStore>,
    pub hub: Arc<BroadcastHub>,
    pub auth_token: Arc<str>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub data: Vec<StoredReading>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/sensor-history", get(sensor_history))
        .route("/api/authorize", get(auth::authorize))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

/// History hydration endpoint: the last N persisted readings, oldest first.
async fn sensor_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let limit = clamp_limit(params.limit);
    let data = state.store.recent(limit).await?;
    Ok(Json(HistoryResponse {
        success: true,
        data,
    }))
}

pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("API error: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "success": false,
                "error": self.0.to_string(),
            })),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
