//! System endpoints: health check.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::dto::StatsDto;
use crate::app_state::AppState;
use crate::chain::DeliveryState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
    /// Which mint-event delivery path is active.
    listener: DeliveryState,
    stats: StatsDto,
}

/// `GET /health` — Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service status, listener delivery state, and job statistics.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let stats = StatsDto::new(
        state.job_service.get_stats().await,
        state.job_service.rarity_snapshot(),
    );
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            listener: state.event_source.delivery_state().await,
            stats,
        }),
    )
}

/// System routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}
