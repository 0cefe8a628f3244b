//! Contract passthrough and event replay handlers.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::dto::{EventsResponse, MintEventDto};
use crate::app_state::AppState;
use crate::chain::ContractStats;
use crate::error::{ErrorResponse, ForgeError};

/// `GET /contract/stats` — Contract address, supply, and cap.
///
/// # Errors
///
/// Returns [`ForgeError::Rpc`] when the chain is unreachable.
#[utoipa::path(
    get,
    path = "/contract/stats",
    tag = "Contract",
    summary = "Contract statistics",
    responses(
        (status = 200, description = "Current contract state", body = ContractStats),
        (status = 500, description = "Chain unreachable", body = ErrorResponse),
    )
)]
pub async fn contract_stats(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ForgeError> {
    let stats = state.contract.stats().await?;
    Ok((StatusCode::OK, Json(stats)))
}

/// Response body for `GET /contract/supply`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SupplyResponse {
    /// Tokens minted so far.
    pub total_supply: u64,
    /// Collection hard cap.
    pub max_supply: u64,
}

/// `GET /contract/supply` — Minted count and hard cap only.
///
/// # Errors
///
/// Returns [`ForgeError::Rpc`] when the chain is unreachable.
#[utoipa::path(
    get,
    path = "/contract/supply",
    tag = "Contract",
    summary = "Current supply",
    responses(
        (status = 200, description = "Supply counters", body = SupplyResponse),
        (status = 500, description = "Chain unreachable", body = ErrorResponse),
    )
)]
pub async fn contract_supply(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ForgeError> {
    let total_supply = state.contract.total_supply().await?;
    let max_supply = state.contract.max_supply().await?;
    Ok((
        StatusCode::OK,
        Json(SupplyResponse {
            total_supply,
            max_supply,
        }),
    ))
}

/// Query parameters for `GET /events/past`.
#[derive(Debug, Deserialize)]
pub struct PastEventsQuery {
    /// Lower block bound; defaults to the contract's deploy block.
    #[serde(rename = "fromBlock")]
    pub from_block: Option<u64>,
}

/// `GET /events/past` — Replay historical mint events.
///
/// # Errors
///
/// Returns [`ForgeError::Rpc`] when a log query fails.
#[utoipa::path(
    get,
    path = "/events/past",
    tag = "Contract",
    summary = "Replay past mint events",
    params(("fromBlock" = Option<u64>, Query, description = "Lower block bound")),
    responses(
        (status = 200, description = "Historical mint events", body = EventsResponse),
        (status = 500, description = "Log query failed", body = ErrorResponse),
    )
)]
pub async fn past_events(
    State(state): State<AppState>,
    Query(query): Query<PastEventsQuery>,
) -> Result<impl IntoResponse, ForgeError> {
    let events = state
        .event_source
        .get_past_mint_events(query.from_block)
        .await?;
    let response = EventsResponse {
        events: events.iter().map(MintEventDto::from).collect(),
    };
    Ok((StatusCode::OK, Json(response)))
}

/// Contract routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/contract/stats", get(contract_stats))
        .route("/contract/supply", get(contract_supply))
        .route("/events/past", get(past_events))
}
