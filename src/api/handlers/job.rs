//! Job lookup and test-creation handlers.

use alloy::primitives::{Address, TxHash};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{JobListResponse, JobResponse, StatsDto, StatsResponse};
use crate::app_state::AppState;
use crate::domain::{JobId, MintEvent};
use crate::error::{ErrorResponse, ForgeError};

/// `GET /job/{job_id}` — Look up one job by its ID.
///
/// # Errors
///
/// Returns [`ForgeError::InvalidRequest`] for a malformed UUID and
/// [`ForgeError::JobNotFound`] for an unknown one.
#[utoipa::path(
    get,
    path = "/job/{job_id}",
    tag = "Jobs",
    summary = "Get a job by ID",
    params(("job_id" = String, Path, description = "Job UUID")),
    responses(
        (status = 200, description = "Job found", body = JobResponse),
        (status = 400, description = "Malformed job ID", body = ErrorResponse),
        (status = 404, description = "No such job", body = ErrorResponse),
    )
)]
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ForgeError> {
    let job_id: JobId = job_id
        .parse::<uuid::Uuid>()
        .map(JobId::from_uuid)
        .map_err(|_| ForgeError::InvalidRequest(format!("malformed job id: {job_id}")))?;
    let job = state.job_service.get_job(job_id).await?;
    Ok((StatusCode::OK, Json(JobResponse::from(&job))))
}

/// `GET /token/{token_id}` — Look up the latest job for a token.
///
/// A 404 here means "generation not started yet", which the frontend
/// treats as a normal pre-mint state.
///
/// # Errors
///
/// Returns [`ForgeError::InvalidRequest`] for a non-numeric token ID and
/// [`ForgeError::TokenNotFound`] when the token has no job.
#[utoipa::path(
    get,
    path = "/token/{token_id}",
    tag = "Jobs",
    summary = "Get the job for a token",
    params(("token_id" = String, Path, description = "Numeric token ID")),
    responses(
        (status = 200, description = "Job found", body = JobResponse),
        (status = 400, description = "Non-numeric token ID", body = ErrorResponse),
        (status = 404, description = "No job for this token yet", body = ErrorResponse),
    )
)]
pub async fn get_job_by_token(
    State(state): State<AppState>,
    Path(token_id): Path<String>,
) -> Result<impl IntoResponse, ForgeError> {
    let token_id: u64 = token_id
        .parse()
        .map_err(|_| ForgeError::InvalidRequest(format!("non-numeric token id: {token_id}")))?;
    let job = state.job_service.get_job_by_token(token_id).await?;
    Ok((StatusCode::OK, Json(JobResponse::from(&job))))
}

/// `GET /user/{address}/jobs` — All jobs owned by an address.
///
/// # Errors
///
/// Returns [`ForgeError::InvalidRequest`] for an unparseable address.
#[utoipa::path(
    get,
    path = "/user/{address}/jobs",
    tag = "Jobs",
    summary = "List a user's jobs",
    params(("address" = String, Path, description = "Owner address (0x-prefixed)")),
    responses(
        (status = 200, description = "The user's jobs, oldest first", body = JobListResponse),
        (status = 400, description = "Malformed address", body = ErrorResponse),
    )
)]
pub async fn get_user_jobs(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<impl IntoResponse, ForgeError> {
    let address: Address = address
        .parse()
        .map_err(|_| ForgeError::InvalidRequest(format!("malformed address: {address}")))?;
    let jobs = state.job_service.get_user_jobs(address).await;
    let response = JobListResponse {
        jobs: jobs.iter().map(Into::into).collect(),
    };
    Ok((StatusCode::OK, Json(response)))
}

/// `GET /stats` — Aggregate job counts and the live rarity tier table.
#[utoipa::path(
    get,
    path = "/stats",
    tag = "Jobs",
    summary = "Aggregate statistics",
    responses(
        (status = 200, description = "Current statistics", body = StatsResponse),
    )
)]
pub async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    let stats = StatsDto::new(
        state.job_service.get_stats().await,
        state.job_service.rarity_snapshot(),
    );
    (StatusCode::OK, Json(StatsResponse { stats }))
}

/// `POST /test/create-job` — Create a job without an on-chain mint.
///
/// Back-office endpoint for exercising the pipeline. The body mirrors a
/// mint event: `{ "tokenId": 1, "userAddress": "0x..", "rarityLevel": 3 }`.
///
/// # Errors
///
/// Returns [`ForgeError::InvalidRequest`] when `tokenId` or
/// `userAddress` is missing or malformed.
#[utoipa::path(
    post,
    path = "/test/create-job",
    tag = "Jobs",
    summary = "Manually create a job",
    responses(
        (status = 201, description = "Job created and processing started", body = JobResponse),
        (status = 200, description = "Token already has an active job", body = JobResponse),
        (status = 400, description = "Missing or malformed fields", body = ErrorResponse),
    )
)]
pub async fn create_test_job(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, ForgeError> {
    let token_id = body
        .get("tokenId")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| ForgeError::InvalidRequest("tokenId is required".to_string()))?;
    let user_address: Address = body
        .get("userAddress")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| ForgeError::InvalidRequest("userAddress is required".to_string()))?
        .parse()
        .map_err(|_| ForgeError::InvalidRequest("userAddress is malformed".to_string()))?;
    let rarity = body
        .get("rarityLevel")
        .and_then(serde_json::Value::as_u64)
        .and_then(|level| u8::try_from(level).ok());

    let event = MintEvent {
        token_id,
        to: user_address,
        from: Address::ZERO,
        transaction_hash: TxHash::ZERO,
        block_number: 0,
        rarity,
    };

    match state.job_service.handle_mint_event(&event).await? {
        Some(job_id) => {
            let job = state.job_service.get_job(job_id).await?;
            Ok((StatusCode::CREATED, Json(JobResponse::from(&job))))
        }
        None => {
            // An active job already exists; return it instead.
            let job = state.job_service.get_job_by_token(token_id).await?;
            Ok((StatusCode::OK, Json(JobResponse::from(&job))))
        }
    }
}

/// Job routes mounted at the root level.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/job/{job_id}", get(get_job))
        .route("/token/{token_id}", get(get_job_by_token))
        .route("/user/{address}/jobs", get(get_user_jobs))
        .route("/stats", get(get_stats))
        .route("/test/create-job", post(create_test_job))
}
