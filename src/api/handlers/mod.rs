//! REST endpoint handlers organized by resource.

pub mod contract;
pub mod job;
pub mod system;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(job::routes())
        .merge(contract::routes())
        .merge(system::routes())
}
