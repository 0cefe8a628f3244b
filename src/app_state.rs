//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::chain::{ChainEventSource, ContractClient};
use crate::domain::EventBus;
use crate::service::JobService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Job service for all business logic.
    pub job_service: Arc<JobService>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
    /// Read-only contract client for passthrough endpoints.
    pub contract: Arc<ContractClient>,
    /// Mint event source, exposed for replay and health reporting.
    pub event_source: Arc<ChainEventSource>,
}
