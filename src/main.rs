//! plumffel-forge server entry point.
//!
//! Wires the chain listener, generation pipeline, and Axum HTTP server
//! together and runs them until shutdown.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use plumffel_forge::api;
use plumffel_forge::app_state::AppState;
use plumffel_forge::chain::{ChainEventSource, ContractClient};
use plumffel_forge::config::ForgeConfig;
use plumffel_forge::domain::EventBus;
use plumffel_forge::generation::{LayerSet, SubprocessRenderer, TierCounters, TraitSelector};
use plumffel_forge::service::JobService;
use plumffel_forge::storage::PinataUploader;
use plumffel_forge::ws::handler::ws_handler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration; missing chain or storage credentials are fatal.
    let config = ForgeConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, "starting plumffel-forge");

    // Build generation layer
    let layers = Arc::new(LayerSet::from_file(&config.layers_path)?);
    let counters = Arc::new(TierCounters::new(&layers.tiers)?);
    let selector = Arc::new(TraitSelector::new(Arc::clone(&layers), counters));
    let renderer = Arc::new(SubprocessRenderer::new(
        config.generator_cmd.clone(),
        config.generator_workdir.clone(),
        Duration::from_secs(config.render_timeout_secs),
    ));
    let uploader = Arc::new(PinataUploader::new(
        config.pinata_jwt.clone(),
        config.pinata_gateway.clone(),
    ));

    // Build chain layer
    let contract = Arc::new(ContractClient::new(
        config.rpc_url.clone(),
        &config.contract_address,
    )?);
    // Build service layer
    let event_bus = EventBus::new(config.event_bus_capacity);
    let job_service = Arc::new(JobService::new(
        selector,
        renderer,
        uploader,
        Some(Arc::clone(&contract)),
        event_bus.clone(),
    ));

    let event_source = Arc::new(ChainEventSource::new(
        config.rpc_url.clone(),
        config.ws_rpc_url.clone(),
        *contract.contract_address(),
        config.contract_deploy_block,
        Duration::from_secs(config.poll_interval_secs),
        config.max_block_range,
    ));

    // Event pump: mint events in, jobs out.
    let (mint_tx, mut mint_rx) = mpsc::channel(1024);
    {
        let service = Arc::clone(&job_service);
        tokio::spawn(async move {
            while let Some(event) = mint_rx.recv().await {
                if let Err(e) = service.handle_mint_event(&event).await {
                    tracing::error!(%e, "could not create job for mint event");
                }
            }
        });
    }
    event_source.start_listening(mint_tx).await?;

    // Periodic cleanup of old terminal jobs.
    {
        let service = Arc::clone(&job_service);
        let retention = chrono::Duration::hours(config.job_retention_hours);
        let mut interval = tokio::time::interval(Duration::from_secs(config.cleanup_interval_secs));
        tokio::spawn(async move {
            loop {
                interval.tick().await;
                service.cleanup_old_jobs(retention).await;
            }
        });
    }

    // Build application state
    let app_state = AppState {
        job_service,
        event_bus,
        contract,
        event_source,
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
