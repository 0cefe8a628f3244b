//! Service configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Chain and storage credentials are
//! required; everything else has a workable default.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::ForgeError;

/// Top-level service configuration.
///
/// Loaded once at startup via [`ForgeConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// HTTP JSON-RPC endpoint. Required.
    pub rpc_url: String,

    /// WebSocket JSON-RPC endpoint. When unset, the listener polls only.
    pub ws_rpc_url: Option<String>,

    /// Plumffel NFT contract address. Required.
    pub contract_address: String,

    /// Block the contract was deployed at; lower bound for backfills.
    pub contract_deploy_block: u64,

    /// Seconds between polling scans when the WebSocket is down.
    pub poll_interval_secs: u64,

    /// Maximum block span per log query.
    pub max_block_range: u64,

    /// Pinata API token. Required; uploads cannot work without it.
    pub pinata_jwt: String,

    /// Public gateway used to build content URLs from CIDs.
    pub pinata_gateway: String,

    /// Path to the generator executable.
    pub generator_cmd: PathBuf,

    /// Directory the generator's per-job scratch directories live in.
    pub generator_workdir: PathBuf,

    /// Seconds a single render may take before it is killed.
    pub render_timeout_secs: u64,

    /// Path to the trait layer configuration file.
    pub layers_path: PathBuf,

    /// Hours a terminal job is kept before cleanup.
    pub job_retention_hours: i64,

    /// Seconds between cleanup sweeps.
    pub cleanup_interval_secs: u64,

    /// Capacity of the EventBus broadcast channel.
    pub event_bus_capacity: usize,
}

impl ForgeConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::Configuration`] when `LISTEN_ADDR` does not
    /// parse, or when `RPC_URL`, `CONTRACT_ADDRESS`, or `PINATA_JWT` is
    /// missing. These are fatal; the process must not start without them.
    pub fn from_env() -> Result<Self, ForgeError> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|e| ForgeError::Configuration(format!("invalid LISTEN_ADDR: {e}")))?;

        let rpc_url = require_env("RPC_URL")?;
        let ws_rpc_url = std::env::var("WS_RPC_URL").ok().filter(|v| !v.is_empty());
        let contract_address = require_env("CONTRACT_ADDRESS")?;
        let pinata_jwt = require_env("PINATA_JWT")?;

        let pinata_gateway = std::env::var("PINATA_GATEWAY")
            .unwrap_or_else(|_| "https://gateway.pinata.cloud/ipfs/".to_string());

        let generator_cmd = PathBuf::from(
            std::env::var("GENERATOR_CMD").unwrap_or_else(|_| "plumffel-generator".to_string()),
        );
        let generator_workdir = PathBuf::from(
            std::env::var("GENERATOR_WORKDIR").unwrap_or_else(|_| "/tmp/plumffel-forge".to_string()),
        );
        let layers_path = PathBuf::from(
            std::env::var("LAYERS_PATH").unwrap_or_else(|_| "layers.json".to_string()),
        );

        Ok(Self {
            listen_addr,
            rpc_url,
            ws_rpc_url,
            contract_address,
            contract_deploy_block: parse_env("CONTRACT_DEPLOY_BLOCK", 0),
            poll_interval_secs: parse_env("POLL_INTERVAL_SECS", 10),
            max_block_range: parse_env("MAX_BLOCK_RANGE", 9000),
            pinata_jwt,
            pinata_gateway,
            generator_cmd,
            generator_workdir,
            render_timeout_secs: parse_env("RENDER_TIMEOUT_SECS", 120),
            layers_path,
            job_retention_hours: parse_env("JOB_RETENTION_HOURS", 24),
            cleanup_interval_secs: parse_env("CLEANUP_INTERVAL_SECS", 3600),
            event_bus_capacity: parse_env("EVENT_BUS_CAPACITY", 10_000),
        })
    }
}

/// Reads a required environment variable, rejecting empty values.
fn require_env(key: &str) -> Result<String, ForgeError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ForgeError::Configuration(format!("{key} must be set")))
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_key_is_a_configuration_error() {
        let result = require_env("PLUMFFEL_TEST_UNSET_KEY");
        let Err(ForgeError::Configuration(message)) = result else {
            panic!("expected configuration error");
        };
        assert!(message.contains("PLUMFFEL_TEST_UNSET_KEY"));
    }

    #[test]
    fn parse_env_falls_back_on_missing() {
        assert_eq!(parse_env("PLUMFFEL_TEST_UNSET_NUM", 9000u64), 9000);
    }
}
