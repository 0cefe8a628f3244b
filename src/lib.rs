//! # plumffel-forge
//!
//! Event-driven generation service for the Plumffel NFT collection.
//!
//! The service watches the Plumffel contract for `Minted` events,
//! assigns each new token a rarity tier, selects a unique trait
//! combination under per-tier supply caps, renders the artwork through
//! an external generator, uploads the results to IPFS, and exposes job
//! progress over REST and WebSocket.
//!
//! ## Architecture
//!
//! ```text
//! Chain (HTTP / WebSocket JSON-RPC)
//!     │
//!     ├── ChainEventSource (chain/)
//!     ├── ContractClient (chain/)
//!     │
//!     ├── JobService (service/)
//!     ├── EventBus (domain/)
//!     │
//!     ├── TraitSelector (generation/)
//!     ├── SubprocessRenderer (generation/)
//!     ├── PinataUploader (storage/)
//!     │
//!     └── REST Handlers (api/) + WS Handler (ws/)
//! ```

pub mod api;
pub mod app_state;
pub mod chain;
pub mod config;
pub mod domain;
pub mod error;
pub mod generation;
pub mod service;
pub mod storage;
pub mod ws;
