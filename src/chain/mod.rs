//! On-chain integration: contract reads and mint event delivery.

mod contract;
mod event_source;

pub use contract::{ContractClient, ContractStats};
pub use event_source::{
    ChainEventSource, DeliveryState, PollCursor, backoff_delay, chunk_ranges,
};
