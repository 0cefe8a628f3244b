//! Normalized on-chain mint fact.
//!
//! Every transport (WebSocket push, polled log query, backfill range scan)
//! produces the same [`MintEvent`] shape, so downstream consumers never see
//! transport-specific data.

use alloy::primitives::{Address, TxHash};
use serde::Serialize;

/// One detected `Minted` event, normalized at the transport boundary.
///
/// Immutable fact: produced once per detected mint, never mutated.
/// Delivery is at-least-once; consumers dedupe on
/// `(token_id, transaction_hash)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MintEvent {
    /// Token that was minted.
    pub token_id: u64,
    /// Recipient (owner at mint time).
    pub to: Address,
    /// Sender side of the transfer. The zero address for fresh mints.
    pub from: Address,
    /// Transaction that emitted the event.
    pub transaction_hash: TxHash,
    /// Block the event landed in.
    pub block_number: u64,
    /// On-chain rarity level (1–5) when the contract emits one.
    /// `None` for contracts that assign rarity off-chain.
    pub rarity: Option<u8>,
}

impl MintEvent {
    /// Dedupe key for at-least-once delivery: the same logical mint always
    /// yields the same `(token_id, transaction_hash)` pair.
    #[must_use]
    pub const fn dedupe_key(&self) -> (u64, TxHash) {
        (self.token_id, self.transaction_hash)
    }
}
