//! Mint event DTOs for the replay endpoint.

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::MintEvent;

/// One mint event as exposed over `GET /events/past`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MintEventDto {
    /// Minted token.
    pub token_id: u64,
    /// Recipient address, EIP-55 checksummed.
    pub to: String,
    /// Transaction that emitted the event.
    pub transaction_hash: String,
    /// Block the event landed in.
    pub block_number: u64,
    /// On-chain rarity level when the contract emitted one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rarity: Option<u8>,
}

impl From<&MintEvent> for MintEventDto {
    fn from(event: &MintEvent) -> Self {
        Self {
            token_id: event.token_id,
            to: event.to.to_checksum(None),
            transaction_hash: format!("{:#x}", event.transaction_hash),
            block_number: event.block_number,
            rarity: event.rarity,
        }
    }
}

/// Envelope for `GET /events/past`.
#[derive(Debug, Serialize, ToSchema)]
pub struct EventsResponse {
    /// Detected mint events, oldest block first.
    pub events: Vec<MintEventDto>,
}
