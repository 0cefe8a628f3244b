//! Read-only Plumffel contract client.
//!
//! Wraps the alloy-generated bindings for the handful of read calls the
//! pipeline and the status API need. Providers are created per call and
//! not cached.

use std::str::FromStr;

use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::sol;
use serde::Serialize;

use crate::error::ForgeError;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    #[derive(Debug)]
    contract PlumffelNft {
        function totalSupply() external view returns (uint256);
        function maxSupply() external view returns (uint256);
        function tokenRarity(uint256 tokenId) external view returns (uint8);
    }
}

/// Aggregate contract statistics for `GET /contract/stats`.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct ContractStats {
    /// Checksummed contract address.
    pub address: String,
    /// Tokens minted so far.
    pub total_supply: u64,
    /// Collection hard cap.
    pub max_supply: u64,
}

/// Read-only client for the Plumffel NFT contract.
#[derive(Debug, Clone)]
pub struct ContractClient {
    contract_address: Address,
    rpc_url: String,
}

impl ContractClient {
    /// Creates a client, validating the contract address up front.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::Configuration`] if `contract_address` is not
    /// a valid Ethereum address.
    pub fn new(rpc_url: String, contract_address: &str) -> Result<Self, ForgeError> {
        let contract_address = Address::from_str(contract_address).map_err(|e| {
            ForgeError::Configuration(format!(
                "invalid contract address '{contract_address}': {e}"
            ))
        })?;
        Ok(Self {
            contract_address,
            rpc_url,
        })
    }

    /// The validated contract address.
    #[must_use]
    pub const fn contract_address(&self) -> &Address {
        &self.contract_address
    }

    /// Creates a fresh read-only HTTP provider.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::Rpc`] if the RPC URL cannot be parsed.
    pub fn create_provider(&self) -> Result<impl Provider, ForgeError> {
        let rpc_url = self
            .rpc_url
            .parse()
            .map_err(|e| ForgeError::Rpc(format!("invalid RPC URL: {e}")))?;
        Ok(ProviderBuilder::new().connect_http(rpc_url))
    }

    /// `totalSupply()` read call.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::ContractCall`] on RPC failure or an
    /// out-of-range value.
    pub async fn total_supply(&self) -> Result<u64, ForgeError> {
        let provider = self.create_provider()?;
        let contract = PlumffelNft::new(self.contract_address, &provider);
        let supply = contract
            .totalSupply()
            .call()
            .await
            .map_err(|e| ForgeError::ContractCall(format!("totalSupply: {e}")))?;
        u64::try_from(supply)
            .map_err(|_| ForgeError::ContractCall("totalSupply out of u64 range".to_string()))
    }

    /// `maxSupply()` read call.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::ContractCall`] on RPC failure or an
    /// out-of-range value.
    pub async fn max_supply(&self) -> Result<u64, ForgeError> {
        let provider = self.create_provider()?;
        let contract = PlumffelNft::new(self.contract_address, &provider);
        let supply = contract
            .maxSupply()
            .call()
            .await
            .map_err(|e| ForgeError::ContractCall(format!("maxSupply: {e}")))?;
        u64::try_from(supply)
            .map_err(|_| ForgeError::ContractCall("maxSupply out of u64 range".to_string()))
    }

    /// On-chain rarity level for a token, when the contract stores one.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::ContractCall`] on RPC failure.
    pub async fn token_rarity(&self, token_id: u64) -> Result<u8, ForgeError> {
        let provider = self.create_provider()?;
        let contract = PlumffelNft::new(self.contract_address, &provider);
        contract
            .tokenRarity(alloy::primitives::U256::from(token_id))
            .call()
            .await
            .map_err(|e| ForgeError::ContractCall(format!("tokenRarity({token_id}): {e}")))
    }

    /// Aggregated stats for the status API.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::ContractCall`] if either read fails.
    pub async fn stats(&self) -> Result<ContractStats, ForgeError> {
        let total_supply = self.total_supply().await?;
        let max_supply = self.max_supply().await?;
        Ok(ContractStats {
            address: self.contract_address.to_checksum(None),
            total_supply,
            max_supply,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn valid_address_accepted() {
        let client = ContractClient::new(
            "http://localhost:8545".to_string(),
            "0x5FbDB2315678afecb367f032d93F642f64180aa3",
        );
        assert!(client.is_ok());
    }

    #[test]
    fn invalid_address_is_configuration_error() {
        let client = ContractClient::new("http://localhost:8545".to_string(), "not-an-address");
        assert!(matches!(client, Err(ForgeError::Configuration(_))));
    }

    #[test]
    fn bad_rpc_url_fails_provider_creation() {
        let client = ContractClient::new(
            "".to_string(),
            "0x5FbDB2315678afecb367f032d93F642f64180aa3",
        );
        let Ok(client) = client else {
            panic!("address should parse");
        };
        assert!(client.create_provider().is_err());
    }
}
