//! Pinata IPFS implementation of the storage uploader.

use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;

use super::uploader::StorageUploader;
use crate::error::ForgeError;
use crate::generation::NftMetadata;

const PIN_FILE_URL: &str = "https://api.pinata.cloud/pinning/pinFileToIPFS";
const PIN_JSON_URL: &str = "https://api.pinata.cloud/pinning/pinJSONToIPFS";

/// Pinata pinning API client.
///
/// Authenticates with a JWT bearer token. Returned URLs point at the
/// configured public gateway so the frontend can render them directly.
#[derive(Clone)]
pub struct PinataUploader {
    client: reqwest::Client,
    jwt: String,
    gateway: String,
}

impl fmt::Debug for PinataUploader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinataUploader")
            .field("gateway", &self.gateway)
            .field("jwt", &"<redacted>")
            .finish()
    }
}

/// Successful pin response from either pinning endpoint.
#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

impl PinataUploader {
    /// Creates a client with the given JWT and gateway base URL
    /// (no trailing slash, e.g. `https://gateway.pinata.cloud/ipfs`).
    #[must_use]
    pub fn new(jwt: String, gateway: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            jwt,
            gateway: gateway.trim_end_matches('/').to_string(),
        }
    }

    fn content_url(&self, cid: &str) -> String {
        format!("{}/{cid}", self.gateway)
    }

    async fn decode_pin(&self, response: reqwest::Response) -> Result<String, ForgeError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ForgeError::Upload(format!(
                "pinata returned {status}: {}",
                body.trim()
            )));
        }
        let pin: PinResponse = response
            .json()
            .await
            .map_err(|e| ForgeError::Upload(format!("invalid pinata response: {e}")))?;
        Ok(self.content_url(&pin.ipfs_hash))
    }
}

#[async_trait]
impl StorageUploader for PinataUploader {
    async fn upload_image(&self, bytes: Vec<u8>, name: &str) -> Result<String, ForgeError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str("image/png")
            .map_err(|e| ForgeError::Upload(format!("invalid mime: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(PIN_FILE_URL)
            .bearer_auth(&self.jwt)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ForgeError::Upload(format!("pinata request failed: {e}")))?;

        self.decode_pin(response).await
    }

    async fn upload_metadata(&self, metadata: &NftMetadata) -> Result<String, ForgeError> {
        let body = serde_json::json!({ "pinataContent": metadata });

        let response = self
            .client
            .post(PIN_JSON_URL)
            .bearer_auth(&self.jwt)
            .json(&body)
            .send()
            .await
            .map_err(|e| ForgeError::Upload(format!("pinata request failed: {e}")))?;

        self.decode_pin(response).await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn content_url_joins_gateway_and_cid() {
        let uploader = PinataUploader::new(
            "jwt".to_string(),
            "https://gateway.pinata.cloud/ipfs/".to_string(),
        );
        assert_eq!(
            uploader.content_url("QmAbc"),
            "https://gateway.pinata.cloud/ipfs/QmAbc"
        );
    }

    #[test]
    fn debug_redacts_jwt() {
        let uploader = PinataUploader::new("secret-jwt".to_string(), "https://gw".to_string());
        let debug = format!("{uploader:?}");
        assert!(!debug.contains("secret-jwt"));
        assert!(debug.contains("<redacted>"));
    }
}
