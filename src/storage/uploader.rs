//! Durable storage seam.
//!
//! The pipeline treats storage as an opaque `upload(bytes) -> URL`
//! capability; [`StorageUploader`] is the contract the job service
//! depends on.

use std::fmt;

use async_trait::async_trait;

use crate::error::ForgeError;
use crate::generation::NftMetadata;

/// Uploads generated artifacts to durable content-addressed storage.
#[async_trait]
pub trait StorageUploader: Send + Sync + fmt::Debug {
    /// Uploads rendered image bytes, returning a durable content URL.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::Upload`] on any transport or provider
    /// failure.
    async fn upload_image(&self, bytes: Vec<u8>, name: &str) -> Result<String, ForgeError>;

    /// Uploads token metadata JSON, returning a durable content URL.
    ///
    /// The caller must rewrite `metadata.image` to the uploaded image's
    /// URL before calling this.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::Upload`] on any transport or provider
    /// failure.
    async fn upload_metadata(&self, metadata: &NftMetadata) -> Result<String, ForgeError>;
}
