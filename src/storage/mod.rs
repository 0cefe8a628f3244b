//! Storage layer: durable artifact uploads.
//!
//! Provides the [`StorageUploader`] trait consumed by the job service and
//! the Pinata IPFS implementation used in production.

pub mod pinata;
pub mod uploader;

pub use pinata::PinataUploader;
pub use uploader::StorageUploader;
