//! Job DTOs for the status API.
//!
//! Wire names are camelCase to match the frontend polling hook.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{GenerationJob, JobId};

/// One job as exposed over the status API.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobDto {
    /// Job identifier.
    pub job_id: JobId,
    /// Token the job generates for.
    pub token_id: u64,
    /// Owning address, EIP-55 checksummed.
    pub user_address: String,
    /// Rarity level (1–5).
    pub rarity_level: u8,
    /// Human-readable rarity name.
    pub rarity_name: &'static str,
    /// Current status.
    pub status: &'static str,
    /// Durable image URL once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Durable metadata URL once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_url: Option<String>,
    /// Failure cause once failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Terminal timestamp, when reached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&GenerationJob> for JobDto {
    fn from(job: &GenerationJob) -> Self {
        Self {
            job_id: job.id,
            token_id: job.token_id,
            user_address: job.user_address.to_checksum(None),
            rarity_level: job.rarity.level(),
            rarity_name: job.rarity.name(),
            status: job.status.as_str(),
            image_url: job.image_url.clone(),
            metadata_url: job.metadata_url.clone(),
            error: job.error.clone(),
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

/// Envelope for single-job responses.
#[derive(Debug, Serialize, ToSchema)]
pub struct JobResponse {
    /// The requested job.
    pub job: JobDto,
}

impl From<&GenerationJob> for JobResponse {
    fn from(job: &GenerationJob) -> Self {
        Self { job: job.into() }
    }
}

/// Envelope for job-list responses.
#[derive(Debug, Serialize, ToSchema)]
pub struct JobListResponse {
    /// Jobs, oldest first.
    pub jobs: Vec<JobDto>,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use alloy::primitives::Address;

    use super::*;
    use crate::domain::RarityTier;

    #[test]
    fn dto_uses_camel_case_wire_names() {
        let job = GenerationJob::new(42, Address::repeat_byte(0xab), RarityTier::Epic);
        let dto = JobDto::from(&job);
        let Ok(value) = serde_json::to_value(&dto) else {
            panic!("serialization failed");
        };
        assert_eq!(value.get("tokenId").and_then(serde_json::Value::as_u64), Some(42));
        assert_eq!(
            value.get("rarityLevel").and_then(serde_json::Value::as_u64),
            Some(4)
        );
        assert_eq!(
            value.get("status").and_then(serde_json::Value::as_str),
            Some("pending")
        );
        // Unset optionals are omitted, not null.
        assert!(value.get("imageUrl").is_none());
        assert!(value.get("error").is_none());
    }
}
