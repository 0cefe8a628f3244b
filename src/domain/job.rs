//! Generation job record and its status state machine.
//!
//! A [`GenerationJob`] tracks one "generate + upload artifacts for token T"
//! unit of work from `pending` through to a terminal state. Transitions are
//! forward-only and enforced by [`GenerationJob::transition`].

use std::fmt;

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{JobId, RarityTier};
use crate::error::ForgeError;

/// Status of a generation job.
///
/// The happy path is `Pending → Generating → Uploading → Completed`.
/// Any non-terminal state may instead move to `Failed`. `Completed` and
/// `Failed` are terminal; no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, waiting for processing to start.
    Pending,
    /// Trait selection and rendering in progress.
    Generating,
    /// Image and metadata uploads in progress.
    Uploading,
    /// Artifacts uploaded; `image_url`/`metadata_url` are set.
    Completed,
    /// A step errored; `error` holds the cause. Not retried in place.
    Failed,
}

impl JobStatus {
    /// Returns `true` for `Completed` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Generating)
            | (Self::Generating, Self::Uploading)
            | (Self::Uploading, Self::Completed) => true,
            // Any in-flight state may fail.
            (Self::Pending | Self::Generating | Self::Uploading, Self::Failed) => true,
            _ => false,
        }
    }

    /// Snake-case status string as used in API responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One tracked generation job.
///
/// Created by the job service upon receipt of a [`super::MintEvent`];
/// mutated only through [`Self::transition`], [`Self::complete`] and
/// [`Self::fail`]; garbage-collected after a retention window once
/// terminal.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationJob {
    /// Unique identifier, immutable after creation.
    pub id: JobId,
    /// The NFT being generated for. At most one non-failed job per token.
    pub token_id: u64,
    /// Owning address at mint time.
    pub user_address: Address,
    /// Rarity tier, fixed at job creation.
    pub rarity: RarityTier,
    /// Current state-machine position.
    pub status: JobStatus,
    /// Durable image URL, set only on entering `Completed`.
    pub image_url: Option<String>,
    /// Durable metadata URL, set only on entering `Completed`.
    pub metadata_url: Option<String>,
    /// Failure cause, set only on entering `Failed`.
    pub error: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Set when the job reaches a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
}

impl GenerationJob {
    /// Creates a new job in `Pending` state.
    #[must_use]
    pub fn new(token_id: u64, user_address: Address, rarity: RarityTier) -> Self {
        Self {
            id: JobId::new(),
            token_id,
            user_address,
            rarity,
            status: JobStatus::Pending,
            image_url: None,
            metadata_url: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Advances the job to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::InvalidTransition`] if the state machine
    /// forbids the move (including any attempt to leave a terminal state).
    pub fn transition(&mut self, next: JobStatus) -> Result<(), ForgeError> {
        if !self.status.can_transition_to(next) {
            return Err(ForgeError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Marks the job completed with its durable artifact URLs.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::InvalidTransition`] unless the job is
    /// currently `Uploading`.
    pub fn complete(&mut self, image_url: String, metadata_url: String) -> Result<(), ForgeError> {
        self.transition(JobStatus::Completed)?;
        self.image_url = Some(image_url);
        self.metadata_url = Some(metadata_url);
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Marks the job failed, capturing the error message verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::InvalidTransition`] if the job is already
    /// terminal.
    pub fn fail(&mut self, error: String) -> Result<(), ForgeError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn make_job() -> GenerationJob {
        GenerationJob::new(42, Address::repeat_byte(0xab), RarityTier::Rare)
    }

    #[test]
    fn new_job_is_pending() {
        let job = make_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.image_url.is_none());
        assert!(job.error.is_none());
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn happy_path_transitions() {
        let mut job = make_job();
        assert!(job.transition(JobStatus::Generating).is_ok());
        assert!(job.transition(JobStatus::Uploading).is_ok());
        assert!(
            job.complete("ipfs://img".to_string(), "ipfs://meta".to_string())
                .is_ok()
        );
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.image_url.as_deref(), Some("ipfs://img"));
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn cannot_skip_pending() {
        let mut job = make_job();
        let result = job.transition(JobStatus::Uploading);
        assert!(result.is_err());
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn cannot_regress() {
        let mut job = make_job();
        let _ = job.transition(JobStatus::Generating);
        assert!(job.transition(JobStatus::Pending).is_err());
    }

    #[test]
    fn any_in_flight_state_may_fail() {
        for advance in [0usize, 1, 2] {
            let mut job = make_job();
            let steps = [JobStatus::Generating, JobStatus::Uploading];
            for next in steps.iter().take(advance) {
                let _ = job.transition(*next);
            }
            assert!(job.fail("disk full".to_string()).is_ok());
            assert_eq!(job.status, JobStatus::Failed);
            assert_eq!(job.error.as_deref(), Some("disk full"));
        }
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut job = make_job();
        let _ = job.transition(JobStatus::Generating);
        let _ = job.fail("boom".to_string());
        assert!(job.transition(JobStatus::Generating).is_err());
        assert!(job.fail("again".to_string()).is_err());
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn status_strings_are_snake_case() {
        assert_eq!(JobStatus::Pending.as_str(), "pending");
        assert_eq!(JobStatus::Completed.as_str(), "completed");
    }
}
