//! Domain events reflecting job lifecycle changes.
//!
//! Every job mutation emits a [`JobEvent`] through the [`super::EventBus`].
//! Events are broadcast to WebSocket subscribers so the frontend can track
//! generation progress without polling.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{JobId, JobStatus, RarityTier};

/// Domain event emitted after every job state mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Emitted when a mint event is accepted and a job is created.
    JobCreated {
        /// Job identifier.
        job_id: JobId,
        /// Token the job generates for.
        token_id: u64,
        /// Rarity tier fixed at creation.
        rarity: RarityTier,
        /// Creation timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted on every forward status transition.
    JobStatusChanged {
        /// Job identifier.
        job_id: JobId,
        /// Token the job generates for.
        token_id: u64,
        /// New status after the transition.
        status: JobStatus,
        /// Transition timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a job reaches `Completed`.
    JobCompleted {
        /// Job identifier.
        job_id: JobId,
        /// Token the job generated for.
        token_id: u64,
        /// Durable image URL.
        image_url: String,
        /// Durable metadata URL.
        metadata_url: String,
        /// Completion timestamp.
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a job reaches `Failed`.
    JobFailed {
        /// Job identifier.
        job_id: JobId,
        /// Token the job was generating for.
        token_id: u64,
        /// Failure cause, verbatim from the failing step.
        error: String,
        /// Failure timestamp.
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Returns the token ID associated with this event.
    #[must_use]
    pub const fn token_id(&self) -> u64 {
        match self {
            Self::JobCreated { token_id, .. }
            | Self::JobStatusChanged { token_id, .. }
            | Self::JobCompleted { token_id, .. }
            | Self::JobFailed { token_id, .. } => *token_id,
        }
    }

    /// Returns the job ID associated with this event.
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        match self {
            Self::JobCreated { job_id, .. }
            | Self::JobStatusChanged { job_id, .. }
            | Self::JobCompleted { job_id, .. }
            | Self::JobFailed { job_id, .. } => *job_id,
        }
    }

    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn event_type_str(&self) -> &'static str {
        match self {
            Self::JobCreated { .. } => "job_created",
            Self::JobStatusChanged { .. } => "job_status_changed",
            Self::JobCompleted { .. } => "job_completed",
            Self::JobFailed { .. } => "job_failed",
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn created_event_type() {
        let event = JobEvent::JobCreated {
            job_id: JobId::new(),
            token_id: 42,
            rarity: RarityTier::Epic,
            timestamp: Utc::now(),
        };
        assert_eq!(event.event_type_str(), "job_created");
        assert_eq!(event.token_id(), 42);
    }

    #[test]
    fn failed_event_serializes() {
        let event = JobEvent::JobFailed {
            job_id: JobId::new(),
            token_id: 7,
            error: "disk full".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).ok();
        let Some(json) = json else {
            panic!("serialization failed");
        };
        assert!(json.contains("job_failed"));
        assert!(json.contains("disk full"));
    }

    #[test]
    fn job_id_accessor() {
        let id = JobId::new();
        let event = JobEvent::JobStatusChanged {
            job_id: id,
            token_id: 1,
            status: JobStatus::Generating,
            timestamp: Utc::now(),
        };
        assert_eq!(event.job_id(), id);
    }
}
