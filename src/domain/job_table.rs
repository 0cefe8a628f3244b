//! Concurrent job storage with per-job fine-grained locking.
//!
//! [`JobTable`] stores all tracked jobs in a `HashMap` where each entry is
//! individually protected by a [`tokio::sync::RwLock`], plus a secondary
//! token-id index. This allows concurrent reads on the same job and
//! concurrent writes on different jobs while `process_job` holds a job
//! across its suspending steps.

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::Address;
use chrono::{Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use super::JobId;
use super::job::{GenerationJob, JobStatus};
use crate::error::ForgeError;

/// Point-in-time snapshot of job counts per status.
///
/// Not transactionally consistent with concurrent mutation; intended for
/// the monitoring endpoint only.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct JobStats {
    /// Jobs waiting to start.
    pub pending: usize,
    /// Jobs in the render step.
    pub generating: usize,
    /// Jobs in the upload step.
    pub uploading: usize,
    /// Successfully finished jobs.
    pub completed: usize,
    /// Terminally failed jobs.
    pub failed: usize,
    /// All tracked jobs.
    pub total: usize,
}

/// Central store for all generation jobs.
///
/// Uses a `RwLock<HashMap<...>>` for the outer map and per-entry
/// `Arc<RwLock<GenerationJob>>` for fine-grained per-job locking, with a
/// secondary `token_id → JobId` index for `GET /token/{id}` lookups.
///
/// # Concurrency
///
/// - Multiple tasks may read the same job concurrently.
/// - Writes to different jobs are concurrent.
/// - Writes to the same job are serialized.
/// - No outer-map lock is held across a suspension point.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: RwLock<HashMap<JobId, Arc<RwLock<GenerationJob>>>>,
    token_index: RwLock<HashMap<u64, JobId>>,
}

impl JobTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `job` unless the token already has a non-failed job,
    /// indexing it by token ID.
    ///
    /// The existence check and the insert happen under one critical
    /// section over both table locks, so two concurrent calls for the
    /// same token can never both insert. Returns `None` when an active
    /// job already exists; a `Failed` predecessor is superseded (it stays
    /// in the table until cleanup, but the token index moves to the new
    /// job).
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::Internal`] if a job with the same ID already
    /// exists (should never happen with UUID v4).
    pub async fn insert_unless_active(
        &self,
        job: GenerationJob,
    ) -> Result<Option<JobId>, ForgeError> {
        let job_id = job.id;
        let token_id = job.token_id;
        let mut map = self.jobs.write().await;
        let mut index = self.token_index.write().await;
        if let Some(existing_id) = index.get(&token_id)
            && let Some(existing) = map.get(existing_id)
            && existing.read().await.status != JobStatus::Failed
        {
            return Ok(None);
        }
        if map.contains_key(&job_id) {
            return Err(ForgeError::Internal(format!("job {job_id} already exists")));
        }
        map.insert(job_id, Arc::new(RwLock::new(job)));
        index.insert(token_id, job_id);
        Ok(Some(job_id))
    }

    /// Returns a shared reference to the job behind its per-job lock.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::JobNotFound`] if no job with the given ID
    /// exists.
    pub async fn get(&self, job_id: JobId) -> Result<Arc<RwLock<GenerationJob>>, ForgeError> {
        let map = self.jobs.read().await;
        map.get(&job_id)
            .cloned()
            .ok_or(ForgeError::JobNotFound(job_id))
    }

    /// Looks up the job most recently created for a token.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::TokenNotFound`] if no job exists for the
    /// token.
    pub async fn get_by_token(
        &self,
        token_id: u64,
    ) -> Result<Arc<RwLock<GenerationJob>>, ForgeError> {
        let job_id = {
            let index = self.token_index.read().await;
            index
                .get(&token_id)
                .copied()
                .ok_or(ForgeError::TokenNotFound(token_id))?
        };
        self.get(job_id)
            .await
            .map_err(|_| ForgeError::TokenNotFound(token_id))
    }

    /// Returns snapshots of all jobs owned by `address`.
    ///
    /// Address comparison is byte equality on [`Address`], so mixed-case
    /// hex input matches once parsed.
    pub async fn user_jobs(&self, address: Address) -> Vec<GenerationJob> {
        let map = self.jobs.read().await;
        let mut jobs = Vec::new();
        for entry in map.values() {
            let job = entry.read().await;
            if job.user_address == address {
                jobs.push(job.clone());
            }
        }
        drop(map);
        jobs.sort_by_key(|job| job.created_at);
        jobs
    }

    /// Counts jobs per status.
    pub async fn stats(&self) -> JobStats {
        let map = self.jobs.read().await;
        let mut stats = JobStats::default();
        for entry in map.values() {
            let job = entry.read().await;
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Generating => stats.generating += 1,
                JobStatus::Uploading => stats.uploading += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
            stats.total += 1;
        }
        stats
    }

    /// Deletes jobs that are BOTH terminal AND older than `max_age`.
    ///
    /// Non-terminal jobs are never deleted regardless of age. Returns the
    /// number of jobs removed.
    pub async fn cleanup_old(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut expired = Vec::new();
        {
            let map = self.jobs.read().await;
            for (job_id, entry) in map.iter() {
                let job = entry.read().await;
                if job.status.is_terminal() && job.created_at < cutoff {
                    expired.push((*job_id, job.token_id));
                }
            }
        }

        if expired.is_empty() {
            return 0;
        }

        let mut map = self.jobs.write().await;
        let mut index = self.token_index.write().await;
        let mut removed = 0;
        for (job_id, token_id) in expired {
            if map.remove(&job_id).is_some() {
                removed += 1;
                // Only drop the index entry if it still points at this job;
                // a newer job for the same token keeps its lookup.
                if index.get(&token_id) == Some(&job_id) {
                    index.remove(&token_id);
                }
            }
        }
        removed
    }

    /// Returns the number of tracked jobs.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Returns `true` if the table contains no jobs.
    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}
