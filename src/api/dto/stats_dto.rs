//! Statistics and monitoring DTOs.

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::JobStats;
use crate::generation::TierSnapshot;

/// Job counts per status plus the live rarity tier table.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsDto {
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
    /// Per-tier supply and probability snapshot.
    pub tiers: Vec<TierDto>,
}

impl StatsDto {
    /// Combines job counts with the tier snapshot.
    #[must_use]
    pub fn new(stats: JobStats, tiers: Vec<TierSnapshot>) -> Self {
        Self {
            pending: stats.pending,
            generating: stats.generating,
            uploading: stats.uploading,
            completed: stats.completed,
            failed: stats.failed,
            total: stats.total,
            tiers: tiers.into_iter().map(TierDto::from).collect(),
        }
    }
}

/// One rarity tier's supply state.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TierDto {
    /// Tier level (1–5).
    pub level: u8,
    /// Supply cap.
    pub limit: u32,
    /// Accepted draws so far.
    pub generated: u32,
    /// Current probability share in percent.
    pub current_chance: f64,
}

impl From<TierSnapshot> for TierDto {
    fn from(snapshot: TierSnapshot) -> Self {
        Self {
            level: snapshot.level,
            limit: snapshot.limit,
            generated: snapshot.generated,
            current_chance: snapshot.current_chance,
        }
    }
}

/// Envelope for `GET /stats`.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// Aggregate statistics.
    pub stats: StatsDto,
}
