//! Domain layer: job records, identifiers, mint events, and the event system.
//!
//! This module contains the server-side domain model: job identity, the
//! job state machine, normalized chain events, the broadcast bus for job
//! lifecycle events, and the concurrent job table.

pub mod event_bus;
pub mod job;
pub mod job_event;
pub mod job_id;
pub mod job_table;
pub mod mint_event;
pub mod rarity;

pub use event_bus::EventBus;
pub use job::{GenerationJob, JobStatus};
pub use job_event::JobEvent;
pub use job_id::JobId;
pub use job_table::{JobStats, JobTable};
pub use mint_event::MintEvent;
pub use rarity::RarityTier;
