//! Data Transfer Objects for REST request/response serialization.
//!
//! Wire names follow the frontend's camelCase convention; domain types
//! never cross the API boundary directly.

pub mod event_dto;
pub mod job_dto;
pub mod stats_dto;

pub use event_dto::*;
pub use job_dto::*;
pub use stats_dto::*;
