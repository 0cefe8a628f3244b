//! Service layer: business logic between transports and the domain.

pub mod job_service;

pub use job_service::JobService;
