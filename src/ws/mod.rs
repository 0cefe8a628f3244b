//! WebSocket layer: connection handling, message routing, subscriptions.
//!
//! The WebSocket endpoint at `/ws` pushes job lifecycle events to
//! clients, filtered by token ID subscription.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
