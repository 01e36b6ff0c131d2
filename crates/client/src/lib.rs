//! Bulk-screening client for the recruiting backend.
//!
//! Keeps a resilient push channel open for a logged-in session, decodes
//! the typed screening events it carries, and reconciles them with polled
//! progress snapshots into one consistent view per job posting. Commands
//! (start, pause, reset, advance) go through the same per-posting
//! controller so they are ordered with respect to pushed updates.

pub mod api;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod heartbeat;
pub mod manager;
pub mod messages;
pub mod reconnect;
pub mod screening;
pub mod session;
