//! Runtime layer for DataOrganisms.
//!
//! Owns everything that touches the outside world: the file-backed session
//! store, the change-detecting snapshot feed, session lifecycle tracking, the
//! push-driven aggregation orchestrator and interaction-event sinks.

pub mod interaction_log;
pub mod orchestrator;
pub mod session_monitor;
pub mod snapshot_feed;
pub mod store;

pub use organisms_core as core;
pub use organisms_data as data;
