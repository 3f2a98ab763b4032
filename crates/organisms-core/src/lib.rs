//! Core types for DataOrganisms.
//!
//! Session and telemetry models, the game and plot registries, the journal catalogue,
//! lifecycle status, configuration and shared helpers. Nothing here touches
//! the filesystem except settings persistence.

pub mod data_processors;
pub mod error;
pub mod events;
pub mod games;
pub mod journal;
pub mod models;
pub mod plots;
pub mod session_id;
pub mod session_status;
pub mod settings;
pub mod time_utils;

pub use error::{OrganismsError, Result};
