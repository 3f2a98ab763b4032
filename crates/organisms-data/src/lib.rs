//! Data layer for DataOrganisms.
//!
//! Responsible for discovering and ingesting session snapshots, aggregating
//! them into a telemetry series, reshaping that series for charts and
//! running the top-level analysis pipeline.

pub mod adapters;
pub mod aggregator;
pub mod analysis;
pub mod reader;

pub use organisms_core as core;
