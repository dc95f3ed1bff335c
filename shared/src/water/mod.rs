//! Shared water flow configuration.
//!
//! Cell types and storage live in [`crate::world::water`]; this module holds
//! the knobs the server-side simulation is tuned with.

pub mod config;

pub use config::{constants, WaterFlowConfig, WaterFlowPreset};
