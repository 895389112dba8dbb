//! Configuration management
//!
//! Handles loading backend selection, connection strings and pool settings.

pub mod settings;

pub use settings::{DatabaseConfig, PoolSettings, RestSettings, load_config};
