//! rachsim configuration management
//!
//! This crate provides configuration loading and parsing for rachsim:
//! - TOML configuration file parsing
//! - Simulation configuration structures
//! - Shared config + deterministic RNG state

pub mod sim_config;
pub mod toml_config;

pub use sim_config::*;
pub use toml_config::*;
