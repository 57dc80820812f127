//! # warden-config
//!
//! Configuration system for the Warden control plane. Reads from
//! `warden.toml` with environment-variable overrides, in that precedence
//! order, and validates before startup.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{
    ConfigWarning, DriftConfig, GatesConfig, GovernanceConfig, IncidentConfig, LoggingConfig,
    RiskConfig, ServerConfig, WardenConfig,
};
