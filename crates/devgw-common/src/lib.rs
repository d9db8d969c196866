//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the gateway runtime."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Configuration loading and tracing setup consumed across the gateway workspace.

pub mod config;
pub mod logging;

pub use config::{
    ApiConfig, AppConfig, Em300lrSettings, Etapu11Settings, FroniusSettings, HeliosSettings,
    LoadedAppConfig, LoggingConfig, MetricsConfig, NetatmoSettings, PollingConfig,
    WallboxSettings,
};
pub use logging::{init_tracing, LogFormat};
