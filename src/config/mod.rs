// src/config/mod.rs

//! Configuration loading and validation for flowchain.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate that the stages form one linear chain and that triggers are
//!   well-formed (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, ConfigSection, EnvironmentSection, RawConfigFile, SchedulerSection, StageConfig,
    TriggerConfig, TriggerKind, WatchSection,
};
pub use validate::parse_clock_time;
