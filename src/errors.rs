// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowchainError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Stage not found: {0}")]
    StageNotFound(String),

    #[error("Trigger not found: {0}")]
    TriggerNotFound(String),

    #[error("Invalid stage chain: {0}")]
    ChainShape(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Failed to register trigger '{trigger}': {message}")]
    Registration { trigger: String, message: String },

    #[error("Another chain run holds the lease {path:?} (pid {pid}, since {since})")]
    LeaseHeld {
        path: PathBuf,
        pid: u32,
        since: String,
    },

    #[error("Environment setup failed: {0}")]
    Setup(#[from] crate::exec::setup::SetupError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, FlowchainError>;
