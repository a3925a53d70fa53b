// src/errors.rs

//! Crate-wide error type and `Result` alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CritpipeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Circular dependency detected in workflow graph")]
    CircularDependency,

    #[error("Invalid workflow start options: {0}")]
    InvalidStartOptions(String),

    #[error("Task source error: {0}")]
    SourceError(String),

    #[error("Stage `{stage}` failed: {reason}")]
    StageFailed { stage: String, reason: String },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CritpipeError>;
