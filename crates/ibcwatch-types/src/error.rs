//! Configuration errors.

use thiserror::Error;

/// Errors raised while loading or validating configuration and path records
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file does not exist
    #[error("configuration file not found:: {0}")]
    FileNotFound(String),

    /// Figment could not read or deserialize the configuration sources
    #[error("failed to load configuration:: {0}")]
    Load(#[from] Box<figment::Error>),

    /// A field is present but holds an unusable value
    #[error("invalid configuration value:: {0}")]
    InvalidValue(String),

    /// A required field is empty or absent
    #[error("missing required field:: {0}")]
    MissingField(String),

    /// A chain name is referenced but has no `[[rpc]]` entry
    #[error("missing RPC config for chain:: {0}")]
    MissingRpc(String),

    /// A registry path record failed validation
    #[error("invalid path {path}:: {reason}")]
    InvalidPath { path: String, reason: String },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
