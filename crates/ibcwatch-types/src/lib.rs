//! Core types for ibcwatch.
//!
//! Two groups live here: the exporter's own configuration file
//! ([`config::ExporterConfig`]) and the IBC path records fetched from a chain
//! registry ([`path::Path`]). Both are plain data, validated once at load time
//! and shared read-only afterwards.

pub mod config;
pub mod error;
pub mod path;

pub use config::{
    Account, ExporterConfig, GitHubConfig, RefreshConfig, RetryConfig, RpcEndpoint, RpcMap,
    ServerConfig,
};
pub use error::{ConfigError, Result};
pub use path::{ChainEnd, Channel, ChannelEnd, Discord, Operator, Ordering, Path, WILDCARD};
