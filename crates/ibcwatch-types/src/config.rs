//! Exporter configuration
//!
//! The configuration file is TOML. Values can be overridden from the
//! environment with the `IBCWATCH_` prefix (`__` separates nested keys), and
//! the GitHub token is read from `GITHUB_TOKEN`.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path as FsPath, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{ConfigError, Result};

/// Default per-RPC timeout when an endpoint does not set its own
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 5;

/// RPC endpoints keyed by chain name
pub type RpcMap = HashMap<String, RpcEndpoint>;

/// Top-level exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Timeout applied to RPC endpoints without an explicit `timeout_secs`
    #[serde(default = "default_rpc_timeout")]
    pub global_rpc_timeout_secs: u64,
    /// Chain RPC endpoints
    #[serde(default)]
    pub rpc: Vec<RpcEndpoint>,
    /// Wallets whose balances are exported
    #[serde(default)]
    pub accounts: Vec<Account>,
    /// Remote IBC path registry
    #[serde(default)]
    pub github: Option<GitHubConfig>,
    /// Local directory of IBC path JSON files, used instead of GitHub when set
    #[serde(default)]
    pub paths_dir: Option<PathBuf>,
    /// Token for the GitHub API, normally supplied through `GITHUB_TOKEN`
    #[serde(default, skip_serializing)]
    pub github_token: Option<String>,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// A chain RPC endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcEndpoint {
    /// Registry chain name, e.g. `archway`
    pub chain_name: String,
    /// On-chain network identifier, e.g. `archway-1`
    pub chain_id: String,
    /// CometBFT RPC URL
    pub url: String,
    /// Request timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl RpcEndpoint {
    /// Effective request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_RPC_TIMEOUT_SECS))
    }

    fn validate(&self) -> Result<()> {
        require("rpc.chain_name", &self.chain_name)?;
        require("rpc.chain_id", &self.chain_id)?;
        require("rpc.url", &self.url)?;

        let url = Url::parse(&self.url).map_err(|e| {
            ConfigError::InvalidValue(format!("rpc url {} for {}: {e}", self.url, self.chain_name))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidValue(format!(
                "rpc url {} for {} must use http or https",
                self.url, self.chain_name
            )));
        }

        // Explicit and scheme-default ports are both accepted.
        match url.port_or_known_default() {
            Some(port) if port > 0 => {}
            _ => {
                return Err(ConfigError::InvalidValue(format!(
                    "rpc url {} for {} has no usable port",
                    self.url, self.chain_name
                )))
            }
        }

        if self.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue(format!(
                "rpc timeout for {} must be positive",
                self.chain_name
            )));
        }

        Ok(())
    }
}

/// A wallet to watch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Bech32 account address
    pub address: String,
    /// Denominations to report; `ibc/<hash>` denoms are resolved to their base denom
    pub denom: Vec<String>,
    /// Chain name used to resolve the RPC endpoint
    pub chain_name: String,
    /// Free-form tags, exported comma-joined
    #[serde(default)]
    pub tags: Vec<String>,
}

/// GitHub-hosted IBC registry location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub org: String,
    pub repo: String,
    /// Mainnet `_IBC` directory inside the repository
    pub dir: String,
    /// Optional testnets `_IBC` directory
    #[serde(default)]
    pub testnets_dir: Option<String>,
    /// API base URL
    #[serde(default = "default_github_api")]
    pub api_url: String,
}

/// Collector refresh settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_refresh_interval")]
    pub interval_secs: u64,
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_refresh_interval(),
        }
    }
}

/// Retry budget for individual RPC calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub delay_ms: u64,
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            delay_ms: default_retry_delay(),
        }
    }
}

/// Metrics HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
    /// Upper bound on one scrape; unfinished tasks are cancelled
    #[serde(default = "default_scrape_timeout")]
    pub scrape_timeout_secs: u64,
}

impl ServerConfig {
    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_secs(self.scrape_timeout_secs)
    }

    /// Parsed bind address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_address.parse().map_err(|e| {
            ConfigError::InvalidValue(format!("listen address {}: {e}", self.listen_address))
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            metrics_path: default_metrics_path(),
            scrape_timeout_secs: default_scrape_timeout(),
        }
    }
}

fn default_rpc_timeout() -> u64 {
    DEFAULT_RPC_TIMEOUT_SECS
}

fn default_github_api() -> String {
    "https://api.github.com".to_string()
}

fn default_refresh_interval() -> u64 {
    300
}

fn default_retry_attempts() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    400
}

fn default_listen_address() -> String {
    "0.0.0.0:8008".to_string()
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_scrape_timeout() -> u64 {
    30
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField(field.to_string()));
    }
    Ok(())
}

impl ExporterConfig {
    /// Configuration sources in precedence order: file, `GITHUB_TOKEN`,
    /// then `IBCWATCH_*` overrides.
    pub fn figment<P: AsRef<FsPath>>(path: P) -> Figment {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::raw().only(&["GITHUB_TOKEN"]))
            .merge(Env::prefixed("IBCWATCH_").split("__"))
    }

    /// Load and validate configuration from a TOML file
    pub fn load<P: AsRef<FsPath>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let config: ExporterConfig = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string, ignoring the environment
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ExporterConfig = Figment::from(Toml::string(content)).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section; the first problem found is returned.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for rpc in &self.rpc {
            rpc.validate()?;
            if !names.insert(rpc.chain_name.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "duplicate rpc entry for chain {}",
                    rpc.chain_name
                )));
            }
        }

        for account in &self.accounts {
            require("accounts.address", &account.address)?;
            require("accounts.chain_name", &account.chain_name)?;
            if account.denom.is_empty() || account.denom.iter().any(|d| d.trim().is_empty()) {
                return Err(ConfigError::MissingField(format!(
                    "accounts.denom for {}",
                    account.address
                )));
            }
            if !names.contains(account.chain_name.as_str()) {
                return Err(ConfigError::MissingRpc(account.chain_name.clone()));
            }
        }

        if let Some(github) = &self.github {
            require("github.org", &github.org)?;
            require("github.repo", &github.repo)?;
            require("github.dir", &github.dir)?;
        }

        if self.global_rpc_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "global_rpc_timeout_secs must be positive".to_string(),
            ));
        }
        if self.retry.attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "retry.attempts must be at least 1".to_string(),
            ));
        }
        if self.refresh.interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "refresh.interval_secs must be positive".to_string(),
            ));
        }
        if self.server.scrape_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "server.scrape_timeout_secs must be positive".to_string(),
            ));
        }
        if !self.server.metrics_path.starts_with('/') {
            return Err(ConfigError::InvalidValue(format!(
                "server.metrics_path {} must start with /",
                self.server.metrics_path
            )));
        }
        self.server.socket_addr()?;

        Ok(())
    }

    /// RPC endpoints keyed by chain name, with missing timeouts filled from
    /// `global_rpc_timeout_secs`.
    pub fn rpc_map(&self) -> RpcMap {
        self.rpc
            .iter()
            .map(|rpc| {
                let mut rpc = rpc.clone();
                if rpc.timeout_secs.is_none() {
                    rpc.timeout_secs = Some(self.global_rpc_timeout_secs);
                }
                (rpc.chain_name.clone(), rpc)
            })
            .collect()
    }
}
