//! Collectors for the ibcwatch exporter.
//!
//! [`IbcCollector`] reports light client expiry and stuck packets for every
//! configured path, [`WalletCollector`] reports relayer wallet balances. Both
//! fan out one task per path or account on each scrape and are rebuilt from a
//! fresh [`ConfigGeneration`] by the [`Refresher`].

pub mod expiry;
pub mod ibc;
pub mod reconcile;
pub mod refresh;
pub mod retry;
pub mod source;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testing;

pub use expiry::{track_client_expiry, ClientExpiryResult};
pub use ibc::{IbcCollector, CLIENT_EXPIRY, STUCK_PACKETS};
pub use reconcile::{reconcile_path, ChannelReport, UnrelayedSequences};
pub use refresh::{ConfigGeneration, RefreshOutcome, RefreshState, Refresher};
pub use retry::RetryPolicy;
pub use source::{DirectorySource, GitHubSource, PathSource, SourceError};
pub use wallet::{DenomLabels, WalletCollector, WALLET_BALANCE};

use ibcwatch_chain::{ChainError, ChainInfo, ChainSession, SessionBuilder};
use ibcwatch_types::RpcEndpoint;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome label attached to every sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Error => "error",
        }
    }

    pub fn from_ok(ok: bool) -> Self {
        if ok {
            Status::Success
        } else {
            Status::Error
        }
    }

    /// Error if either side is an error
    pub fn and(self, other: Status) -> Status {
        Status::from_ok(self == Status::Success && other == Status::Success)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Open a session under the retry policy. A chain without an RPC endpoint is a
/// permanent config error.
pub(crate) async fn open_session(
    builder: &dyn SessionBuilder,
    chain_name: &str,
    rpc: Option<&RpcEndpoint>,
    client_id: Option<&str>,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> ibcwatch_chain::Result<Arc<dyn ChainSession>> {
    let rpc = rpc.ok_or_else(|| ChainError::Config(format!("no RPC endpoint for {chain_name}")))?;
    let info = ChainInfo::from_endpoint(rpc, client_id);
    policy.run("open_session", cancel, || builder.open(&info)).await
}
