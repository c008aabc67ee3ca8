//! Chain sessions for ibcwatch.
//!
//! A [`ChainSession`] is an opened, query-ready handle to one chain endpoint,
//! optionally bound to the light client that chain hosts for its counterparty.
//! Sessions are built per scrape by a [`SessionBuilder`] and dropped when the
//! scrape ends. Nothing here retries; callers wrap calls in their own policy.

pub mod error;
pub mod proto;
pub mod rpc;
pub mod tendermint;

pub use error::{ChainError, Result};
pub use proto::{Coin, DenomTrace};
pub use tendermint::{TendermintSession, TendermintSessionBuilder};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use ibcwatch_types::{ChannelEnd, RpcEndpoint};
use std::sync::Arc;
use std::time::Duration;

/// Everything needed to open a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainInfo {
    pub chain_id: String,
    pub rpc_addr: String,
    pub timeout: Duration,
    /// Light client hosted on this chain; absent for wallet-only sessions
    pub client_id: Option<String>,
}

impl ChainInfo {
    pub fn from_endpoint(rpc: &RpcEndpoint, client_id: Option<&str>) -> Self {
        Self {
            chain_id: rpc.chain_id.clone(),
            rpc_addr: rpc.url.clone(),
            timeout: rpc.timeout(),
            client_id: client_id.map(str::to_string),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chain_id.is_empty() {
            return Err(ChainError::Config(format!("missing chain ID: {self:?}")));
        }
        if self.rpc_addr.is_empty() {
            return Err(ChainError::Config(format!("missing RPC address: {self:?}")));
        }
        if matches!(self.client_id.as_deref(), Some("")) {
            return Err(ChainError::Config(format!("missing client ID: {self:?}")));
        }
        Ok(())
    }
}

/// Light client parameters needed to compute expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStateInfo {
    pub trusting_period: TimeDelta,
    /// Revision height of the latest header the client trusts
    pub latest_height: u64,
}

/// Query capabilities of an opened chain session
#[async_trait]
pub trait ChainSession: Send + Sync {
    fn chain_id(&self) -> &str;

    fn client_id(&self) -> Option<&str>;

    /// Latest committed block height
    async fn latest_height(&self) -> Result<u64>;

    /// State of a light client hosted on this chain
    async fn client_state(&self, client_id: &str) -> Result<ClientStateInfo>;

    /// Header time of the block at `height`
    async fn block_time(&self, height: u64) -> Result<DateTime<Utc>>;

    /// Sequences this chain has committed to send on `channel`, as of `height`
    async fn packet_commitments(&self, height: u64, channel: &ChannelEnd) -> Result<Vec<u64>>;

    /// Subset of `sequences` this chain has not received on `channel`
    async fn unreceived_packets(
        &self,
        height: u64,
        channel: &ChannelEnd,
        sequences: &[u64],
    ) -> Result<Vec<u64>>;

    /// Next sequence this chain expects to receive on an ordered `channel`
    async fn next_sequence_receive(&self, height: u64, channel: &ChannelEnd) -> Result<u64>;

    async fn balances(&self, address: &str) -> Result<Vec<Coin>>;

    /// Resolve an `ibc/<hash>` denom
    async fn denom_trace(&self, denom: &str) -> Result<DenomTrace>;

    /// Expiry of the client bound to this session, which tracks `counterparty`.
    ///
    /// The client stops accepting updates once its latest trusted header is
    /// older than the trusting period, so expiry is the counterparty block time
    /// at that header plus the trusting period.
    async fn client_expiration(&self, counterparty: &dyn ChainSession) -> Result<DateTime<Utc>> {
        let client_id = self.client_id().ok_or_else(|| {
            ChainError::Config(format!("no client bound to session for {}", self.chain_id()))
        })?;

        let state = self.client_state(client_id).await?;
        let trusted_at = counterparty.block_time(state.latest_height).await?;

        trusted_at
            .checked_add_signed(state.trusting_period)
            .ok_or_else(|| ChainError::Rpc(format!("client {client_id} expiry out of range")))
    }
}

/// Opens sessions; the only place network sessions are established
#[async_trait]
pub trait SessionBuilder: Send + Sync {
    async fn open(&self, info: &ChainInfo) -> Result<Arc<dyn ChainSession>>;
}

/// Latest heights of both chains in one combined call
pub async fn query_latest_heights(
    a: &dyn ChainSession,
    b: &dyn ChainSession,
) -> Result<(u64, u64)> {
    tokio::try_join!(a.latest_height(), b.latest_height())
}
