//! In-memory chains for collector tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use ibcwatch_chain::{
    ChainError, ChainInfo, ChainSession, ClientStateInfo, Coin, DenomTrace, Result, SessionBuilder,
};
use ibcwatch_types::{
    Account, ChainEnd, Channel, ChannelEnd, Discord, Operator, Ordering, Path, RpcEndpoint, RpcMap,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Block time of height 0; height `h` is `h` seconds later
pub fn genesis() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1))
}

/// Scripted chain state shared by every session opened on it
#[derive(Default)]
pub struct MockChain {
    pub chain_id: String,
    pub height: u64,
    /// Light clients hosted here
    pub clients: HashMap<String, ClientStateInfo>,
    /// Committed sequences per local channel id
    pub commitments: HashMap<String, Vec<u64>>,
    /// Sequences not yet received per local channel id
    pub unreceived: HashMap<String, Vec<u64>>,
    /// Next expected receive sequence per local channel id
    pub next_recv: HashMap<String, u64>,
    pub balances: HashMap<String, Vec<Coin>>,
    pub traces: HashMap<String, DenomTrace>,
    /// Methods that always fail with a retryable error
    pub failing: Mutex<HashSet<&'static str>>,
    /// Methods that never complete
    pub hanging: Mutex<HashSet<&'static str>>,
    calls: Mutex<HashMap<&'static str, u32>>,
    /// Heights passed to height-pinned queries, per (method, channel id)
    heights: Mutex<HashMap<(&'static str, String), Vec<u64>>>,
}

impl MockChain {
    pub fn new(chain_id: &str, height: u64) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            height,
            ..Default::default()
        }
    }

    pub fn fail(&self, method: &'static str) {
        self.failing.lock().unwrap().insert(method);
    }

    pub fn hang(&self, method: &'static str) {
        self.hanging.lock().unwrap().insert(method);
    }

    pub fn calls(&self, method: &str) -> u32 {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    /// Heights `method` was queried at on local channel `channel_id`
    pub fn queried_at(&self, method: &'static str, channel_id: &str) -> Vec<u64> {
        self.heights
            .lock()
            .unwrap()
            .get(&(method, channel_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, method: &'static str, channel: &ChannelEnd, height: u64) {
        self.heights
            .lock()
            .unwrap()
            .entry((method, channel.channel_id.clone()))
            .or_default()
            .push(height);
    }

    async fn enter(&self, method: &'static str) -> Result<()> {
        *self.calls.lock().unwrap().entry(method).or_default() += 1;
        let hang = self.hanging.lock().unwrap().contains(method);
        if hang {
            std::future::pending::<()>().await;
        }
        if self.failing.lock().unwrap().contains(method) {
            return Err(ChainError::Rpc(format!("{method} unavailable on {}", self.chain_id)));
        }
        Ok(())
    }
}

pub struct MockSession {
    chain: Arc<MockChain>,
    client_id: Option<String>,
}

#[async_trait]
impl ChainSession for MockSession {
    fn chain_id(&self) -> &str {
        &self.chain.chain_id
    }

    fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    async fn latest_height(&self) -> Result<u64> {
        self.chain.enter("latest_height").await?;
        Ok(self.chain.height)
    }

    async fn client_state(&self, client_id: &str) -> Result<ClientStateInfo> {
        self.chain.enter("client_state").await?;
        self.chain
            .clients
            .get(client_id)
            .copied()
            .ok_or_else(|| ChainError::Rpc(format!("client {client_id} not found")))
    }

    async fn block_time(&self, height: u64) -> Result<DateTime<Utc>> {
        self.chain.enter("block_time").await?;
        Ok(genesis() + TimeDelta::seconds(height as i64))
    }

    async fn packet_commitments(&self, height: u64, channel: &ChannelEnd) -> Result<Vec<u64>> {
        self.chain.record("packet_commitments", channel, height);
        self.chain.enter("packet_commitments").await?;
        Ok(self
            .chain
            .commitments
            .get(&channel.channel_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn unreceived_packets(
        &self,
        height: u64,
        channel: &ChannelEnd,
        sequences: &[u64],
    ) -> Result<Vec<u64>> {
        self.chain.record("unreceived_packets", channel, height);
        self.chain.enter("unreceived_packets").await?;
        let pending = self
            .chain
            .unreceived
            .get(&channel.channel_id)
            .cloned()
            .unwrap_or_default();
        Ok(sequences
            .iter()
            .copied()
            .filter(|s| pending.contains(s))
            .collect())
    }

    async fn next_sequence_receive(&self, height: u64, channel: &ChannelEnd) -> Result<u64> {
        self.chain.record("next_sequence_receive", channel, height);
        self.chain.enter("next_sequence_receive").await?;
        Ok(self
            .chain
            .next_recv
            .get(&channel.channel_id)
            .copied()
            .unwrap_or(1))
    }

    async fn balances(&self, address: &str) -> Result<Vec<Coin>> {
        self.chain.enter("balances").await?;
        Ok(self
            .chain
            .balances
            .get(address)
            .cloned()
            .unwrap_or_default())
    }

    async fn denom_trace(&self, denom: &str) -> Result<DenomTrace> {
        self.chain.enter("denom_trace").await?;
        self.chain
            .traces
            .get(denom)
            .cloned()
            .ok_or_else(|| ChainError::Rpc(format!("no trace for {denom}")))
    }
}

/// Opens sessions on registered chains by chain id
#[derive(Default)]
pub struct MockBuilder {
    chains: HashMap<String, Arc<MockChain>>,
    unreachable: Mutex<HashSet<String>>,
    opens: Mutex<HashMap<String, u32>>,
}

impl MockBuilder {
    pub fn with(chains: Vec<Arc<MockChain>>) -> Self {
        Self {
            chains: chains
                .into_iter()
                .map(|c| (c.chain_id.clone(), c))
                .collect(),
            ..Default::default()
        }
    }

    pub fn unreachable(&self, chain_id: &str) {
        self.unreachable.lock().unwrap().insert(chain_id.to_string());
    }

    pub fn opens(&self, chain_id: &str) -> u32 {
        self.opens.lock().unwrap().get(chain_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl SessionBuilder for MockBuilder {
    async fn open(&self, info: &ChainInfo) -> Result<Arc<dyn ChainSession>> {
        info.validate()?;
        *self
            .opens
            .lock()
            .unwrap()
            .entry(info.chain_id.clone())
            .or_default() += 1;

        if self.unreachable.lock().unwrap().contains(&info.chain_id) {
            return Err(ChainError::Connection(format!("{} refused", info.rpc_addr)));
        }
        let chain = self
            .chains
            .get(&info.chain_id)
            .cloned()
            .ok_or_else(|| ChainError::Init(format!("unknown chain {}", info.chain_id)))?;

        Ok(Arc::new(MockSession {
            chain,
            client_id: info.client_id.clone(),
        }))
    }
}

pub fn rpc(chain_name: &str, chain_id: &str) -> RpcEndpoint {
    RpcEndpoint {
        chain_name: chain_name.to_string(),
        chain_id: chain_id.to_string(),
        url: format!("http://{chain_name}.test:26657"),
        timeout_secs: Some(1),
    }
}

pub fn rpc_map(entries: &[(&str, &str)]) -> RpcMap {
    entries
        .iter()
        .map(|(name, id)| (name.to_string(), rpc(name, id)))
        .collect()
}

pub fn channel(src: &str, dst: &str, ordering: Ordering) -> Channel {
    Channel {
        chain_1: ChannelEnd {
            channel_id: src.to_string(),
            port_id: "transfer".to_string(),
        },
        chain_2: ChannelEnd {
            channel_id: dst.to_string(),
            port_id: "transfer".to_string(),
        },
        ordering,
        version: "ics20-1".to_string(),
        tags: Default::default(),
    }
}

pub fn path(chain_1: &str, client_1: &str, chain_2: &str, client_2: &str, channels: Vec<Channel>) -> Path {
    Path {
        schema: String::new(),
        chain_1: ChainEnd {
            chain_name: chain_1.to_string(),
            client_id: client_1.to_string(),
            connection_id: String::new(),
        },
        chain_2: ChainEnd {
            chain_name: chain_2.to_string(),
            client_id: client_2.to_string(),
            connection_id: String::new(),
        },
        channels,
        operators: vec![Operator {
            name: "relayer".to_string(),
            discord: Discord {
                handle: "relayer".to_string(),
                id: "400123".to_string(),
            },
            ..Default::default()
        }],
    }
}

pub fn account(address: &str, chain_name: &str, denoms: &[&str]) -> Account {
    Account {
        address: address.to_string(),
        denom: denoms.iter().map(|d| d.to_string()).collect(),
        chain_name: chain_name.to_string(),
        tags: vec!["relayer".to_string(), "mainnet".to_string()],
    }
}

pub fn coin(denom: &str, amount: &str) -> Coin {
    Coin {
        denom: denom.to_string(),
        amount: amount.to_string(),
    }
}

pub fn client(trusting_days: i64, latest_height: u64) -> ClientStateInfo {
    ClientStateInfo {
        trusting_period: TimeDelta::days(trusting_days),
        latest_height,
    }
}
