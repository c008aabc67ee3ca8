//! CometBFT-backed chain sessions.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use ibcwatch_types::ChannelEnd;
use prost::Message;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ChainError, Result};
use crate::proto::{self, paths, Coin, DenomTrace, PageRequest};
use crate::rpc::RpcClient;
use crate::{ChainInfo, ChainSession, ClientStateInfo, SessionBuilder};

/// Page size for paginated module queries
const PAGE_LIMIT: u64 = 1000;

/// Session talking to a CometBFT RPC endpoint
pub struct TendermintSession {
    info: ChainInfo,
    rpc: RpcClient,
}

impl TendermintSession {
    pub fn info(&self) -> &ChainInfo {
        &self.info
    }
}

#[async_trait]
impl ChainSession for TendermintSession {
    fn chain_id(&self) -> &str {
        &self.info.chain_id
    }

    fn client_id(&self) -> Option<&str> {
        self.info.client_id.as_deref()
    }

    async fn latest_height(&self) -> Result<u64> {
        self.rpc.latest_height().await
    }

    async fn client_state(&self, client_id: &str) -> Result<ClientStateInfo> {
        let request = proto::QueryClientStateRequest {
            client_id: client_id.to_string(),
        };
        let response: proto::QueryClientStateResponse =
            self.rpc.abci_query(paths::CLIENT_STATE, &request, 0).await?;

        let any = response.client_state.ok_or_else(|| {
            ChainError::Rpc(format!("client {client_id} on {} has no state", self.info.chain_id))
        })?;
        if any.type_url != proto::TENDERMINT_CLIENT_STATE {
            return Err(ChainError::Rpc(format!(
                "client {client_id} on {} has unsupported type {}",
                self.info.chain_id, any.type_url
            )));
        }

        let state = proto::TendermintClientState::decode(any.value.as_slice())
            .map_err(|e| ChainError::Rpc(format!("client {client_id}: invalid state: {e}")))?;

        let period = state.trusting_period.unwrap_or_default();
        let trusting_period = TimeDelta::try_seconds(period.seconds)
            .and_then(|secs| secs.checked_add(&TimeDelta::nanoseconds(i64::from(period.nanos))))
            .ok_or_else(|| {
                ChainError::Rpc(format!("client {client_id}: trusting period out of range"))
            })?;
        let latest_height = state.latest_height.map(|h| h.revision_height).unwrap_or_default();

        Ok(ClientStateInfo {
            trusting_period,
            latest_height,
        })
    }

    async fn block_time(&self, height: u64) -> Result<DateTime<Utc>> {
        self.rpc.block_time(height).await
    }

    async fn packet_commitments(&self, height: u64, channel: &ChannelEnd) -> Result<Vec<u64>> {
        let mut sequences = Vec::new();
        let mut key = Vec::new();

        loop {
            let request = proto::QueryPacketCommitmentsRequest {
                port_id: channel.port_id.clone(),
                channel_id: channel.channel_id.clone(),
                pagination: Some(PageRequest {
                    key,
                    limit: PAGE_LIMIT,
                    ..Default::default()
                }),
            };
            let response: proto::QueryPacketCommitmentsResponse = self
                .rpc
                .abci_query(paths::PACKET_COMMITMENTS, &request, height)
                .await?;

            sequences.extend(response.commitments.iter().map(|c| c.sequence));

            match response.pagination {
                Some(page) if !page.next_key.is_empty() => key = page.next_key,
                _ => break,
            }
        }

        sequences.sort_unstable();
        sequences.dedup();
        debug!(
            chain_id = %self.info.chain_id,
            channel_id = %channel.channel_id,
            height,
            count = sequences.len(),
            "Queried packet commitments"
        );
        Ok(sequences)
    }

    async fn unreceived_packets(
        &self,
        height: u64,
        channel: &ChannelEnd,
        sequences: &[u64],
    ) -> Result<Vec<u64>> {
        let request = proto::QueryUnreceivedPacketsRequest {
            port_id: channel.port_id.clone(),
            channel_id: channel.channel_id.clone(),
            packet_commitment_sequences: sequences.to_vec(),
        };
        let response: proto::QueryUnreceivedPacketsResponse = self
            .rpc
            .abci_query(paths::UNRECEIVED_PACKETS, &request, height)
            .await?;
        Ok(response.sequences)
    }

    async fn next_sequence_receive(&self, height: u64, channel: &ChannelEnd) -> Result<u64> {
        let request = proto::QueryNextSequenceReceiveRequest {
            port_id: channel.port_id.clone(),
            channel_id: channel.channel_id.clone(),
        };
        let response: proto::QueryNextSequenceReceiveResponse = self
            .rpc
            .abci_query(paths::NEXT_SEQUENCE_RECEIVE, &request, height)
            .await?;
        Ok(response.next_sequence_receive)
    }

    async fn balances(&self, address: &str) -> Result<Vec<Coin>> {
        let mut balances = Vec::new();
        let mut key = Vec::new();

        loop {
            let request = proto::QueryAllBalancesRequest {
                address: address.to_string(),
                pagination: Some(PageRequest {
                    key,
                    limit: PAGE_LIMIT,
                    ..Default::default()
                }),
            };
            let response: proto::QueryAllBalancesResponse =
                self.rpc.abci_query(paths::ALL_BALANCES, &request, 0).await?;

            balances.extend(response.balances);

            match response.pagination {
                Some(page) if !page.next_key.is_empty() => key = page.next_key,
                _ => break,
            }
        }

        Ok(balances)
    }

    async fn denom_trace(&self, denom: &str) -> Result<DenomTrace> {
        let request = proto::QueryDenomTraceRequest {
            hash: denom.strip_prefix("ibc/").unwrap_or(denom).to_string(),
        };
        let response: proto::QueryDenomTraceResponse =
            self.rpc.abci_query(paths::DENOM_TRACE, &request, 0).await?;

        response
            .denom_trace
            .ok_or_else(|| ChainError::Rpc(format!("no denom trace for {denom}")))
    }
}

/// Builds [`TendermintSession`]s, checking that the node serves the expected network
#[derive(Debug, Clone, Default)]
pub struct TendermintSessionBuilder;

impl TendermintSessionBuilder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SessionBuilder for TendermintSessionBuilder {
    async fn open(&self, info: &ChainInfo) -> Result<Arc<dyn ChainSession>> {
        info.validate()?;

        let rpc = RpcClient::new(&info.rpc_addr, info.timeout)?;
        let status = rpc.status().await.map_err(|e| match e {
            ChainError::Connection(msg) => ChainError::Connection(msg),
            other => ChainError::Init(format!("{} handshake failed: {other}", info.chain_id)),
        })?;

        if status.node_info.network != info.chain_id {
            return Err(ChainError::Init(format!(
                "{} serves network {}, expected {}",
                rpc.url(),
                status.node_info.network,
                info.chain_id
            )));
        }

        debug!(chain_id = %info.chain_id, rpc = %rpc.url(), "Opened chain session");

        Ok(Arc::new(TendermintSession {
            info: info.clone(),
            rpc,
        }))
    }
}
