//! Protobuf messages for the Cosmos SDK and ibc-go gRPC queries used over
//! `abci_query`.
//!
//! Only the fields the exporter reads are declared; prost skips the rest when
//! decoding.

/// gRPC method paths passed as the `abci_query` path
pub mod paths {
    pub const CLIENT_STATE: &str = "/ibc.core.client.v1.Query/ClientState";
    pub const PACKET_COMMITMENTS: &str = "/ibc.core.channel.v1.Query/PacketCommitments";
    pub const UNRECEIVED_PACKETS: &str = "/ibc.core.channel.v1.Query/UnreceivedPackets";
    pub const NEXT_SEQUENCE_RECEIVE: &str = "/ibc.core.channel.v1.Query/NextSequenceReceive";
    pub const ALL_BALANCES: &str = "/cosmos.bank.v1beta1.Query/AllBalances";
    pub const DENOM_TRACE: &str = "/ibc.applications.transfer.v1.Query/DenomTrace";
}

/// Type URL of the Tendermint light client state
pub const TENDERMINT_CLIENT_STATE: &str = "/ibc.lightclients.tendermint.v1.ClientState";

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Height {
    #[prost(uint64, tag = "1")]
    pub revision_number: u64,
    #[prost(uint64, tag = "2")]
    pub revision_height: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PageRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub key: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub offset: u64,
    #[prost(uint64, tag = "3")]
    pub limit: u64,
    #[prost(bool, tag = "4")]
    pub count_total: bool,
    #[prost(bool, tag = "5")]
    pub reverse: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PageResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub next_key: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub total: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryClientStateRequest {
    #[prost(string, tag = "1")]
    pub client_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryClientStateResponse {
    #[prost(message, optional, tag = "1")]
    pub client_state: Option<prost_types::Any>,
    #[prost(bytes = "vec", tag = "2")]
    pub proof: Vec<u8>,
    #[prost(message, optional, tag = "3")]
    pub proof_height: Option<Height>,
}

/// `ibc.lightclients.tendermint.v1.ClientState`, trimmed
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TendermintClientState {
    #[prost(string, tag = "1")]
    pub chain_id: String,
    #[prost(message, optional, tag = "3")]
    pub trusting_period: Option<prost_types::Duration>,
    #[prost(message, optional, tag = "4")]
    pub unbonding_period: Option<prost_types::Duration>,
    #[prost(message, optional, tag = "7")]
    pub latest_height: Option<Height>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryPacketCommitmentsRequest {
    #[prost(string, tag = "1")]
    pub port_id: String,
    #[prost(string, tag = "2")]
    pub channel_id: String,
    #[prost(message, optional, tag = "3")]
    pub pagination: Option<PageRequest>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PacketState {
    #[prost(string, tag = "1")]
    pub port_id: String,
    #[prost(string, tag = "2")]
    pub channel_id: String,
    #[prost(uint64, tag = "3")]
    pub sequence: u64,
    #[prost(bytes = "vec", tag = "4")]
    pub data: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryPacketCommitmentsResponse {
    #[prost(message, repeated, tag = "1")]
    pub commitments: Vec<PacketState>,
    #[prost(message, optional, tag = "2")]
    pub pagination: Option<PageResponse>,
    #[prost(message, optional, tag = "3")]
    pub height: Option<Height>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryUnreceivedPacketsRequest {
    #[prost(string, tag = "1")]
    pub port_id: String,
    #[prost(string, tag = "2")]
    pub channel_id: String,
    #[prost(uint64, repeated, tag = "3")]
    pub packet_commitment_sequences: Vec<u64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryUnreceivedPacketsResponse {
    #[prost(uint64, repeated, tag = "1")]
    pub sequences: Vec<u64>,
    #[prost(message, optional, tag = "2")]
    pub height: Option<Height>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryNextSequenceReceiveRequest {
    #[prost(string, tag = "1")]
    pub port_id: String,
    #[prost(string, tag = "2")]
    pub channel_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryNextSequenceReceiveResponse {
    #[prost(uint64, tag = "1")]
    pub next_sequence_receive: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub proof: Vec<u8>,
    #[prost(message, optional, tag = "3")]
    pub proof_height: Option<Height>,
}

/// `cosmos.base.v1beta1.Coin`; the amount is a decimal integer string
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct Coin {
    #[prost(string, tag = "1")]
    pub denom: String,
    #[prost(string, tag = "2")]
    pub amount: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryAllBalancesRequest {
    #[prost(string, tag = "1")]
    pub address: String,
    #[prost(message, optional, tag = "2")]
    pub pagination: Option<PageRequest>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryAllBalancesResponse {
    #[prost(message, repeated, tag = "1")]
    pub balances: Vec<Coin>,
    #[prost(message, optional, tag = "2")]
    pub pagination: Option<PageResponse>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryDenomTraceRequest {
    /// Hash part of an `ibc/<hash>` denom
    #[prost(string, tag = "1")]
    pub hash: String,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct DenomTrace {
    #[prost(string, tag = "1")]
    pub path: String,
    #[prost(string, tag = "2")]
    pub base_denom: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryDenomTraceResponse {
    #[prost(message, optional, tag = "1")]
    pub denom_trace: Option<DenomTrace>,
}
