//! Minimal CometBFT JSON-RPC client.
//!
//! Queries go out as JSON-RPC POSTs. Module queries use `abci_query` with a
//! hex-encoded protobuf request and a base64 protobuf response.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use prost::Message;
use reqwest::Client as HttpClient;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::{ChainError, Result};

/// JSON-RPC request envelope
#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

/// JSON-RPC response envelope
#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<String>,
}

/// `status` result, trimmed
#[derive(Deserialize, Debug)]
pub struct NodeStatus {
    pub node_info: NodeInfo,
    pub sync_info: SyncInfo,
}

#[derive(Deserialize, Debug)]
pub struct NodeInfo {
    pub network: String,
}

#[derive(Deserialize, Debug)]
pub struct SyncInfo {
    pub latest_block_height: String,
}

#[derive(Deserialize)]
struct BlockResult {
    block: Block,
}

#[derive(Deserialize)]
struct Block {
    header: BlockHeader,
}

#[derive(Deserialize)]
struct BlockHeader {
    time: DateTime<Utc>,
}

#[derive(Deserialize)]
struct AbciQueryResult {
    response: AbciResponse,
}

#[derive(Deserialize)]
struct AbciResponse {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    log: String,
    #[serde(default)]
    value: Option<String>,
}

/// HTTP client bound to one CometBFT RPC endpoint
#[derive(Clone)]
pub struct RpcClient {
    http: HttpClient,
    url: String,
}

impl RpcClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Init(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue one JSON-RPC call and decode its `result`
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(method, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::Rpc(format!(
                "{method} on {} returned http {status}",
                self.url
            )));
        }

        let payload: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| ChainError::Rpc(format!("{method} on {}: bad response: {e}", self.url)))?;

        if let Some(err) = payload.error {
            return Err(ChainError::Rpc(format!(
                "{method} on {} failed with code {}: {} {}",
                self.url,
                err.code,
                err.message,
                err.data.unwrap_or_default()
            )));
        }

        payload
            .result
            .ok_or_else(|| ChainError::Rpc(format!("{method} on {}: empty result", self.url)))
    }

    pub async fn status(&self) -> Result<NodeStatus> {
        self.call("status", json!({})).await
    }

    /// Latest committed block height
    pub async fn latest_height(&self) -> Result<u64> {
        let status = self.status().await?;
        status
            .sync_info
            .latest_block_height
            .parse()
            .map_err(|e| ChainError::Rpc(format!("invalid latest_block_height: {e}")))
    }

    /// Header time of the block at `height`
    pub async fn block_time(&self, height: u64) -> Result<DateTime<Utc>> {
        let result: BlockResult = self
            .call("block", json!({ "height": height.to_string() }))
            .await?;
        Ok(result.block.header.time)
    }

    /// Run a gRPC query through `abci_query`. A height of 0 means latest.
    pub async fn abci_query<Req, Resp>(&self, path: &str, request: &Req, height: u64) -> Result<Resp>
    where
        Req: Message,
        Resp: Message + Default,
    {
        let params = json!({
            "path": path,
            "data": hex::encode(request.encode_to_vec()),
            "height": height.to_string(),
            "prove": false,
        });

        let result: AbciQueryResult = self.call("abci_query", params).await?;
        if result.response.code != 0 {
            return Err(ChainError::Rpc(format!(
                "{path} failed with code {}: {}",
                result.response.code, result.response.log
            )));
        }

        let bytes = match result.response.value {
            Some(value) => STANDARD
                .decode(value)
                .map_err(|e| ChainError::Rpc(format!("{path}: invalid base64 value: {e}")))?,
            None => Vec::new(),
        };

        Resp::decode(bytes.as_slice())
            .map_err(|e| ChainError::Rpc(format!("{path}: invalid protobuf value: {e}")))
    }

    fn transport_error(&self, method: &str, err: reqwest::Error) -> ChainError {
        if err.is_connect() || err.is_timeout() {
            ChainError::Connection(format!("{method} on {}: {err}", self.url))
        } else {
            ChainError::Rpc(format!("{method} on {}: {err}", self.url))
        }
    }
}
