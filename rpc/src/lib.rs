//! JaxMine Upstream RPC Client
//!
//! Template fetching and block submission against a JAX node. The node
//! speaks JSON-RPC 1.0 over HTTP with two routing extras in the envelope:
//! `scope` and `shard_id` (0 addresses the beacon chain).

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod client;

pub use client::JsonRpcClient;

/// `shard_id` routing value for the beacon chain.
pub const BEACON_SHARD_ID: u32 = 0;

/// RPC client errors
#[derive(Debug, Error)]
pub enum RpcError {
    /// Transport-level failure: connect, timeout, TLS, body read
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("upstream returned HTTP {0}")]
    Http(u16),

    /// JSON-RPC error object in the reply
    #[error("upstream error {code}: {message}")]
    Server { code: i64, message: String },

    /// Reply did not match the expected shape
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The server URL could not be parsed
    #[error("invalid server url: {0}")]
    BadUrl(String),
}

/// Block template request parameters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TemplateRequest {
    pub capabilities: Vec<String>,
    #[serde(rename = "longpollid", skip_serializing_if = "Option::is_none")]
    pub long_poll_id: Option<String>,
}

impl TemplateRequest {
    /// The request every fetcher starts from: ask the node to include its
    /// coinbase in the template.
    pub fn coinbase_txn() -> Self {
        TemplateRequest {
            capabilities: vec!["coinbasetxn".to_string()],
            long_poll_id: None,
        }
    }
}

/// A transaction inside a block template.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateTx {
    /// Hex-encoded serialized transaction
    pub data: String,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub fee: Option<i64>,
}

/// Beacon chain block template.
#[derive(Debug, Clone, Deserialize)]
pub struct BeaconTemplate {
    pub version: i32,
    pub height: i64,
    #[serde(rename = "previousblockhash")]
    pub previous_hash: String,
    #[serde(rename = "prevblocksmmrroot")]
    pub prev_blocks_mmr_root: String,
    pub bits: String,
    pub target: String,
    #[serde(rename = "chainweight", default)]
    pub chain_weight: Option<String>,
    #[serde(rename = "curtime")]
    pub cur_time: i64,
    pub shards: u32,
    pub k: u32,
    #[serde(rename = "votek")]
    pub vote_k: u32,
    /// Hex-encoded Bitcoin auxiliary bundle
    #[serde(rename = "btcaux")]
    pub btc_aux: String,
    #[serde(rename = "coinbasetxn")]
    pub coinbase_txn: Option<TemplateTx>,
    #[serde(default)]
    pub transactions: Vec<TemplateTx>,
    #[serde(rename = "longpollid", default)]
    pub long_poll_id: Option<String>,
}

/// Shard chain block template.
#[derive(Debug, Clone, Deserialize)]
pub struct ShardTemplate {
    pub height: i64,
    #[serde(rename = "previousblockhash")]
    pub previous_hash: String,
    #[serde(rename = "prevblocksmmrroot")]
    pub prev_blocks_mmr_root: String,
    pub bits: String,
    pub target: String,
    #[serde(rename = "chainweight", default)]
    pub chain_weight: Option<String>,
    #[serde(rename = "curtime")]
    pub cur_time: i64,
    #[serde(default)]
    pub transactions: Vec<TemplateTx>,
    #[serde(rename = "longpollid", default)]
    pub long_poll_id: Option<String>,
}

/// One entry of the `listshards` reply.
#[derive(Debug, Clone, Deserialize)]
pub struct ShardInfo {
    pub enabled: bool,
    #[serde(rename = "genesisheight", default)]
    pub genesis_height: Option<i64>,
}

/// Reply of `listshards`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListShardsResult {
    #[serde(default)]
    pub shards: HashMap<u32, ShardInfo>,
}

/// The upstream operations the coordinator consumes. Kept as a trait so
/// the job and poller are testable against a recording mock.
#[async_trait]
pub trait RpcApi: Send + Sync {
    async fn list_shards(&self) -> Result<ListShardsResult, RpcError>;

    async fn get_beacon_block_template(
        &self,
        request: &TemplateRequest,
    ) -> Result<BeaconTemplate, RpcError>;

    async fn get_shard_block_template(
        &self,
        shard_id: u32,
        request: &TemplateRequest,
    ) -> Result<ShardTemplate, RpcError>;

    /// Submit a solved block, hex-encoded. `shard_id` 0 routes to the
    /// beacon chain.
    async fn submit_block(&self, shard_id: u32, block_hex: String) -> Result<(), RpcError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_request_serialization() {
        let mut request = TemplateRequest::coinbase_txn();
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["capabilities"][0], "coinbasetxn");
        assert!(value.get("longpollid").is_none());

        request.long_poll_id = Some("poll-1".to_string());
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["longpollid"], "poll-1");
    }

    #[test]
    fn test_beacon_template_deserialization() {
        let raw = serde_json::json!({
            "version": 536870912u32,
            "height": 622805,
            "previousblockhash": "c253104b336f4477c38816ba9806746a9a2f1b3cb9716686f33892c75be4fe4f",
            "prevblocksmmrroot": "1c024a4699f5cdaaabdaa0696b8136f96d691255c8e5625cd7e25246762d6ee4",
            "bits": "1e0dffff",
            "target": "000dffff00000000000000000000000000000000000000000000000000000000",
            "chainweight": "1200300",
            "curtime": 1630921923,
            "shards": 3,
            "k": 100003,
            "votek": 100003,
            "btcaux": "00",
            "coinbasetxn": { "data": "00" },
            "transactions": [],
            "longpollid": "beacon-42"
        });
        let template: BeaconTemplate = serde_json::from_value(raw).unwrap();
        assert_eq!(template.height, 622_805);
        assert_eq!(template.bits, "1e0dffff");
        assert_eq!(template.long_poll_id.as_deref(), Some("beacon-42"));
        assert!(template.coinbase_txn.is_some());
    }

    #[test]
    fn test_list_shards_deserialization() {
        let raw = serde_json::json!({
            "shards": {
                "1": { "enabled": true },
                "2": { "enabled": false, "genesisheight": 10 }
            }
        });
        let reply: ListShardsResult = serde_json::from_value(raw).unwrap();
        assert!(reply.shards[&1].enabled);
        assert!(!reply.shards[&2].enabled);
        assert_eq!(reply.shards[&2].genesis_height, Some(10));
    }
}
