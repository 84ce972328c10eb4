/// Chain Fetcher collaborator: batch-queries a single epoch's data from the
/// upstream chain. Treated abstractly by the engine; this module defines
/// the trait plus a generic JSON-RPC reference implementation grounded on
/// the raw `reqwest` usage in `monitor.rs` (`get_rpc_chain_tip`,
/// `index_block_from_rpc`).
use async_trait::async_trait;
use serde::Deserialize;

use crate::epoch::Epoch;
use crate::error::FetchError;
use crate::types::{BlockHash, EpochData, PivotBlockSummary};

#[async_trait]
pub trait ChainFetcher: Send + Sync {
    /// Fetch one epoch's worth of data. `use_batch` is a passthrough hint
    /// for fetchers that can batch sub-requests server-side; the trait
    /// contract to the engine is unaffected by it.
    async fn query_epoch_data(&self, epoch: Epoch, use_batch: bool) -> Result<EpochData, FetchError>;
}

/// Minimal JSON-RPC response shape expected from the upstream node for a
/// single epoch query. Real deployments would have a richer, chain-specific
/// schema; this crate treats the wire-level chain client as an external
/// collaborator and only needs enough fields to build a `PivotBlockSummary`.
#[derive(Debug, Deserialize)]
struct EpochRpcResult {
    epoch: Epoch,
    hash: String,
    parent_hash: String,
    #[serde(default)]
    payload: Vec<u8>,
}

fn parse_hash(s: &str) -> Result<BlockHash, FetchError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).map_err(|e| FetchError::Other(anyhow::anyhow!(e)))?;
    let mut out = [0u8; 32];
    if bytes.len() != 32 {
        return Err(FetchError::Other(anyhow::anyhow!(
            "expected 32-byte hash, got {} bytes",
            bytes.len()
        )));
    }
    out.copy_from_slice(&bytes);
    Ok(BlockHash(out))
}

/// Generic JSON-RPC `ChainFetcher`, querying `POST {base_url}` with a
/// `get_epoch_data` method per call.
pub struct HttpChainFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChainFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ChainFetcher for HttpChainFetcher {
    async fn query_epoch_data(&self, epoch: Epoch, use_batch: bool) -> Result<EpochData, FetchError> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": epoch,
            "method": "get_epoch_data",
            "params": [epoch, use_batch],
        });

        let resp = self
            .client
            .post(&self.base_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| FetchError::Other(anyhow::anyhow!(e)))?;

        if resp.status() == reqwest::StatusCode::CONFLICT {
            return Err(FetchError::PivotSwitched(epoch));
        }

        let result: EpochRpcResult = resp
            .json()
            .await
            .map_err(|e| FetchError::Other(anyhow::anyhow!(e)))?;

        Ok(EpochData {
            pivot_block: PivotBlockSummary {
                epoch: result.epoch,
                hash: parse_hash(&result.hash)?,
                parent_hash: parse_hash(&result.parent_hash)?,
            },
            payload: result.payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hash_rejects_wrong_length() {
        assert!(parse_hash("0xabcd").is_err());
    }

    #[test]
    fn parse_hash_accepts_32_bytes() {
        let hex = "ab".repeat(32);
        let h = parse_hash(&hex).unwrap();
        assert_eq!(h, BlockHash([0xab; 32]));
    }
}
