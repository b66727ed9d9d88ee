//! JSON-RPC client over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use provenet_core::Address;

use crate::types::{format_address, parse_quantity};
use crate::{ChainError, Log, LogFilter, Result};

#[derive(Serialize)]
struct RpcRequest<'a, P: Serialize> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Thin client for the three eth endpoints the coordinator consumes.
pub struct ChainClient {
    endpoint: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl ChainClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn request<P: Serialize, R: DeserializeOwned>(&self, method: &str, params: P) -> Result<R> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let response: RpcResponse<R> = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(ChainError::Rpc { code: error.code, message: error.message });
        }
        response
            .result
            .ok_or_else(|| ChainError::InvalidResponse(format!("{}: empty result", method)))
    }

    /// Current chain tip height.
    pub async fn block_number(&self) -> Result<u64> {
        let result: String = self.request("eth_blockNumber", json!([])).await?;
        parse_quantity(&result)
    }

    /// Logs matching the filter, in node order.
    pub async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>> {
        self.request("eth_getLogs", json!([filter])).await
    }

    /// Read-only contract call at the latest block.
    pub async fn call(&self, to: &Address, data: &[u8]) -> Result<Vec<u8>> {
        let params = json!([
            {
                "to": format_address(to),
                "data": format!("0x{}", hex::encode(data)),
            },
            "latest"
        ]);
        let result: String = self.request("eth_call", params).await?;
        hex::decode(result.trim_start_matches("0x"))
            .map_err(|_| ChainError::InvalidResponse(format!("bad call result: {}", result)))
    }

    /// Format helper exposed for log statements.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl std::fmt::Debug for ChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainClient").field("endpoint", &self.endpoint).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_classification() {
        let ahead = ChainError::Rpc {
            code: -32000,
            message: "start block > tip height".to_string(),
        };
        assert!(ahead.is_ahead_of_tip());
        assert!(!ahead.is_invalid_token());

        let end_of_registry = ChainError::Rpc {
            code: 3,
            message: "execution reverted: ERC721: invalid token ID".to_string(),
        };
        assert!(end_of_registry.is_invalid_token());
        assert!(!end_of_registry.is_ahead_of_tip());
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#;
        let response: RpcResponse<String> = serde_json::from_str(body).unwrap();
        assert_eq!(response.result.as_deref(), Some("0x10"));

        let body = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"boom"}}"#;
        let response: RpcResponse<String> = serde_json::from_str(body).unwrap();
        assert_eq!(response.error.unwrap().code, -32000);
    }
}
