//! JSON-RPC batch transport.
//!
//! The fetch stage only needs one primitive: send an ordered list of calls as
//! a single batch and get one result-or-error back per call, in order.
//! [`HttpTransport`] implements it over `reqwest`; tests plug in their own
//! [`BatchTransport`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FetchError;

pub const GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";
pub const GET_TRANSACTION_BY_HASH: &str = "eth_getTransactionByHash";
pub const GET_TRANSACTION_RECEIPT: &str = "eth_getTransactionReceipt";

/// One call of a batch: method name plus ordered parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct RpcCall {
    pub method: &'static str,
    pub params: Vec<Value>,
}

impl RpcCall {
    pub fn new(method: &'static str, params: Vec<Value>) -> Self {
        Self { method, params }
    }

    /// `eth_getBlockByNumber(hex(number), false)`.
    pub fn block_by_number(number: u64) -> Self {
        Self::new(
            GET_BLOCK_BY_NUMBER,
            vec![Value::String(format!("0x{number:x}")), Value::Bool(false)],
        )
    }

    pub fn transaction_by_hash(hash: &str) -> Self {
        Self::new(GET_TRANSACTION_BY_HASH, vec![Value::String(hash.to_string())])
    }

    pub fn transaction_receipt(hash: &str) -> Self {
        Self::new(GET_TRANSACTION_RECEIPT, vec![Value::String(hash.to_string())])
    }

    /// Compact rendering of the params for error messages.
    pub fn params_display(&self) -> String {
        Value::Array(self.params.clone()).to_string()
    }
}

/// JSON-RPC 2.0 error object reported by the node for a single call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Batched call primitive shared by all concurrently running jobs.
///
/// Implementations must not mix the calls of two invocations: each call list
/// is owned by the job that built it.
#[async_trait]
pub trait BatchTransport: Send + Sync {
    /// Sends `calls` as one batch. The outer error covers the whole batch;
    /// the inner results are positional, one per call.
    async fn batch_call(&self, calls: &[RpcCall])
        -> Result<Vec<Result<Value, RpcError>>, FetchError>;
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: &'a [Value],
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    id: Option<u64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// HTTP JSON-RPC client sending true batches (one JSON array per POST).
#[derive(Clone, Debug)]
pub struct HttpTransport {
    url: String,
    http: reqwest::Client,
}

impl HttpTransport {
    /// Builds a client for `url`. `request_timeout` bounds a single HTTP
    /// exchange; the fetcher applies its own per-batch deadline on top.
    ///
    /// # Errors
    /// Returns error if the URL is malformed or the HTTP client cannot be built.
    pub fn new(url: &str, request_timeout: Duration) -> Result<Self, FetchError> {
        reqwest::Url::parse(url)
            .map_err(|e| FetchError::Transport(format!("invalid RPC URL {url}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            url: url.to_string(),
            http,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BatchTransport for HttpTransport {
    async fn batch_call(
        &self,
        calls: &[RpcCall],
    ) -> Result<Vec<Result<Value, RpcError>>, FetchError> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let requests: Vec<JsonRpcRequest<'_>> = calls
            .iter()
            .enumerate()
            .map(|(id, call)| JsonRpcRequest {
                jsonrpc: "2.0",
                id: id as u64,
                method: call.method,
                params: &call.params,
            })
            .collect();

        let response = self.http.post(&self.url).json(&requests).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Transport(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body: Value = response.json().await?;
        let responses: Vec<JsonRpcResponse> = match body {
            Value::Array(_) => serde_json::from_value(body)
                .map_err(|e| FetchError::Transport(format!("malformed batch response: {e}")))?,
            // Some nodes answer a rejected batch with a single error object.
            other => {
                let single: JsonRpcResponse = serde_json::from_value(other).map_err(|e| {
                    FetchError::Transport(format!("malformed batch response: {e}"))
                })?;
                let message = single
                    .error
                    .map(|err| format!("batch rejected (code {}): {}", err.code, err.message))
                    .unwrap_or_else(|| "batch answered with a single response".to_string());
                return Err(FetchError::Transport(message));
            }
        };

        order_responses(calls.len(), responses)
    }
}

/// Lines responses up with their requests by id; nodes may answer a batch
/// in any order.
fn order_responses(
    expected: usize,
    responses: Vec<JsonRpcResponse>,
) -> Result<Vec<Result<Value, RpcError>>, FetchError> {
    if responses.len() != expected {
        return Err(FetchError::Inconsistent(format!(
            "sent {expected} calls, received {} responses",
            responses.len()
        )));
    }

    let mut by_id: HashMap<u64, JsonRpcResponse> = HashMap::with_capacity(expected);
    for response in responses {
        let id = response
            .id
            .ok_or_else(|| FetchError::Inconsistent("response without id".to_string()))?;
        by_id.insert(id, response);
    }

    (0..expected as u64)
        .map(|id| {
            let response = by_id
                .remove(&id)
                .ok_or_else(|| FetchError::Inconsistent(format!("no response for id {id}")))?;
            Ok(match response.error {
                Some(err) => Err(err),
                None => Ok(response.result.unwrap_or(Value::Null)),
            })
        })
        .collect()
}
