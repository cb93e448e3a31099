//! Chunked, time-bounded batch fetching.
//!
//! A call list is split into consecutive chunks of at most `chunk_size`
//! calls. Chunks go out one after another, each under its own deadline and
//! racing the caller's cancellation token. Throughput comes from running many
//! fetchers at once (one per job), not from fanning out inside one fetch.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::retry::RetryPolicy;
use crate::rpc::{BatchTransport, RpcCall};

/// Issues call lists through a shared [`BatchTransport`].
#[derive(Clone)]
pub struct BatchFetcher {
    transport: Arc<dyn BatchTransport>,
    chunk_size: NonZeroUsize,
    timeout: Duration,
    retry: RetryPolicy,
}

impl BatchFetcher {
    pub fn new(
        transport: Arc<dyn BatchTransport>,
        chunk_size: NonZeroUsize,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            chunk_size,
            timeout,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.get()
    }

    /// Fetches every call and returns one result value per call, in order.
    ///
    /// # Errors
    /// The first failing chunk abandons the whole fetch: per-call node errors
    /// become [`FetchError::Rpc`], `null` results [`FetchError::MissingResult`],
    /// and transport failures that outlive the retry budget are returned as-is.
    pub async fn fetch(
        &self,
        calls: &[RpcCall],
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>, FetchError> {
        self.fetch_grouped(calls, 1, cancel).await
    }

    /// Like [`fetch`](Self::fetch), but never splits a run of `group`
    /// consecutive calls across two chunks. The chunk size is rounded down to
    /// a multiple of `group`, and is at least one group.
    ///
    /// # Errors
    /// Same as [`fetch`](Self::fetch).
    #[tracing::instrument(skip_all, fields(calls = calls.len(), chunk_size = self.grouped_chunk_size(group)))]
    pub async fn fetch_grouped(
        &self,
        calls: &[RpcCall],
        group: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>, FetchError> {
        let mut values = Vec::with_capacity(calls.len());

        for (index, chunk) in calls.chunks(self.grouped_chunk_size(group)).enumerate() {
            let results = self.send_chunk(chunk, cancel).await?;
            if results.len() != chunk.len() {
                return Err(FetchError::Inconsistent(format!(
                    "chunk {index}: sent {} calls, received {} results",
                    chunk.len(),
                    results.len()
                )));
            }

            for (call, result) in chunk.iter().zip(results) {
                match result {
                    Ok(Value::Null) => {
                        return Err(FetchError::MissingResult {
                            method: call.method.to_string(),
                            params: call.params_display(),
                        })
                    }
                    Ok(value) => values.push(value),
                    Err(err) => {
                        return Err(FetchError::Rpc {
                            method: call.method.to_string(),
                            code: err.code,
                            message: err.message,
                        })
                    }
                }
            }

            tracing::trace!(chunk = index, size = chunk.len(), "chunk fetched");
        }

        Ok(values)
    }

    fn grouped_chunk_size(&self, group: usize) -> usize {
        let group = group.max(1);
        let size = self.chunk_size.get();
        (size - size % group).max(group)
    }

    /// Sends one chunk, re-sending it on transport failures while the retry
    /// policy allows.
    async fn send_chunk(
        &self,
        chunk: &[RpcCall],
        cancel: &CancellationToken,
    ) -> Result<Vec<Result<Value, crate::rpc::RpcError>>, FetchError> {
        let mut attempt = 0u32;
        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                res = tokio::time::timeout(self.timeout, self.transport.batch_call(chunk)) => {
                    res.unwrap_or(Err(FetchError::Timeout { calls: chunk.len(), timeout: self.timeout }))
                }
            };

            match outcome {
                Err(err) if err.is_transport() => {
                    attempt += 1;
                    let Some(delay) = self.retry.next_delay(attempt) else {
                        return Err(err);
                    };
                    tracing::debug!(
                        attempt,
                        backoff_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying batch chunk"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                other => return other,
            }
        }
    }
}
