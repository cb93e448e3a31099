//! Shared test helpers.
//!
//! [`MockChain`] serves blocks, transactions and receipts from memory behind
//! the [`BatchTransport`] seam, records every batch it sees and can inject
//! per-call failures. The remaining functions build fixtures with sensible
//! defaults.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{hex, U256};
use alloy::sol_types::{SolEvent, SolValue};
use async_trait::async_trait;
use explorer_data::rpc::{GET_BLOCK_BY_NUMBER, GET_TRANSACTION_BY_HASH, GET_TRANSACTION_RECEIPT};
use explorer_data::{
    BatchFetcher, BatchTransport, FetchError, RangeLoader, RpcCall, RpcError, Store,
};
use explorer_decode::events::{Transfer, TransferBatch, TransferSingle};
use explorer_sync::SyncConfig;
use serde_json::{json, Value};
use tokio::sync::Notify;

pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;

/// A log as the test wants it emitted; positional fields are filled in when
/// the block is added.
#[derive(Clone, Debug)]
pub struct MockLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
}

#[derive(Clone, Debug)]
pub struct MockTx {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub contract_address: Option<String>,
    pub logs: Vec<MockLog>,
}

impl MockTx {
    pub fn transfer(hash: String) -> Self {
        Self {
            hash,
            from: address(0xa11ce),
            to: Some(address(0xb0b)),
            contract_address: None,
            logs: Vec::new(),
        }
    }

    pub fn deploy(hash: String, created: String) -> Self {
        Self {
            to: None,
            contract_address: Some(created),
            ..Self::transfer(hash)
        }
    }

    pub fn with_log(mut self, log: MockLog) -> Self {
        self.logs.push(log);
        self
    }
}

#[derive(Default)]
pub struct MockChain {
    blocks: HashMap<u64, Value>,
    transactions: HashMap<String, Value>,
    receipts: HashMap<String, Value>,
    failing_blocks: HashSet<u64>,
    missing_receipts: HashSet<String>,
    stalled_blocks: HashMap<u64, Arc<Notify>>,
    batches: Mutex<Vec<Vec<RpcCall>>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds block `number` with `txs` in order.
    pub fn add_block(&mut self, number: u64, txs: Vec<MockTx>) -> &mut Self {
        let block_hash = block_hash(number);
        let timestamp = block_timestamp(number);
        let mut log_index = 0u64;

        for (index, tx) in txs.iter().enumerate() {
            self.transactions.insert(
                tx.hash.clone(),
                json!({
                    "hash": tx.hash,
                    "blockHash": block_hash,
                    "blockNumber": format!("0x{number:x}"),
                    "from": tx.from,
                    "to": tx.to,
                    "gas": "0x5208",
                    "gasPrice": "0x4a817c800",
                    "nonce": format!("0x{index:x}"),
                    "transactionIndex": format!("0x{index:x}"),
                    "value": "0xde0b6b3a7640000",
                    "input": "0x"
                }),
            );

            let logs: Vec<Value> = tx
                .logs
                .iter()
                .map(|log| {
                    let value = json!({
                        "address": log.address,
                        "topics": log.topics,
                        "data": log.data,
                        "blockNumber": format!("0x{number:x}"),
                        "blockHash": block_hash,
                        "transactionHash": tx.hash,
                        "logIndex": format!("0x{log_index:x}"),
                        "removed": false
                    });
                    log_index += 1;
                    value
                })
                .collect();

            self.receipts.insert(
                tx.hash.clone(),
                json!({
                    "transactionHash": tx.hash,
                    "gasUsed": "0x5208",
                    "effectiveGasPrice": "0x3b9aca00",
                    "contractAddress": tx.contract_address,
                    "status": "0x1",
                    "logs": logs
                }),
            );
        }

        self.blocks.insert(
            number,
            json!({
                "number": format!("0x{number:x}"),
                "hash": block_hash,
                "parentHash": self::block_hash(number.saturating_sub(1)),
                "nonce": "0x0000000000000000",
                "miner": address(0xfee),
                "difficulty": "0x0",
                "totalDifficulty": "0xc70d815d562d3cfa955",
                "extraData": "0x",
                "size": "0x220",
                "gasLimit": "0x1c9c380",
                "gasUsed": "0x5208",
                "timestamp": format!("0x{timestamp:x}"),
                "baseFeePerGas": "0x3b9aca00",
                "transactions": txs.iter().map(|tx| tx.hash.clone()).collect::<Vec<_>>()
            }),
        );
        self
    }

    /// Adds `count` blocks from `start`, each with `txs_per_block` plain
    /// transfers.
    pub fn add_blocks(&mut self, start: u64, count: u64, txs_per_block: u64) -> &mut Self {
        for number in start..start + count {
            let txs = (0..txs_per_block)
                .map(|index| MockTx::transfer(tx_hash(number, index)))
                .collect();
            self.add_block(number, txs);
        }
        self
    }

    /// Makes every request for block `number` fail with a node error.
    pub fn fail_block(&mut self, number: u64) -> &mut Self {
        self.failing_blocks.insert(number);
        self
    }

    /// Makes the receipt of `hash` come back as `null`.
    pub fn drop_receipt(&mut self, hash: &str) -> &mut Self {
        self.missing_receipts.insert(hash.to_string());
        self
    }

    /// Holds any batch requesting block `number` until `gate` is notified.
    pub fn stall_block(&mut self, number: u64, gate: Arc<Notify>) -> &mut Self {
        self.stalled_blocks.insert(number, gate);
        self
    }

    /// Block numbers requested so far, in request order.
    pub fn requested_blocks(&self) -> Vec<u64> {
        self.batches()
            .iter()
            .flatten()
            .filter(|call| call.method == GET_BLOCK_BY_NUMBER)
            .filter_map(|call| call.params.first().and_then(Value::as_str))
            .map(|param| {
                u64::from_str_radix(param.trim_start_matches("0x"), 16)
                    .expect("block number param is hex")
            })
            .collect()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches
            .lock()
            .expect("batch log poisoned")
            .iter()
            .map(Vec::len)
            .collect()
    }

    pub fn batches(&self) -> Vec<Vec<RpcCall>> {
        self.batches.lock().expect("batch log poisoned").clone()
    }

    fn respond(&self, call: &RpcCall) -> Result<Value, RpcError> {
        let param = call.params.first().and_then(Value::as_str).unwrap_or_default();
        match call.method {
            GET_BLOCK_BY_NUMBER => {
                let number = u64::from_str_radix(param.trim_start_matches("0x"), 16)
                    .expect("block number param is hex");
                if self.failing_blocks.contains(&number) {
                    return Err(RpcError {
                        code: -32000,
                        message: "header not found".to_string(),
                        data: None,
                    });
                }
                Ok(self.blocks.get(&number).cloned().unwrap_or(Value::Null))
            }
            GET_TRANSACTION_BY_HASH => Ok(self
                .transactions
                .get(param)
                .cloned()
                .unwrap_or(Value::Null)),
            GET_TRANSACTION_RECEIPT if self.missing_receipts.contains(param) => Ok(Value::Null),
            GET_TRANSACTION_RECEIPT => Ok(self.receipts.get(param).cloned().unwrap_or(Value::Null)),
            other => Err(RpcError {
                code: -32601,
                message: format!("method {other} not found"),
                data: None,
            }),
        }
    }
}

#[async_trait]
impl BatchTransport for MockChain {
    async fn batch_call(
        &self,
        calls: &[RpcCall],
    ) -> Result<Vec<Result<Value, RpcError>>, FetchError> {
        self.batches
            .lock()
            .expect("batch log poisoned")
            .push(calls.to_vec());
        let gate = calls
            .iter()
            .filter(|call| call.method == GET_BLOCK_BY_NUMBER)
            .filter_map(|call| call.params.first().and_then(Value::as_str))
            .filter_map(|param| u64::from_str_radix(param.trim_start_matches("0x"), 16).ok())
            .find_map(|number| self.stalled_blocks.get(&number).cloned());
        if let Some(gate) = gate {
            gate.notified().await;
        }
        tokio::task::yield_now().await;
        Ok(calls.iter().map(|call| self.respond(call)).collect())
    }
}

pub fn loader(chain: Arc<MockChain>, chunk_size: usize) -> RangeLoader {
    let fetcher = BatchFetcher::new(
        chain,
        NonZeroUsize::new(chunk_size).expect("chunk size must be non-zero"),
        Duration::from_secs(5),
    );
    RangeLoader::new(fetcher)
}

/// In-memory SQLite store with all migrations applied.
pub fn test_store() -> Store {
    Store::new(":memory:").expect("in-memory store should always open")
}

pub fn sync_config(workers: usize, range_size: u64, step: usize) -> SyncConfig {
    SyncConfig {
        rpc_url: "http://mock".to_string(),
        workers,
        range_size,
        step,
        ..SyncConfig::default()
    }
}

pub fn block_hash(number: u64) -> String {
    format!("0x{number:064x}")
}

/// Unique per `(block, index)`, never equal to a block hash of the fixture.
pub fn tx_hash(number: u64, index: u64) -> String {
    format!("0x{number:056x}{:08x}", index + 1)
}

pub fn address(n: u64) -> String {
    format!("0x{n:040x}")
}

pub fn block_timestamp(number: u64) -> u64 {
    GENESIS_TIMESTAMP + number * 12
}

/// Left-pads an address into a 32-byte topic.
pub fn address_topic(address: &str) -> String {
    format!("0x{:0>64}", address.trim_start_matches("0x"))
}

pub fn word(value: u64) -> String {
    format!("0x{value:064x}")
}

/// `Transfer(from, to, tokenId)` with the token id in the data word.
pub fn transfer_log(token: &str, from: &str, to: &str, token_id: u64) -> MockLog {
    MockLog {
        address: token.to_string(),
        topics: vec![
            hex::encode_prefixed(Transfer::SIGNATURE_HASH),
            address_topic(from),
            address_topic(to),
        ],
        data: word(token_id),
    }
}

pub fn transfer_single_log(token: &str, from: &str, to: &str, id: u64, value: u64) -> MockLog {
    MockLog {
        address: token.to_string(),
        topics: vec![
            hex::encode_prefixed(TransferSingle::SIGNATURE_HASH),
            address_topic(&address(0x0b)),
            address_topic(from),
            address_topic(to),
        ],
        data: hex::encode_prefixed((U256::from(id), U256::from(value)).abi_encode_params()),
    }
}

pub fn transfer_batch_log(
    token: &str,
    from: &str,
    to: &str,
    ids: &[u64],
    values: &[u64],
) -> MockLog {
    let ids: Vec<U256> = ids.iter().copied().map(U256::from).collect();
    let values: Vec<U256> = values.iter().copied().map(U256::from).collect();
    MockLog {
        address: token.to_string(),
        topics: vec![
            hex::encode_prefixed(TransferBatch::SIGNATURE_HASH),
            address_topic(&address(0x0b)),
            address_topic(from),
            address_topic(to),
        ],
        data: hex::encode_prefixed((ids, values).abi_encode_params()),
    }
}

/// LOG0 output: data only, no topics.
pub fn anonymous_log(emitter: &str) -> MockLog {
    MockLog {
        address: emitter.to_string(),
        topics: Vec::new(),
        data: word(3),
    }
}

/// A log whose signature is not a transfer event.
pub fn unrelated_log(emitter: &str) -> MockLog {
    MockLog {
        address: emitter.to_string(),
        topics: vec![word(0xdead_beef), address_topic(&address(1))],
        data: word(7),
    }
}
