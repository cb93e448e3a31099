//! Type definitions for raw node responses and the normalized records
//! persisted for every synced range.

use serde::{Deserialize, Serialize};

/// Block header as returned by `eth_getBlockByNumber(number, false)`.
///
/// Quantities stay hex-encoded exactly as the node sent them; the decoder
/// owns parsing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBlock {
    pub number: String,
    pub hash: String,
    pub parent_hash: String,
    #[serde(default)]
    pub nonce: Option<String>,
    pub miner: String,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub total_difficulty: Option<String>,
    #[serde(default)]
    pub extra_data: String,
    #[serde(default)]
    pub size: Option<String>,
    pub gas_limit: String,
    pub gas_used: String,
    pub timestamp: String,
    #[serde(default)]
    pub base_fee_per_gas: Option<String>,
    /// Transaction hashes, in block order.
    #[serde(default)]
    pub transactions: Vec<String>,
}

/// Transaction as returned by `eth_getTransactionByHash`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub hash: String,
    pub block_hash: String,
    pub block_number: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    pub gas: String,
    #[serde(default)]
    pub gas_price: Option<String>,
    pub nonce: String,
    pub transaction_index: String,
    pub value: String,
    #[serde(default)]
    pub input: String,
    /// Parent block timestamp (hex). Not sent by the node, filled by the loader.
    #[serde(default)]
    pub timestamp: String,
}

/// Receipt as returned by `eth_getTransactionReceipt`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReceipt {
    pub transaction_hash: String,
    pub gas_used: String,
    #[serde(default)]
    pub effective_gas_price: Option<String>,
    #[serde(default)]
    pub contract_address: Option<String>,
    /// Absent on pre-Byzantium receipts, which carry a state root instead.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub logs: Vec<RawLog>,
}

/// Event log embedded in a receipt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: String,
    pub block_hash: String,
    pub transaction_hash: String,
    pub log_index: String,
    #[serde(default)]
    pub removed: Option<bool>,
}

/// Everything the loader fetched for one range.
///
/// `transactions[i]` and `receipts[i]` always describe the same hash.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawRange {
    pub blocks: Vec<RawBlock>,
    pub transactions: Vec<RawTransaction>,
    pub receipts: Vec<RawReceipt>,
}

/// Normalized block row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Block hash (lowercase hex with 0x).
    pub hash: String,
    pub number: u64,
    pub parent_hash: String,
    pub nonce: String,
    /// Miner/coinbase address (lowercase hex with 0x).
    pub miner: String,
    /// Difficulty (base-10).
    pub difficulty: String,
    /// Total difficulty (base-10, empty when the node omits it).
    pub total_difficulty: String,
    /// Extra data (hex with 0x).
    pub extra_data: String,
    pub size: u64,
    /// Gas limit (base-10).
    pub gas_limit: String,
    /// Gas used (base-10).
    pub gas_used: String,
    /// Base fee per gas in Wei (base-10, empty before London).
    pub base_fee_per_gas: String,
    /// Timestamp in unix seconds.
    pub timestamp: u64,
    pub transaction_count: u64,
}

/// Transaction merged with its receipt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: String,
    pub block_hash: String,
    pub block_number: u64,
    pub from: String,
    /// Recipient (None for contract creation).
    pub to: Option<String>,
    /// Gas limit (base-10).
    pub gas: String,
    /// Gas used from the receipt (base-10).
    pub gas_used: String,
    /// Effective gas price when the receipt has one, else the tx gas price (base-10).
    pub gas_price: String,
    pub nonce: u64,
    pub transaction_index: u64,
    /// Value in Wei (base-10).
    pub value: String,
    /// Created contract, taken from the receipt.
    pub contract_address: Option<String>,
    /// Execution status (1=success, 0=revert, None before Byzantium).
    pub status: Option<u8>,
    /// Parent block timestamp in unix seconds.
    pub timestamp: u64,
    /// Input data (hex with 0x).
    pub input_data: String,
}

/// Event log row, keyed by `(block_hash, log_index)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub block_hash: String,
    pub log_index: u64,
    pub transaction_hash: String,
    /// Emitting contract (lowercase hex with 0x).
    pub address: String,
    pub block_number: u64,
    /// Event signature topic; `None` for anonymous (LOG0) events.
    pub topic0: Option<String>,
    pub topic1: Option<String>,
    pub topic2: Option<String>,
    pub topic3: Option<String>,
    /// Non-indexed data (hex with 0x).
    pub data: String,
}

/// Links a created contract to the transaction that deployed it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub address: String,
    pub transaction_hash: String,
    pub creator: String,
    pub block_number: u64,
}

/// Token standard inferred from the transfer event shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenType {
    #[serde(rename = "ERC721")]
    Erc721,
    #[serde(rename = "ERC1155")]
    Erc1155,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Erc721 => "ERC721",
            Self::Erc1155 => "ERC1155",
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One token movement decoded from a transfer event.
///
/// Batch events yield one record per `(id, value)` pair, distinguished by
/// `batch_index`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftTransferRecord {
    pub block_hash: String,
    pub log_index: u64,
    pub batch_index: u32,
    pub transaction_hash: String,
    /// Token contract (the log emitter).
    pub contract_address: String,
    pub from: String,
    pub to: String,
    /// Token id (base-10, unbounded).
    pub token_id: String,
    /// Amount moved (base-10, empty for ERC-721 transfers).
    pub value: String,
    pub token_type: TokenType,
}

/// Records produced by one successful range sync.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub blocks: Vec<BlockRecord>,
    pub transactions: Vec<TransactionRecord>,
    pub logs: Vec<LogRecord>,
    pub nft_transfers: Vec<NftTransferRecord>,
    pub contracts: Vec<ContractRecord>,
}

impl JobResult {
    /// Total number of rows across all record sets.
    pub fn row_count(&self) -> usize {
        self.blocks.len()
            + self.transactions.len()
            + self.logs.len()
            + self.nft_transfers.len()
            + self.contracts.len()
    }
}
