//! Raw node data to persistable records.
//!
//! Everything here is a pure function of its input: decoding the same
//! [`RawRange`] twice yields identical record sets.

use alloy::primitives::{hex, Address, B256, U256};
use alloy::sol_types::SolEvent;
use explorer_data::types::{
    BlockRecord, ContractRecord, JobResult, LogRecord, NftTransferRecord, RawBlock, RawLog,
    RawRange, RawReceipt, RawTransaction, TokenType, TransactionRecord,
};

use crate::error::DecodeError;
use crate::events::{self, classify, TransferEvent};
use crate::quantity::{
    decode_bytes, normalize_address, normalize_data, normalize_hash, normalize_optional_address,
    parse_decimal, parse_optional_decimal, parse_u64,
};

/// Per-run decoding switches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Emit log and NFT transfer records. When off only blocks, transactions
    /// and contracts are produced.
    pub decode_logs: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self { decode_logs: true }
    }
}

/// Decodes a whole range.
///
/// # Errors
/// Returns the first fatal [`DecodeError`]. Log-scoped failures are logged
/// and skipped.
pub fn decode_range(raw: &RawRange, options: DecodeOptions) -> Result<JobResult, DecodeError> {
    if raw.transactions.len() != raw.receipts.len() {
        return Err(DecodeError::Unpaired {
            transactions: raw.transactions.len(),
            receipts: raw.receipts.len(),
        });
    }

    let mut result = JobResult {
        blocks: raw
            .blocks
            .iter()
            .map(decode_block)
            .collect::<Result<_, _>>()?,
        ..Default::default()
    };

    for (tx, receipt) in raw.transactions.iter().zip(&raw.receipts) {
        let record = decode_transaction(tx, receipt)?;
        if let Some(contract) = decode_contract(&record) {
            result.contracts.push(contract);
        }
        result.transactions.push(record);

        if !options.decode_logs {
            continue;
        }

        for log in &receipt.logs {
            let record = decode_log(log)?;

            if log.topics.len() > MAX_TOPICS {
                tracing::warn!(
                    tx_hash = %record.transaction_hash,
                    log_index = record.log_index,
                    error = %DecodeError::TopicCount(log.topics.len()),
                    "storing first four topics, skipping nft transfer decode"
                );
                result.logs.push(record);
                continue;
            }

            match decode_nft_transfers(&record) {
                Ok(transfers) => result.nft_transfers.extend(transfers),
                Err(err) => tracing::warn!(
                    tx_hash = %record.transaction_hash,
                    log_index = record.log_index,
                    error = %err,
                    "skipping nft transfer decode"
                ),
            }
            result.logs.push(record);
        }
    }

    Ok(result)
}

pub fn decode_block(block: &RawBlock) -> Result<BlockRecord, DecodeError> {
    Ok(BlockRecord {
        hash: normalize_hash("block.hash", &block.hash)?,
        number: parse_u64("block.number", &block.number)?,
        parent_hash: normalize_hash("block.parentHash", &block.parent_hash)?,
        nonce: block
            .nonce
            .as_deref()
            .map(|nonce| normalize_data("block.nonce", nonce))
            .transpose()?
            .unwrap_or_default(),
        miner: normalize_address("block.miner", &block.miner)?,
        difficulty: parse_optional_decimal("block.difficulty", block.difficulty.as_deref())?,
        total_difficulty: parse_optional_decimal(
            "block.totalDifficulty",
            block.total_difficulty.as_deref(),
        )?,
        extra_data: normalize_data("block.extraData", &block.extra_data)?,
        size: block
            .size
            .as_deref()
            .map(|size| parse_u64("block.size", size))
            .transpose()?
            .unwrap_or_default(),
        gas_limit: parse_decimal("block.gasLimit", &block.gas_limit)?,
        gas_used: parse_decimal("block.gasUsed", &block.gas_used)?,
        base_fee_per_gas: parse_optional_decimal(
            "block.baseFeePerGas",
            block.base_fee_per_gas.as_deref(),
        )?,
        timestamp: parse_u64("block.timestamp", &block.timestamp)?,
        transaction_count: block.transactions.len() as u64,
    })
}

/// Merges a transaction with its receipt; status, gas used and contract
/// address come from the receipt.
pub fn decode_transaction(
    tx: &RawTransaction,
    receipt: &RawReceipt,
) -> Result<TransactionRecord, DecodeError> {
    let status = receipt
        .status
        .as_deref()
        .map(|status| match parse_u64("receipt.status", status)? {
            0 => Ok(0u8),
            1 => Ok(1u8),
            _ => Err(DecodeError::malformed("receipt.status", status)),
        })
        .transpose()?;

    Ok(TransactionRecord {
        hash: normalize_hash("tx.hash", &tx.hash)?,
        block_hash: normalize_hash("tx.blockHash", &tx.block_hash)?,
        block_number: parse_u64("tx.blockNumber", &tx.block_number)?,
        from: normalize_address("tx.from", &tx.from)?,
        to: normalize_optional_address("tx.to", tx.to.as_deref())?,
        gas: parse_decimal("tx.gas", &tx.gas)?,
        gas_used: parse_decimal("receipt.gasUsed", &receipt.gas_used)?,
        gas_price: parse_optional_decimal(
            "tx.gasPrice",
            receipt
                .effective_gas_price
                .as_deref()
                .or(tx.gas_price.as_deref()),
        )?,
        nonce: parse_u64("tx.nonce", &tx.nonce)?,
        transaction_index: parse_u64("tx.transactionIndex", &tx.transaction_index)?,
        value: parse_decimal("tx.value", &tx.value)?,
        contract_address: normalize_optional_address(
            "receipt.contractAddress",
            receipt.contract_address.as_deref(),
        )?,
        status,
        timestamp: parse_u64("tx.timestamp", &tx.timestamp)?,
        input_data: normalize_data("tx.input", &tx.input)?,
    })
}

/// Contract creation, when the receipt reported a created address.
pub fn decode_contract(tx: &TransactionRecord) -> Option<ContractRecord> {
    tx.contract_address
        .as_ref()
        .map(|address| ContractRecord {
            address: address.clone(),
            transaction_hash: tx.hash.clone(),
            creator: tx.from.clone(),
            block_number: tx.block_number,
        })
}

/// Topic slots of a log row; the EVM emits at most four (LOG0..LOG4).
const MAX_TOPICS: usize = 4;

/// Decodes one receipt log.
///
/// Anonymous events (no topics) keep every topic slot empty. Topics past the
/// fourth are not stored.
///
/// # Errors
/// Fatal errors for malformed positions, topics or data.
pub fn decode_log(log: &RawLog) -> Result<LogRecord, DecodeError> {
    let mut topics = log
        .topics
        .iter()
        .take(MAX_TOPICS)
        .map(|topic| normalize_hash("log.topic", topic));

    Ok(LogRecord {
        block_hash: normalize_hash("log.blockHash", &log.block_hash)?,
        log_index: parse_u64("log.logIndex", &log.log_index)?,
        transaction_hash: normalize_hash("log.transactionHash", &log.transaction_hash)?,
        address: normalize_address("log.address", &log.address)?,
        block_number: parse_u64("log.blockNumber", &log.block_number)?,
        topic0: topics.next().transpose()?,
        topic1: topics.next().transpose()?,
        topic2: topics.next().transpose()?,
        topic3: topics.next().transpose()?,
        data: normalize_data("log.data", &log.data)?,
    })
}

/// Transfer records carried by a log, if its topic0 is a known transfer
/// signature.
///
/// Unknown signatures and logs with too few topics yield an empty list.
///
/// # Errors
/// Log-scoped errors when the log claims a transfer signature but its data
/// does not fit the event layout.
pub fn decode_nft_transfers(log: &LogRecord) -> Result<Vec<NftTransferRecord>, DecodeError> {
    let topics: Vec<B256> = [
        log.topic0.as_ref(),
        log.topic1.as_ref(),
        log.topic2.as_ref(),
        log.topic3.as_ref(),
    ]
    .into_iter()
    .flatten()
    .map(|topic| {
        topic
            .parse::<B256>()
            .map_err(|_| DecodeError::malformed("log.topic", topic))
    })
    .collect::<Result<_, _>>()?;

    let Some(event) = topics.first().and_then(classify) else {
        return Ok(Vec::new());
    };
    if topics.len() < event.min_topics() {
        return Ok(Vec::new());
    }

    let data = decode_bytes("log.data", &log.data)?;
    let layout = |err: alloy::sol_types::Error| DecodeError::EventLayout {
        event: event.name(),
        reason: err.to_string(),
    };
    let transfer = |batch_index: u32,
                    from: Address,
                    to: Address,
                    token_id: U256,
                    value: String,
                    token_type: TokenType| {
        NftTransferRecord {
            block_hash: log.block_hash.clone(),
            log_index: log.log_index,
            batch_index,
            transaction_hash: log.transaction_hash.clone(),
            contract_address: log.address.clone(),
            from: hex::encode_prefixed(from),
            to: hex::encode_prefixed(to),
            token_id: token_id.to_string(),
            value,
            token_type,
        }
    };

    match event {
        TransferEvent::Transfer if topics.len() == 4 => {
            let decoded =
                events::indexed::Transfer::decode_raw_log(topics, &data, true).map_err(layout)?;
            Ok(vec![transfer(
                0,
                decoded.from,
                decoded.to,
                decoded.tokenId,
                String::new(),
                TokenType::Erc721,
            )])
        }
        TransferEvent::Transfer => {
            let decoded = events::Transfer::decode_raw_log(topics, &data, true).map_err(layout)?;
            Ok(vec![transfer(
                0,
                decoded.from,
                decoded.to,
                decoded.tokenId,
                String::new(),
                TokenType::Erc721,
            )])
        }
        TransferEvent::TransferSingle => {
            let decoded =
                events::TransferSingle::decode_raw_log(topics, &data, true).map_err(layout)?;
            Ok(vec![transfer(
                0,
                decoded.from,
                decoded.to,
                decoded.id,
                decoded.value.to_string(),
                TokenType::Erc1155,
            )])
        }
        TransferEvent::TransferBatch => {
            let decoded =
                events::TransferBatch::decode_raw_log(topics, &data, true).map_err(layout)?;
            if decoded.ids.len() != decoded.values.len() {
                return Err(DecodeError::LengthMismatch {
                    ids: decoded.ids.len(),
                    values: decoded.values.len(),
                });
            }
            Ok(decoded
                .ids
                .iter()
                .zip(&decoded.values)
                .enumerate()
                .map(|(index, (id, value))| {
                    transfer(
                        index as u32,
                        decoded.from,
                        decoded.to,
                        *id,
                        value.to_string(),
                        TokenType::Erc1155,
                    )
                })
                .collect())
        }
    }
}
