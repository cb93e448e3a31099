//! Range loading: blocks first, then every transaction and receipt they
//! reference.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::fetcher::BatchFetcher;
use crate::rpc::{
    RpcCall, GET_BLOCK_BY_NUMBER, GET_TRANSACTION_BY_HASH, GET_TRANSACTION_RECEIPT,
};
use crate::types::{RawBlock, RawRange, RawReceipt, RawTransaction};

/// Fetches the raw contents of a block range through a [`BatchFetcher`].
#[derive(Clone)]
pub struct RangeLoader {
    fetcher: BatchFetcher,
}

impl RangeLoader {
    pub fn new(fetcher: BatchFetcher) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &BatchFetcher {
        &self.fetcher
    }

    /// Loads `block_numbers` and every transaction/receipt pair they contain.
    ///
    /// Transactions come back in block order with the parent block's
    /// timestamp copied in; `receipts[i]` belongs to `transactions[i]`.
    ///
    /// # Errors
    /// Any failed call fails the whole range; nothing partial is returned.
    #[tracing::instrument(skip_all, fields(blocks = block_numbers.len()))]
    pub async fn load_range(
        &self,
        block_numbers: &[u64],
        cancel: &CancellationToken,
    ) -> Result<RawRange, FetchError> {
        let block_calls: Vec<RpcCall> = block_numbers
            .iter()
            .map(|number| RpcCall::block_by_number(*number))
            .collect();

        let blocks: Vec<RawBlock> = self
            .fetcher
            .fetch(&block_calls, cancel)
            .await?
            .into_iter()
            .map(|value| parse(GET_BLOCK_BY_NUMBER, value))
            .collect::<Result<_, _>>()?;

        let tx_calls = pair_calls(&blocks);
        if tx_calls.is_empty() {
            tracing::debug!("range has no transactions");
            return Ok(RawRange {
                blocks,
                ..Default::default()
            });
        }

        let values = self.fetcher.fetch_grouped(&tx_calls, 2, cancel).await?;
        if values.len() != tx_calls.len() {
            return Err(FetchError::Inconsistent(format!(
                "requested {} transaction calls, received {}",
                tx_calls.len(),
                values.len()
            )));
        }

        let mut transactions = Vec::with_capacity(values.len() / 2);
        let mut receipts = Vec::with_capacity(values.len() / 2);
        let mut values = values.into_iter();

        for block in &blocks {
            for hash in &block.transactions {
                let (Some(tx_value), Some(receipt_value)) = (values.next(), values.next()) else {
                    return Err(FetchError::Inconsistent(format!(
                        "missing transaction/receipt pair for {hash}"
                    )));
                };

                let mut tx: RawTransaction = parse(GET_TRANSACTION_BY_HASH, tx_value)?;
                let receipt: RawReceipt = parse(GET_TRANSACTION_RECEIPT, receipt_value)?;

                if !tx.hash.eq_ignore_ascii_case(hash)
                    || !receipt.transaction_hash.eq_ignore_ascii_case(hash)
                {
                    return Err(FetchError::Inconsistent(format!(
                        "requested {hash}, got transaction {} and receipt {}",
                        tx.hash, receipt.transaction_hash
                    )));
                }

                tx.timestamp = block.timestamp.clone();
                transactions.push(tx);
                receipts.push(receipt);
            }
        }

        tracing::debug!(
            transactions = transactions.len(),
            "range transactions loaded"
        );

        Ok(RawRange {
            blocks,
            transactions,
            receipts,
        })
    }
}

/// Two calls per transaction hash, transaction then receipt, adjacent.
/// Fetched with a group of two so a pair always shares a batch.
pub fn pair_calls(blocks: &[RawBlock]) -> Vec<RpcCall> {
    blocks
        .iter()
        .flat_map(|block| block.transactions.iter())
        .flat_map(|hash| {
            [
                RpcCall::transaction_by_hash(hash),
                RpcCall::transaction_receipt(hash),
            ]
        })
        .collect()
}

fn parse<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, FetchError> {
    serde_json::from_value(value).map_err(|source| FetchError::Deserialize {
        method: method.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_with(hashes: &[&str]) -> RawBlock {
        RawBlock {
            number: "0x1".to_string(),
            hash: "0xb1".to_string(),
            parent_hash: "0xb0".to_string(),
            nonce: None,
            miner: "0x00".to_string(),
            difficulty: Some("0x0".to_string()),
            total_difficulty: None,
            extra_data: "0x".to_string(),
            size: Some("0x10".to_string()),
            gas_limit: "0x1c9c380".to_string(),
            gas_used: "0x0".to_string(),
            timestamp: "0x6543".to_string(),
            base_fee_per_gas: None,
            transactions: hashes.iter().map(|h| h.to_string()).collect(),
        }
    }

    #[test]
    fn pair_calls_emits_two_calls_per_hash() {
        let blocks = vec![block_with(&["0xa", "0xb"]), block_with(&[]), block_with(&["0xc"])];
        let calls = pair_calls(&blocks);

        assert_eq!(calls.len(), 6);
        for (pair, hash) in calls.chunks(2).zip(["0xa", "0xb", "0xc"]) {
            assert_eq!(pair[0], RpcCall::transaction_by_hash(hash));
            assert_eq!(pair[1], RpcCall::transaction_receipt(hash));
        }
    }

    #[test]
    fn pair_calls_skips_empty_blocks() {
        assert!(pair_calls(&[block_with(&[])]).is_empty());
    }
}
