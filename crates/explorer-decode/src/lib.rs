//! explorer-decode crate: turns raw blocks, transactions, receipts and logs
//! into persistable records, classifying token transfer events.

pub mod decoder;
pub mod error;
pub mod events;
pub mod quantity;

pub use decoder::{
    decode_block, decode_contract, decode_log, decode_nft_transfers, decode_range,
    decode_transaction, DecodeOptions,
};
pub use error::DecodeError;
