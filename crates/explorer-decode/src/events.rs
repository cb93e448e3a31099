//! Token transfer event definitions and the signature lookup table.

use std::collections::HashMap;
use std::sync::OnceLock;

use alloy::primitives::B256;
use alloy::sol;
use alloy::sol_types::SolEvent;

sol! {
    /// Single token transfer with the token id in the data word.
    event Transfer(address indexed from, address indexed to, uint256 tokenId);

    /// ERC-1155 single transfer.
    event TransferSingle(
        address indexed operator,
        address indexed from,
        address indexed to,
        uint256 id,
        uint256 value
    );

    /// ERC-1155 batch transfer: parallel id and amount arrays.
    event TransferBatch(
        address indexed operator,
        address indexed from,
        address indexed to,
        uint256[] ids,
        uint256[] values
    );
}

/// ERC-721 canonical form: same signature as [`Transfer`], token id indexed.
pub mod indexed {
    use alloy::sol;

    sol! {
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
    }
}

/// Transfer event shapes recognized by topic0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransferEvent {
    Transfer,
    TransferSingle,
    TransferBatch,
}

impl TransferEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Transfer => "Transfer",
            Self::TransferSingle => "TransferSingle",
            Self::TransferBatch => "TransferBatch",
        }
    }

    /// Topics (signature included) needed before the event can be decoded.
    pub fn min_topics(&self) -> usize {
        match self {
            Self::Transfer => 3,
            Self::TransferSingle | Self::TransferBatch => 4,
        }
    }
}

/// Signature hash to event shape. Built on first use, read-only afterwards.
pub fn transfer_signatures() -> &'static HashMap<B256, TransferEvent> {
    static TABLE: OnceLock<HashMap<B256, TransferEvent>> = OnceLock::new();
    TABLE.get_or_init(|| {
        HashMap::from([
            (Transfer::SIGNATURE_HASH, TransferEvent::Transfer),
            (TransferSingle::SIGNATURE_HASH, TransferEvent::TransferSingle),
            (TransferBatch::SIGNATURE_HASH, TransferEvent::TransferBatch),
        ])
    })
}

pub fn classify(topic0: &B256) -> Option<TransferEvent> {
    transfer_signatures().get(topic0).copied()
}
