//! explorer-data crate: node-facing types, batched RPC fetching, range
//! loading and SQLite persistence.

pub mod error;
pub mod fetcher;
pub mod loader;
pub mod retry;
pub mod rpc;
pub mod store;
pub mod types;

pub use error::FetchError;
pub use fetcher::BatchFetcher;
pub use loader::RangeLoader;
pub use retry::RetryPolicy;
pub use rpc::{BatchTransport, HttpTransport, RpcCall, RpcError};
pub use store::{RecordSink, Store};
pub use types::{
    BlockRecord, ContractRecord, JobResult, LogRecord, NftTransferRecord, RawBlock, RawLog,
    RawRange, RawReceipt, RawTransaction, TokenType, TransactionRecord,
};
