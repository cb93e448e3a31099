//! One block range, fetched then decoded.
//!
//! A job moves `Fetching -> Decoding -> Done` or ends in `Failed`. The
//! decoder only runs on a complete [`RawRange`]; a failed fetch never
//! produces records.

use async_trait::async_trait;
use explorer_data::{FetchError, JobResult, RangeLoader, RawRange};
use explorer_decode::{decode_range, DecodeError, DecodeOptions};
use tokio_util::sync::CancellationToken;

use crate::pool::WorkUnit;
use crate::range::BlockRange;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Lifecycle of a [`SyncJob`].
#[derive(Debug)]
pub enum SyncState {
    Fetching,
    Decoding(RawRange),
    Done(JobResult),
    Failed(SyncError),
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Failed(_))
    }
}

pub struct SyncJob {
    range: BlockRange,
    loader: RangeLoader,
    options: DecodeOptions,
}

impl SyncJob {
    pub fn new(range: BlockRange, loader: RangeLoader, options: DecodeOptions) -> Self {
        Self {
            range,
            loader,
            options,
        }
    }

    pub fn range(&self) -> BlockRange {
        self.range
    }

    /// Advances one state.
    async fn step(&self, state: SyncState, cancel: &CancellationToken) -> SyncState {
        match state {
            SyncState::Fetching => {
                match self.loader.load_range(&self.range.numbers(), cancel).await {
                    Ok(raw) => SyncState::Decoding(raw),
                    Err(err) => SyncState::Failed(err.into()),
                }
            }
            SyncState::Decoding(raw) => match decode_range(&raw, self.options) {
                Ok(records) => SyncState::Done(records),
                Err(err) => SyncState::Failed(err.into()),
            },
            terminal => terminal,
        }
    }

    /// Runs the job to a terminal state.
    ///
    /// # Errors
    /// [`SyncError::InvalidArgument`] for an inverted range, otherwise the
    /// first fetch or fatal decode error.
    #[tracing::instrument(skip_all, fields(range = %self.range))]
    pub async fn run(&self, cancel: &CancellationToken) -> Result<JobResult, SyncError> {
        if !self.range.is_valid() {
            return Err(SyncError::InvalidArgument(format!(
                "range start {} is after end {}",
                self.range.start, self.range.end
            )));
        }

        let mut state = SyncState::Fetching;
        while !state.is_terminal() {
            state = self.step(state, cancel).await;
            if let SyncState::Decoding(raw) = &state {
                tracing::debug!(
                    blocks = raw.blocks.len(),
                    transactions = raw.transactions.len(),
                    "range fetched"
                );
            }
        }

        match state {
            SyncState::Done(records) => {
                tracing::info!(
                    blocks = records.blocks.len(),
                    transactions = records.transactions.len(),
                    logs = records.logs.len(),
                    nft_transfers = records.nft_transfers.len(),
                    contracts = records.contracts.len(),
                    "range decoded"
                );
                Ok(records)
            }
            SyncState::Failed(err) => {
                tracing::warn!(error = %err, "range failed");
                Err(err)
            }
            SyncState::Fetching | SyncState::Decoding(_) => Err(SyncError::InvalidArgument(
                "job stopped before a terminal state".to_string(),
            )),
        }
    }
}

#[async_trait]
impl WorkUnit for SyncJob {
    type Output = (BlockRange, JobResult);
    type Error = SyncError;

    async fn execute(self, cancel: CancellationToken) -> Result<Self::Output, Self::Error> {
        let records = self.run(&cancel).await?;
        Ok((self.range, records))
    }
}
