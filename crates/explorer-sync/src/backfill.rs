//! Backfill driver: plans ranges, runs them on the worker pool and commits
//! finished ranges in block order.
//!
//! Submission is interleaved with commits: at most
//! [`Backfill::in_flight_limit`] ranges are outstanding at once, and the next
//! range is only submitted after the oldest one has been committed.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Arc;

use eyre::{eyre, Result, WrapErr};
use explorer_data::{BatchFetcher, HttpTransport, RangeLoader, RecordSink, RetryPolicy};
use explorer_decode::DecodeOptions;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::job::SyncJob;
use crate::pool::{WorkError, WorkerPool};
use crate::range::{plan_ranges, BlockRange};

/// Outcome of one backfill run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Ranges committed, in commit order.
    pub committed: Vec<BlockRange>,
    /// Ranges already present in the sink.
    pub skipped: Vec<BlockRange>,
    /// Ranges that failed with the reason; safe to re-run.
    pub failed: Vec<(BlockRange, String)>,
    /// Rows written across all commits.
    pub rows: usize,
}

impl BackfillReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Backfill {
    config: SyncConfig,
    loader: RangeLoader,
    sink: Arc<dyn RecordSink>,
    progress: bool,
}

impl Backfill {
    pub fn new(config: SyncConfig, loader: RangeLoader, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            config,
            loader,
            sink,
            progress: false,
        }
    }

    /// Builds the HTTP transport and fetcher described by `config`.
    ///
    /// # Errors
    /// Returns error if the config is invalid or the client cannot be built.
    pub fn from_config(config: SyncConfig, sink: Arc<dyn RecordSink>) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config.rpc_url, config.batch_timeout)
            .wrap_err("failed to build RPC transport")?;
        let retry = if config.batch_retries == 0 {
            RetryPolicy::none()
        } else {
            RetryPolicy::exponential(config.batch_retries, config.retry_backoff)
        };
        let fetcher = BatchFetcher::new(
            Arc::new(transport),
            config.chunk_size()?,
            config.batch_timeout,
        )
        .with_retry(retry);

        Ok(Self::new(config, RangeLoader::new(fetcher), sink))
    }

    /// Shows a terminal progress bar while running.
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Syncs `start..=end`.
    ///
    /// A failed range is recorded in the report and does not stop the run.
    ///
    /// # Errors
    /// Returns error for an inverted interval or when the sink cannot be
    /// queried for existing blocks.
    #[tracing::instrument(skip(self, cancel), fields(workers = self.config.workers))]
    pub async fn run(
        &self,
        start: u64,
        end: u64,
        cancel: CancellationToken,
    ) -> Result<BackfillReport> {
        if start > end {
            return Err(eyre!("start block {start} is after end block {end}"));
        }
        let workers = NonZeroUsize::new(self.config.workers)
            .ok_or_else(|| eyre!("workers must be at least 1"))?;

        let mut report = BackfillReport::default();
        let mut pending = Vec::new();
        for range in plan_ranges(start, end, self.config.range_size) {
            if self.config.skip_existing && self.sink.has_blocks(range.start, range.end)? {
                tracing::debug!(%range, "range already stored, skipping");
                report.skipped.push(range);
            } else {
                pending.push(range);
            }
        }

        tracing::info!(
            ranges = pending.len(),
            skipped = report.skipped.len(),
            "starting backfill"
        );

        let progress = self.progress_bar(pending.len() as u64)?;
        let options = DecodeOptions {
            decode_logs: self.config.decode_logs,
        };
        let pool = WorkerPool::with_cancellation(
            workers.get(),
            self.config.queue_capacity,
            cancel.child_token(),
        );

        let window = self.in_flight_limit(workers);
        let mut pending = pending.into_iter();
        let mut in_flight = VecDeque::with_capacity(window);
        loop {
            while in_flight.len() < window {
                let Some(range) = pending.next() else { break };
                let job = SyncJob::new(range, self.loader.clone(), options);
                in_flight.push_back((range, pool.submit(job).await));
            }
            let Some((range, handle)) = in_flight.pop_front() else {
                break;
            };

            match handle.join().await {
                Ok((_, records)) => match self.sink.commit(&records) {
                    Ok(rows) => {
                        tracing::info!(%range, rows, "range committed");
                        report.rows += rows;
                        report.committed.push(range);
                    }
                    Err(err) => {
                        tracing::error!(%range, error = %err, "commit failed");
                        report.failed.push((range, format!("commit failed: {err:#}")));
                    }
                },
                Err(err) => {
                    if !matches!(err, WorkError::Cancelled) {
                        tracing::warn!(%range, error = %err, "range failed");
                    }
                    report.failed.push((range, err.to_string()));
                }
            }
            progress.inc(1);
        }

        pool.shutdown().await;
        progress.finish_and_clear();

        tracing::info!(
            committed = report.committed.len(),
            failed = report.failed.len(),
            rows = report.rows,
            "backfill finished"
        );
        Ok(report)
    }

    /// Ranges submitted but not yet committed: one per worker plus the queue
    /// bound, or twice the worker count with an unbounded queue. Finished
    /// results wait here for the head-of-line range, so this caps memory.
    pub fn in_flight_limit(&self, workers: NonZeroUsize) -> usize {
        workers
            .get()
            .saturating_add(self.config.queue_capacity.unwrap_or(workers.get()))
    }

    fn progress_bar(&self, len: u64) -> Result<ProgressBar> {
        if !self.progress {
            return Ok(ProgressBar::hidden());
        }
        let bar = ProgressBar::new(len);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ranges ({eta})")?,
        );
        Ok(bar)
    }
}
