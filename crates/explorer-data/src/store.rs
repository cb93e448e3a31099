//! SQLite storage layer for synced ranges.
//!
//! Uses WAL mode and prepared statements. A whole [`JobResult`] is written
//! inside one SQLite transaction, so a failed commit leaves no rows behind.

use eyre::{Context, Result};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

use crate::types::JobResult;

/// Persistence collaborator for range results.
pub trait RecordSink: Send + Sync {
    /// Commits every record set of `records`, or nothing.
    ///
    /// Returns the number of rows written.
    fn commit(&self, records: &JobResult) -> Result<usize>;

    /// True when every block of `start..=end` is already stored.
    fn has_blocks(&self, start: u64, end: u64) -> Result<bool>;
}

/// Row counts per table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub blocks: u64,
    pub transactions: u64,
    pub logs: u64,
    pub nft_transfers: u64,
    pub contracts: u64,
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Creates or opens a SQLite database with WAL mode enabled.
    ///
    /// # Errors
    /// Returns error if the database cannot be opened or migrations fail.
    pub fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .wrap_err_with(|| format!("failed to open SQLite database at {path}"))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| eyre::eyre!("store connection mutex poisoned"))
    }

    fn run_migrations(&self) -> Result<()> {
        self.lock()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS blocks (
                hash TEXT PRIMARY KEY,
                number INTEGER NOT NULL UNIQUE,
                parent_hash TEXT NOT NULL,
                nonce TEXT NOT NULL,
                miner TEXT NOT NULL,
                difficulty TEXT NOT NULL,
                total_difficulty TEXT NOT NULL,
                extra_data TEXT,
                size INTEGER NOT NULL,
                gas_limit TEXT NOT NULL,
                gas_used TEXT NOT NULL,
                base_fee_per_gas TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                transaction_count INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS transactions (
                hash TEXT PRIMARY KEY,
                block_hash TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                from_address TEXT NOT NULL,
                to_address TEXT,
                gas TEXT NOT NULL,
                gas_used TEXT NOT NULL,
                gas_price TEXT NOT NULL,
                nonce INTEGER NOT NULL,
                transaction_index INTEGER NOT NULL,
                value TEXT NOT NULL,
                contract_address TEXT,
                status INTEGER,
                timestamp INTEGER NOT NULL,
                input_data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS logs (
                block_hash TEXT NOT NULL,
                log_index INTEGER NOT NULL,
                transaction_hash TEXT NOT NULL,
                address TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                topic0 TEXT,
                topic1 TEXT,
                topic2 TEXT,
                topic3 TEXT,
                data TEXT NOT NULL,
                PRIMARY KEY (block_hash, log_index)
            );

            CREATE TABLE IF NOT EXISTS nft_transfers (
                block_hash TEXT NOT NULL,
                log_index INTEGER NOT NULL,
                batch_index INTEGER NOT NULL,
                transaction_hash TEXT NOT NULL,
                contract_address TEXT NOT NULL,
                from_address TEXT NOT NULL,
                to_address TEXT NOT NULL,
                token_id TEXT NOT NULL,
                value TEXT NOT NULL,
                token_type TEXT NOT NULL,
                PRIMARY KEY (block_hash, log_index, batch_index)
            );

            CREATE TABLE IF NOT EXISTS contracts (
                address TEXT PRIMARY KEY,
                transaction_hash TEXT NOT NULL,
                creator TEXT NOT NULL,
                block_number INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_block ON transactions (block_number);
            CREATE INDEX IF NOT EXISTS idx_nft_transfers_contract ON nft_transfers (contract_address);
            ",
        )?;
        Ok(())
    }

    /// Row counts of every table.
    ///
    /// # Errors
    /// Returns error if a count query fails.
    pub fn counts(&self) -> Result<StoreCounts> {
        let conn = self.lock()?;
        let count = |table: &str| -> Result<u64> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
                .wrap_err_with(|| format!("failed to count rows in {table}"))
        };
        Ok(StoreCounts {
            blocks: count("blocks")?,
            transactions: count("transactions")?,
            logs: count("logs")?,
            nft_transfers: count("nft_transfers")?,
            contracts: count("contracts")?,
        })
    }

    /// Highest stored block number, if any.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn max_block(&self) -> Result<Option<u64>> {
        let conn = self.lock()?;
        let max: Option<u64> =
            conn.query_row("SELECT MAX(number) FROM blocks", [], |row| row.get(0))?;
        Ok(max)
    }
}

impl RecordSink for Store {
    fn commit(&self, records: &JobResult) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR REPLACE INTO blocks (
                    hash, number, parent_hash, nonce, miner, difficulty, total_difficulty,
                    extra_data, size, gas_limit, gas_used, base_fee_per_gas, timestamp,
                    transaction_count
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            for b in &records.blocks {
                stmt.execute(rusqlite::params![
                    b.hash,
                    b.number,
                    b.parent_hash,
                    b.nonce,
                    b.miner,
                    b.difficulty,
                    b.total_difficulty,
                    b.extra_data,
                    b.size,
                    b.gas_limit,
                    b.gas_used,
                    b.base_fee_per_gas,
                    b.timestamp,
                    b.transaction_count,
                ])?;
            }

            let mut stmt = tx.prepare(
                "
                INSERT OR REPLACE INTO transactions (
                    hash, block_hash, block_number, from_address, to_address, gas, gas_used,
                    gas_price, nonce, transaction_index, value, contract_address, status,
                    timestamp, input_data
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            for t in &records.transactions {
                stmt.execute(rusqlite::params![
                    t.hash,
                    t.block_hash,
                    t.block_number,
                    t.from,
                    t.to,
                    t.gas,
                    t.gas_used,
                    t.gas_price,
                    t.nonce,
                    t.transaction_index,
                    t.value,
                    t.contract_address,
                    t.status,
                    t.timestamp,
                    t.input_data,
                ])?;
            }

            let mut stmt = tx.prepare(
                "
                INSERT OR REPLACE INTO logs (
                    block_hash, log_index, transaction_hash, address, block_number,
                    topic0, topic1, topic2, topic3, data
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            for l in &records.logs {
                stmt.execute(rusqlite::params![
                    l.block_hash,
                    l.log_index,
                    l.transaction_hash,
                    l.address,
                    l.block_number,
                    l.topic0,
                    l.topic1,
                    l.topic2,
                    l.topic3,
                    l.data,
                ])?;
            }

            let mut stmt = tx.prepare(
                "
                INSERT OR REPLACE INTO nft_transfers (
                    block_hash, log_index, batch_index, transaction_hash, contract_address,
                    from_address, to_address, token_id, value, token_type
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            for n in &records.nft_transfers {
                stmt.execute(rusqlite::params![
                    n.block_hash,
                    n.log_index,
                    n.batch_index,
                    n.transaction_hash,
                    n.contract_address,
                    n.from,
                    n.to,
                    n.token_id,
                    n.value,
                    n.token_type.as_str(),
                ])?;
            }

            let mut stmt = tx.prepare(
                "
                INSERT OR REPLACE INTO contracts (
                    address, transaction_hash, creator, block_number
                ) VALUES (?, ?, ?, ?)
                ",
            )?;
            for c in &records.contracts {
                stmt.execute(rusqlite::params![
                    c.address,
                    c.transaction_hash,
                    c.creator,
                    c.block_number,
                ])?;
            }
        }

        let count = records.row_count();
        tx.commit().wrap_err("failed to commit range records")?;
        Ok(count)
    }

    fn has_blocks(&self, start: u64, end: u64) -> Result<bool> {
        if start > end {
            return Ok(false);
        }
        let Some(expected) = (end - start).checked_add(1) else {
            return Ok(false);
        };
        let conn = self.lock()?;
        let stored: u64 = conn.query_row(
            "SELECT COUNT(*) FROM blocks WHERE number BETWEEN ? AND ?",
            rusqlite::params![start, end],
            |row| row.get(0),
        )?;
        Ok(stored == expected)
    }
}
