// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Database module for persistent storage
//!
//! The archive keeps one row per archive record. The statistics database
//! keeps daily summaries per observation type, fed by archive records and by
//! the LOOP-level highs and lows of each closed accumulator.

mod archive;
mod stats;

pub use archive::Archive;
pub use stats::{archive_day, DaySummary, StatsDb};

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use tracing::info;

use crate::accum::Accumulator;
use crate::core::{Record, Timestamp};

/// Durable store of archive records
pub trait ArchiveSink: Send {
    /// Timestamp of the newest stored record
    fn last_good_timestamp(&self) -> Result<Option<Timestamp>>;

    /// Store a record; false when the timestamp was already taken and the
    /// existing row was kept
    fn add_record(&mut self, record: &Record) -> Result<bool>;

    fn get_record(&self, ts: Timestamp) -> Result<Option<Record>>;

    /// Records strictly newer than `since`, oldest first
    fn records_after(&self, since: Option<Timestamp>) -> Result<Vec<Record>>;

    fn close(&mut self) -> Result<()>;
}

/// Pre-aggregated statistics store
pub trait StatsSink: Send {
    fn add_record(&mut self, record: &Record) -> Result<()>;

    /// Fold an accumulator's highs and lows into the summaries
    fn update_hilo(&mut self, accumulator: &Accumulator) -> Result<()>;

    /// Bring the summaries up to date with the archive; returns the number
    /// of records replayed. Running it twice replays nothing the second time.
    fn backfill(&mut self, archive: &dyn ArchiveSink) -> Result<usize>;

    fn close(&mut self) -> Result<()>;
}

/// Open a SQLite file, creating parent directories as needed
fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(path)?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA temp_store = MEMORY;
    "#,
    )?;

    info!("Database opened at {:?}", path);
    Ok(conn)
}
