// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! SQLite archive of archive records

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{open_connection, ArchiveSink};
use crate::core::{Record, Timestamp};
use crate::units::UnitSystem;

/// Archive database
///
/// Clones share one connection.
#[derive(Clone)]
pub struct Archive {
    conn: Arc<Mutex<Connection>>,
}

impl Archive {
    /// Open or create the archive at `path`
    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_connection(path)
            .with_context(|| format!("opening archive database {:?}", path))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS archive (
                dateTime INTEGER PRIMARY KEY NOT NULL,
                usUnits INTEGER NOT NULL,
                interval INTEGER,
                data TEXT NOT NULL
            );
        "#,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Number of stored records
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM archive", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Oldest stored timestamp
    pub fn first_timestamp(&self) -> Result<Option<Timestamp>> {
        let conn = self.conn.lock();
        let ts = conn.query_row("SELECT MIN(dateTime) FROM archive", [], |row| row.get(0))?;
        Ok(ts)
    }

    /// Records with `start < dateTime <= end`, oldest first
    pub fn records_between(&self, start: Timestamp, end: Timestamp) -> Result<Vec<Record>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT dateTime, usUnits, interval, data FROM archive
             WHERE dateTime > ?1 AND dateTime <= ?2 ORDER BY dateTime ASC",
        )?;
        let rows = stmt.query_map(params![start, end], read_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(decode(row?)?);
        }
        Ok(records)
    }
}

type RawRow = (Timestamp, u8, Option<i64>, String);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn decode((date_time, units, interval, data): RawRow) -> Result<Record> {
    let us_units = UnitSystem::try_from(units).map_err(anyhow::Error::msg)?;
    let values: BTreeMap<String, Option<f64>> = serde_json::from_str(&data)
        .with_context(|| format!("decoding archive record {}", date_time))?;
    Ok(Record {
        date_time,
        us_units,
        interval,
        values,
    })
}

impl ArchiveSink for Archive {
    fn last_good_timestamp(&self) -> Result<Option<Timestamp>> {
        let conn = self.conn.lock();
        let ts = conn.query_row("SELECT MAX(dateTime) FROM archive", [], |row| row.get(0))?;
        Ok(ts)
    }

    fn add_record(&mut self, record: &Record) -> Result<bool> {
        let conn = self.conn.lock();
        let data = serde_json::to_string(&record.values)?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO archive (dateTime, usUnits, interval, data) VALUES (?1, ?2, ?3, ?4)",
            params![record.date_time, record.us_units.code(), record.interval, data],
        )?;

        if inserted == 0 {
            warn!("Archive already holds a record for {}; new record ignored", record.date_time);
        } else {
            debug!("Archived record {}", record.date_time);
        }
        Ok(inserted > 0)
    }

    fn get_record(&self, ts: Timestamp) -> Result<Option<Record>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT dateTime, usUnits, interval, data FROM archive WHERE dateTime = ?1",
                params![ts],
                read_row,
            )
            .optional()?;
        row.map(decode).transpose()
    }

    fn records_after(&self, since: Option<Timestamp>) -> Result<Vec<Record>> {
        self.records_between(since.unwrap_or(Timestamp::MIN), Timestamp::MAX)
    }

    fn close(&mut self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch("PRAGMA optimize;")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ts: Timestamp, temp: f64) -> Record {
        let mut record = Record::new(ts, UnitSystem::Us).with("outTemp", temp);
        record.interval = Some(5);
        record
    }

    #[test]
    fn test_add_and_query() {
        let mut archive = Archive::open_in_memory().unwrap();
        assert_eq!(archive.last_good_timestamp().unwrap(), None);

        archive.add_record(&record(600, 51.0)).unwrap();
        archive.add_record(&record(300, 50.0)).unwrap();
        let mut gappy = record(900, 52.0);
        gappy.set("windSpeed", None);
        archive.add_record(&gappy).unwrap();

        assert_eq!(archive.last_good_timestamp().unwrap(), Some(900));
        assert_eq!(archive.first_timestamp().unwrap(), Some(300));
        assert_eq!(archive.get_record(900).unwrap(), Some(gappy));
        assert_eq!(archive.get_record(1200).unwrap(), None);

        let after: Vec<_> = archive
            .records_after(Some(300))
            .unwrap()
            .into_iter()
            .map(|r| r.date_time)
            .collect();
        assert_eq!(after, vec![600, 900]);
        assert_eq!(archive.records_after(None).unwrap().len(), 3);
    }

    #[test]
    fn test_duplicate_timestamp_is_ignored() {
        let mut archive = Archive::open_in_memory().unwrap();
        assert!(archive.add_record(&record(300, 50.0)).unwrap());
        assert!(!archive.add_record(&record(300, 99.0)).unwrap());
        assert_eq!(archive.count().unwrap(), 1);
        assert_eq!(archive.get_record(300).unwrap().unwrap().get("outTemp"), Some(50.0));
    }

    #[test]
    fn test_reopen_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive").join("weather.sdb");
        {
            let mut archive = Archive::open(&path).unwrap();
            archive.add_record(&record(300, 50.0)).unwrap();
            archive.close().unwrap();
        }
        let archive = Archive::open(&path).unwrap();
        assert_eq!(archive.last_good_timestamp().unwrap(), Some(300));
    }
}
