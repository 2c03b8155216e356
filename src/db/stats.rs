// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! SQLite daily-summary statistics

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{open_connection, ArchiveSink, StatsSink};
use crate::accum::{Accumulator, ScalarStats};
use crate::core::{start_of_interval, Record, Timestamp};

const SECS_PER_DAY: i64 = 86_400;

/// UTC day an archive record belongs to
///
/// Records are stamped with the end of their interval, so a record at
/// midnight closes the previous day.
pub fn archive_day(ts: Timestamp) -> Timestamp {
    start_of_interval(ts - 1, SECS_PER_DAY)
}

/// One day's statistics for one observation type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    pub day: Timestamp,
    pub obs_type: String,
    pub min: Option<f64>,
    pub mintime: Option<Timestamp>,
    pub max: Option<f64>,
    pub maxtime: Option<Timestamp>,
    pub sum: f64,
    pub count: i64,
}

impl DaySummary {
    fn empty(day: Timestamp, obs_type: &str) -> Self {
        Self {
            day,
            obs_type: obs_type.to_string(),
            min: None,
            mintime: None,
            max: None,
            maxtime: None,
            sum: 0.0,
            count: 0,
        }
    }

    fn merge_extremes(&mut self, low: f64, lowtime: Timestamp, high: f64, hightime: Timestamp) {
        if self.min.map_or(true, |min| low < min) {
            self.min = Some(low);
            self.mintime = Some(lowtime);
        }
        if self.max.map_or(true, |max| high > max) {
            self.max = Some(high);
            self.maxtime = Some(hightime);
        }
    }

    fn merge_value(&mut self, value: f64, ts: Timestamp) {
        self.merge_extremes(value, ts, value, ts);
        self.sum += value;
        self.count += 1;
    }

    fn merge_hilo(&mut self, stats: &ScalarStats) {
        if let (Some(min), Some(mintime), Some(max), Some(maxtime)) =
            (stats.min, stats.mintime, stats.max, stats.maxtime)
        {
            self.merge_extremes(min, mintime, max, maxtime);
        }
    }

    pub fn avg(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }
}

/// Statistics database
#[derive(Clone)]
pub struct StatsDb {
    conn: Arc<Mutex<Connection>>,
}

impl StatsDb {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_connection(path)
            .with_context(|| format!("opening statistics database {:?}", path))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS day_summary (
                day INTEGER NOT NULL,
                obs_type TEXT NOT NULL,
                min REAL,
                mintime INTEGER,
                max REAL,
                maxtime INTEGER,
                sum REAL NOT NULL DEFAULT 0,
                count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (day, obs_type)
            );

            CREATE TABLE IF NOT EXISTS metadata (
                name TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );
        "#,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Timestamp of the newest archive record folded in
    pub fn last_update(&self) -> Result<Option<Timestamp>> {
        let conn = self.conn.lock();
        let ts = conn
            .query_row(
                "SELECT value FROM metadata WHERE name = 'last_update'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(ts)
    }

    /// Summary of `obs_type` for the UTC day starting at `day`
    pub fn day_summary(&self, day: Timestamp, obs_type: &str) -> Result<Option<DaySummary>> {
        let conn = self.conn.lock();
        load_summary(&conn, day, obs_type)
    }

    /// Every summary for the UTC day starting at `day`
    pub fn day_summaries(&self, day: Timestamp) -> Result<Vec<DaySummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT day, obs_type, min, mintime, max, maxtime, sum, count
             FROM day_summary WHERE day = ?1 ORDER BY obs_type",
        )?;
        let rows = stmt.query_map(params![day], read_summary)?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }
}

fn read_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<DaySummary> {
    Ok(DaySummary {
        day: row.get(0)?,
        obs_type: row.get(1)?,
        min: row.get(2)?,
        mintime: row.get(3)?,
        max: row.get(4)?,
        maxtime: row.get(5)?,
        sum: row.get(6)?,
        count: row.get(7)?,
    })
}

fn load_summary(conn: &Connection, day: Timestamp, obs_type: &str) -> Result<Option<DaySummary>> {
    let summary = conn
        .query_row(
            "SELECT day, obs_type, min, mintime, max, maxtime, sum, count
             FROM day_summary WHERE day = ?1 AND obs_type = ?2",
            params![day, obs_type],
            read_summary,
        )
        .optional()?;
    Ok(summary)
}

fn store_summary(conn: &Connection, summary: &DaySummary) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO day_summary (day, obs_type, min, mintime, max, maxtime, sum, count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            summary.day,
            summary.obs_type,
            summary.min,
            summary.mintime,
            summary.max,
            summary.maxtime,
            summary.sum,
            summary.count
        ],
    )?;
    Ok(())
}

impl StatsSink for StatsDb {
    fn add_record(&mut self, record: &Record) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let day = archive_day(record.date_time);

        for (obs_type, value) in &record.values {
            let Some(value) = value else { continue };
            let mut summary =
                load_summary(&tx, day, obs_type)?.unwrap_or_else(|| DaySummary::empty(day, obs_type));
            summary.merge_value(*value, record.date_time);
            store_summary(&tx, &summary)?;
        }

        tx.execute(
            "INSERT INTO metadata (name, value) VALUES ('last_update', ?1)
             ON CONFLICT(name) DO UPDATE SET value = MAX(value, excluded.value)",
            params![record.date_time],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn update_hilo(&mut self, accumulator: &Accumulator) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let day = start_of_interval(accumulator.span().start, SECS_PER_DAY);

        for (obs_type, stats) in accumulator.fields() {
            if stats.count == 0 {
                continue;
            }
            let mut summary =
                load_summary(&tx, day, obs_type)?.unwrap_or_else(|| DaySummary::empty(day, obs_type));
            summary.merge_hilo(stats);
            store_summary(&tx, &summary)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn backfill(&mut self, archive: &dyn ArchiveSink) -> Result<usize> {
        let since = self.last_update()?;
        let records = archive.records_after(since)?;
        for record in &records {
            self.add_record(record)?;
        }

        if records.is_empty() {
            debug!("Daily summaries are up to date");
        } else {
            info!("Backfilled daily summaries with {} archive records", records.len());
        }
        Ok(records.len())
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
    use crate::accum::{ExtractRules, TimeSpan};
    use crate::db::Archive;
    use crate::units::UnitSystem;

    const DAY: Timestamp = 1_709_251_200; // 2024-03-01 00:00 UTC

    #[test]
    fn test_archive_day_assigns_midnight_to_previous_day() {
        assert_eq!(archive_day(DAY + 300), DAY);
        assert_eq!(archive_day(DAY + SECS_PER_DAY), DAY);
        assert_eq!(archive_day(DAY + SECS_PER_DAY + 1), DAY + SECS_PER_DAY);
    }

    #[test]
    fn test_add_record_builds_summary() {
        let mut stats = StatsDb::open_in_memory().unwrap();
        for (i, temp) in [50.0, 58.0, 46.0].into_iter().enumerate() {
            let mut record = Record::new(DAY + 300 * (i as i64 + 1), UnitSystem::Us).with("outTemp", temp);
            record.set("windSpeed", None);
            stats.add_record(&record).unwrap();
        }

        let summary = stats.day_summary(DAY, "outTemp").unwrap().unwrap();
        assert_eq!(summary.min, Some(46.0));
        assert_eq!(summary.mintime, Some(DAY + 900));
        assert_eq!(summary.max, Some(58.0));
        assert_eq!(summary.count, 3);
        assert_eq!(summary.avg(), Some(154.0 / 3.0));
        assert_eq!(stats.day_summary(DAY, "windSpeed").unwrap(), None);
        assert_eq!(stats.last_update().unwrap(), Some(DAY + 900));
    }

    #[test]
    fn test_update_hilo_keeps_loop_extremes() {
        let mut stats = StatsDb::open_in_memory().unwrap();
        stats
            .add_record(&Record::new(DAY + 300, UnitSystem::Us).with("outTemp", 50.0))
            .unwrap();

        let mut accum = Accumulator::new(TimeSpan::new(DAY + 300, DAY + 600), Arc::new(ExtractRules::default()));
        for (offset, temp) in [(10, 49.0), (100, 61.5), (200, 55.0)] {
            accum
                .add_record(&Record::new(DAY + 300 + offset, UnitSystem::Us).with("outTemp", temp))
                .unwrap();
        }
        stats.update_hilo(&accum).unwrap();

        let summary = stats.day_summary(DAY, "outTemp").unwrap().unwrap();
        assert_eq!(summary.min, Some(49.0));
        assert_eq!(summary.max, Some(61.5));
        assert_eq!(summary.maxtime, Some(DAY + 400));
        // Highs and lows do not count as samples
        assert_eq!(summary.count, 1);
    }

    #[test]
    fn test_backfill_is_idempotent() {
        let mut archive = Archive::open_in_memory().unwrap();
        for i in 1..=4 {
            archive
                .add_record(&Record::new(DAY + 300 * i, UnitSystem::Us).with("outTemp", 40.0 + i as f64))
                .unwrap();
        }

        let mut stats = StatsDb::open_in_memory().unwrap();
        assert_eq!(stats.backfill(&archive).unwrap(), 4);
        assert_eq!(stats.backfill(&archive).unwrap(), 0);
        assert_eq!(stats.day_summary(DAY, "outTemp").unwrap().unwrap().count, 4);

        archive
            .add_record(&Record::new(DAY + 1_500, UnitSystem::Us).with("outTemp", 39.0))
            .unwrap();
        assert_eq!(stats.backfill(&archive).unwrap(), 1);
        assert_eq!(stats.day_summaries(DAY).unwrap().len(), 1);
    }
}
