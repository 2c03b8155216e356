// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Report file export

use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::ReportFormat;
use crate::core::{Record, Timestamp};
use crate::db::{archive_day, Archive, ArchiveSink, DaySummary, StatsDb};

const SECS_PER_DAY: i64 = 86_400;

/// Contents of `current.json`
#[derive(Debug, Serialize)]
struct Current<'a> {
    generated: String,
    record: &'a Record,
    day: String,
    summaries: &'a [DaySummary],
}

/// What one report run wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportSummary {
    pub days_written: usize,
    pub records_written: usize,
    pub current_written: bool,
}

/// Writes report files into one directory
pub struct ReportExporter {
    dir: PathBuf,
    format: ReportFormat,
}

pub fn day_label(day: Timestamp) -> String {
    match Utc.timestamp_opt(day, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d").to_string(),
        None => day.to_string(),
    }
}

impl ReportExporter {
    pub fn new(dir: &Path, format: ReportFormat) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            format,
        })
    }

    pub fn day_path(&self, day: Timestamp) -> PathBuf {
        let ext = match self.format {
            ReportFormat::Json => "jsonl",
            ReportFormat::Csv => "csv",
        };
        self.dir.join(format!("{}.{}", day_label(day), ext))
    }

    pub fn current_path(&self) -> PathBuf {
        self.dir.join("current.json")
    }

    /// Write records in the configured format
    pub fn export_records<W: Write>(&self, records: &[Record], writer: &mut W) -> Result<()> {
        match self.format {
            ReportFormat::Json => {
                for record in records {
                    let json = serde_json::to_string(record)?;
                    writeln!(writer, "{}", json)?;
                }
            }
            ReportFormat::Csv => {
                let columns: BTreeSet<&str> = records
                    .iter()
                    .flat_map(|r| r.values.keys().map(String::as_str))
                    .collect();

                write!(writer, "dateTime,usUnits,interval")?;
                for column in &columns {
                    write!(writer, ",{}", column)?;
                }
                writeln!(writer)?;

                for record in records {
                    write!(writer, "{},{},", record.date_time, record.us_units.code())?;
                    if let Some(interval) = record.interval {
                        write!(writer, "{}", interval)?;
                    }
                    for column in &columns {
                        match record.get(column) {
                            Some(value) => write!(writer, ",{}", value)?,
                            None => write!(writer, ",")?,
                        }
                    }
                    writeln!(writer)?;
                }
            }
        }

        writer.flush()?;
        Ok(())
    }

    /// Rewrite the file for one day
    pub fn write_day(&self, day: Timestamp, records: &[Record]) -> Result<()> {
        let path = self.day_path(day);
        write_replacing(&path, |writer| self.export_records(records, writer))?;
        debug!("Wrote {} records to {:?}", records.len(), path);
        Ok(())
    }

    pub fn write_current(&self, record: &Record, summaries: &[DaySummary]) -> Result<()> {
        let current = Current {
            generated: Utc::now().to_rfc3339(),
            record,
            day: day_label(archive_day(record.date_time)),
            summaries,
        };
        write_replacing(&self.current_path(), |writer| {
            serde_json::to_writer_pretty(&mut *writer, &current)?;
            writeln!(writer)?;
            writer.flush()?;
            Ok(())
        })
    }

    /// Regenerate report files from the databases
    ///
    /// Only the day of the newest record is rewritten unless `all_days` is
    /// set, in which case every day since the oldest record is.
    pub fn run(&self, archive: &Archive, stats: &StatsDb, all_days: bool) -> Result<ReportSummary> {
        let mut summary = ReportSummary::default();
        let Some(newest) = archive.last_good_timestamp()? else {
            debug!("Archive is empty, no report");
            return Ok(summary);
        };

        let last_day = archive_day(newest);
        let first_day = if all_days {
            archive.first_timestamp()?.map_or(last_day, archive_day)
        } else {
            last_day
        };

        let mut day = first_day;
        while day <= last_day {
            let records = archive.records_between(day, day + SECS_PER_DAY)?;
            if !records.is_empty() {
                self.write_day(day, &records)?;
                summary.days_written += 1;
                summary.records_written += records.len();
            }
            day += SECS_PER_DAY;
        }

        let record = archive
            .get_record(newest)?
            .ok_or_else(|| anyhow!("record {} vanished from the archive", newest))?;
        self.write_current(&record, &stats.day_summaries(last_day)?)?;
        summary.current_written = true;

        info!(
            "Report generated: {} day file(s), {} record(s)",
            summary.days_written, summary.records_written
        );
        Ok(summary)
    }
}

/// Write through a temporary file so readers never see a partial file
fn write_replacing<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let tmp = path.with_extension("tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        write(&mut writer)?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}
