// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Replay station - feeds pre-loaded packets and buffered archive records

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use super::{ArchiveRecords, Station, StationError};
use crate::core::{ManualClock, Record, Timestamp};

/// Replay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// JSON-lines file with one packet per line
    pub path: Option<PathBuf>,

    /// Archive interval to report as the logger's, in seconds
    pub archive_interval: Option<i64>,
}

/// Parse JSON-lines packets, skipping blank lines
pub fn read_packets<R: BufRead>(reader: R) -> Result<Vec<Record>> {
    let mut packets = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let packet: Record =
            serde_json::from_str(&line).with_context(|| format!("replay line {}", index + 1))?;
        packets.push(packet);
    }
    Ok(packets)
}

/// Replays pre-loaded LOOP packets
///
/// Used for replaying captured data and for driving the engine in tests.
/// When a clock is attached it is moved to each packet's timestamp as the
/// packet is handed out, so deadlines follow the replayed time.
pub struct ReplayStation {
    packets: VecDeque<Record>,
    archive: Option<Vec<Record>>,
    clock: Option<ManualClock>,
    console_time: Option<Timestamp>,
    fail_after: Option<(usize, String)>,
    yielded: usize,
    archive_interval: Option<i64>,
}

impl ReplayStation {
    pub fn new(packets: Vec<Record>) -> Self {
        Self {
            packets: packets.into(),
            archive: None,
            clock: None,
            console_time: None,
            fail_after: None,
            yielded: 0,
            archive_interval: None,
        }
    }

    /// Load packets from `config.path`; the attached clock starts at the
    /// first packet
    pub fn from_config(config: &ReplayConfig) -> Result<Self> {
        let path = config
            .path
            .as_ref()
            .ok_or_else(|| anyhow!("replay.path is not set"))?;
        let file = File::open(path).with_context(|| format!("opening replay file {:?}", path))?;
        let packets = read_packets(BufReader::new(file))?;

        let start = packets.first().map_or(0, |p| p.date_time);
        let mut station = Self::new(packets).with_clock(ManualClock::new(start));
        if let Some(secs) = config.archive_interval {
            station = station.with_archive_interval(secs);
        }
        Ok(station)
    }

    /// Clock following the replayed packets, if one is attached
    pub fn share_clock(&self) -> Option<ManualClock> {
        self.clock.clone()
    }

    pub fn with_clock(mut self, clock: ManualClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Archive records held in the console's logger
    pub fn with_archive(mut self, records: Vec<Record>) -> Self {
        self.archive = Some(records);
        self
    }

    /// Enable the clock capability, starting at `ts`
    pub fn with_console_time(mut self, ts: Timestamp) -> Self {
        self.console_time = Some(ts);
        self
    }

    pub fn with_archive_interval(mut self, secs: i64) -> Self {
        self.archive_interval = Some(secs);
        self
    }

    /// Report an I/O error once `count` packets were handed out
    pub fn fail_after(mut self, count: usize, message: &str) -> Self {
        self.fail_after = Some((count, message.to_string()));
        self
    }

    /// Packets not yet handed out
    pub fn remaining(&self) -> usize {
        self.packets.len()
    }
}

impl Station for ReplayStation {
    fn hardware_name(&self) -> &str {
        "Replay"
    }

    fn next_packet(&mut self) -> Result<Option<Record>, StationError> {
        if let Some((count, message)) = &self.fail_after {
            if self.yielded >= *count {
                return Err(StationError::Io(message.clone()));
            }
        }
        let packet = self.packets.pop_front();
        if let Some(packet) = &packet {
            self.yielded += 1;
            if let Some(clock) = &self.clock {
                clock.set(packet.date_time);
            }
        }
        Ok(packet)
    }

    fn archive_records_since(
        &mut self,
        since: Option<Timestamp>,
    ) -> Result<ArchiveRecords<'_>, StationError> {
        let records = self
            .archive
            .as_ref()
            .ok_or(StationError::NotSupported("archive record retrieval"))?;
        let iter = records
            .iter()
            .filter(move |r| since.map_or(true, |ts| r.date_time > ts))
            .cloned()
            .map(Ok);
        Ok(Box::new(iter))
    }

    fn archive_interval(&self) -> Option<i64> {
        self.archive_interval
    }

    fn get_time(&mut self) -> Result<Timestamp, StationError> {
        self.console_time
            .ok_or(StationError::NotSupported("reading the clock"))
    }

    fn set_time(&mut self, ts: Timestamp) -> Result<(), StationError> {
        match self.console_time.as_mut() {
            Some(time) => {
                *time = ts;
                Ok(())
            }
            None => Err(StationError::NotSupported("setting the clock")),
        }
    }
}
