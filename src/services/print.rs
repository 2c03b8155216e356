// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Console echo of packets and archive records

use anyhow::Result;
use chrono::{TimeZone, Utc};
use tracing::info;

use super::Service;
use crate::core::{Event, EventKind, Record, ServiceContext, Timestamp};

#[derive(Debug, Default)]
pub struct PrintService;

impl PrintService {
    pub fn new() -> Self {
        Self
    }
}

fn format_time(ts: Timestamp) -> String {
    match Utc.timestamp_opt(ts, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => ts.to_string(),
    }
}

fn format_values(record: &Record) -> String {
    record
        .values
        .iter()
        .map(|(name, value)| match value {
            Some(v) => format!("{}={:.3}", name, v),
            None => format!("{}=N/A", name),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl Service for PrintService {
    fn name(&self) -> &str {
        "print"
    }

    fn subscriptions(&self) -> Vec<EventKind> {
        vec![EventKind::NewLoopPacket, EventKind::NewArchiveRecord]
    }

    fn handle(&mut self, event: &mut Event, _ctx: &mut ServiceContext<'_>) -> Result<()> {
        match event {
            Event::NewLoopPacket(packet) => {
                info!("LOOP:   {} {}", format_time(packet.date_time), format_values(packet));
            }
            Event::NewArchiveRecord(record, origin) => {
                info!(?origin, "REC:    {} {}", format_time(record.date_time), format_values(record));
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::UnitSystem;

    #[test]
    fn test_formatting() {
        assert_eq!(format_time(0), "1970-01-01 00:00:00 UTC");
        let mut record = Record::new(0, UnitSystem::Us).with("outTemp", 61.25);
        record.set("rain", None);
        assert_eq!(format_values(&record), "outTemp=61.250 rain=N/A");
    }
}
