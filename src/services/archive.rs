// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Archive service - accumulates packets into intervals and stores the
//! resulting archive records

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{BuildContext, Service};
use crate::accum::{AccumError, Accumulator, ExtractRules, TimeSpan};
use crate::config::RecordGeneration;
use crate::core::{start_of_interval, Event, EventKind, Origin, Record, ServiceContext, Timestamp};
use crate::db::{Archive, ArchiveSink, StatsDb, StatsSink};

/// Archive service settings
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    /// Interval length in seconds
    pub archive_interval: i64,
    pub record_generation: RecordGeneration,
    /// Ask the station for missed records at startup
    pub catchup: bool,
    pub rules: Arc<ExtractRules>,
}

impl ArchiveOptions {
    /// Software record generation with catch-up and default extraction
    pub fn software(archive_interval: i64) -> Self {
        Self {
            archive_interval,
            record_generation: RecordGeneration::Software,
            catchup: true,
            rules: Arc::new(ExtractRules::default()),
        }
    }

    pub fn from_context(ctx: &BuildContext<'_>) -> Self {
        Self {
            archive_interval: ctx.archive_interval,
            record_generation: ctx.config.station.record_generation,
            catchup: ctx.config.archive.catchup,
            rules: Arc::new(ExtractRules::new(ctx.config.archive.extract.clone())),
        }
    }
}

/// Turns LOOP packets into archive records and persists them
///
/// Holds the current accumulator plus at most one closed ("old")
/// accumulator waiting for the interval close.
pub struct ArchiveService {
    archive: Box<dyn ArchiveSink>,
    stats: Box<dyn StatsSink>,
    options: ArchiveOptions,
    accumulator: Option<Accumulator>,
    old: Option<Accumulator>,
    last_closed_end: Option<Timestamp>,
}

impl ArchiveService {
    pub fn new(archive: Box<dyn ArchiveSink>, stats: Box<dyn StatsSink>, options: ArchiveOptions) -> Self {
        Self {
            archive,
            stats,
            options,
            accumulator: None,
            old: None,
            last_closed_end: None,
        }
    }

    /// Open the configured databases and bring the statistics up to date
    pub fn open(ctx: &BuildContext<'_>) -> Result<Self> {
        let archive = Archive::open(&ctx.config.archive_path())?;
        let mut stats = StatsDb::open(&ctx.config.stats_path())?;
        stats.backfill(&archive)?;

        info!(
            interval = ctx.archive_interval,
            generation = ?ctx.config.station.record_generation,
            "Archive service ready"
        );
        Ok(Self::new(Box::new(archive), Box::new(stats), ArchiveOptions::from_context(ctx)))
    }

    fn new_accumulator(&self, ts: Timestamp) -> Accumulator {
        let start = start_of_interval(ts, self.options.archive_interval);
        Accumulator::new(
            TimeSpan::new(start, start + self.options.archive_interval),
            self.options.rules.clone(),
        )
    }

    fn add_packet(&mut self, packet: &Record, ctx: &mut ServiceContext<'_>) -> Result<()> {
        let ts = packet.date_time;
        let too_old = self.last_closed_end.map_or(false, |end| ts < end)
            || self.accumulator.as_ref().map_or(false, |a| ts < a.span().start);
        if too_old {
            debug!("Dropping late packet {}", ts);
            return Ok(());
        }

        if self.accumulator.is_none() {
            self.accumulator = Some(self.new_accumulator(ts));
        }
        let Some(current) = self.accumulator.as_mut() else {
            return Ok(());
        };

        match current.add_record(packet) {
            Ok(()) => Ok(()),
            Err(AccumError::OutOfSpan { .. }) => {
                // The packet opens a new interval
                let mut fresh = self.new_accumulator(ts);
                fresh.add_record(packet)?;
                if let Some(closed) = self.accumulator.replace(fresh) {
                    self.retire(closed, ctx)?;
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Park a closed accumulator until PostLoop
    fn retire(&mut self, closed: Accumulator, ctx: &mut ServiceContext<'_>) -> Result<()> {
        if let Some(stale) = self.old.replace(closed) {
            warn!("Interval {} was never closed out; emitting it now", stale.span());
            self.emit_record(stale, ctx)?;
        }
        Ok(())
    }

    fn emit_record(&mut self, closed: Accumulator, ctx: &mut ServiceContext<'_>) -> Result<()> {
        self.stats.update_hilo(&closed)?;
        self.advance_closed_end(closed.span().end);

        match self.options.record_generation {
            RecordGeneration::Software => {
                ctx.emit(Event::NewArchiveRecord(closed.get_record(), Origin::Software));
            }
            RecordGeneration::Hardware => {
                ctx.emit(Event::CatchupArchive(self.archive.last_good_timestamp()?));
            }
        }
        Ok(())
    }

    fn end_loop(&mut self, boundary: Timestamp, ctx: &mut ServiceContext<'_>) -> Result<()> {
        let now = ctx.now();
        let finished = self
            .accumulator
            .as_ref()
            .map_or(false, |a| a.span().end <= boundary && now >= a.span().end);
        if finished {
            if let Some(closed) = self.accumulator.take() {
                self.retire(closed, ctx)?;
            }
        }
        Ok(())
    }

    fn store(&mut self, record: &Record) -> Result<()> {
        self.advance_closed_end(record.date_time);
        // A record the archive refused must not reach the summaries either
        if self.archive.add_record(record)? {
            self.stats.add_record(record)?;
        }
        Ok(())
    }

    fn advance_closed_end(&mut self, end: Timestamp) {
        self.last_closed_end = Some(self.last_closed_end.map_or(end, |prev| prev.max(end)));
    }

    /// Packets older than the newest stored record are late
    fn startup(&mut self, ctx: &mut ServiceContext<'_>) -> Result<()> {
        let since = self.archive.last_good_timestamp()?;
        if let Some(last) = since {
            self.advance_closed_end(last);
        }
        if self.options.catchup {
            ctx.emit(Event::CatchupArchive(since));
        }
        Ok(())
    }
}

impl Service for ArchiveService {
    fn name(&self) -> &str {
        "archive"
    }

    fn subscriptions(&self) -> Vec<EventKind> {
        vec![
            EventKind::Startup,
            EventKind::NewLoopPacket,
            EventKind::EndLoop,
            EventKind::PostLoop,
            EventKind::NewArchiveRecord,
        ]
    }

    fn handle(&mut self, event: &mut Event, ctx: &mut ServiceContext<'_>) -> Result<()> {
        match event {
            Event::Startup => self.startup(ctx),
            Event::NewLoopPacket(packet) => self.add_packet(packet, ctx),
            Event::EndLoop(boundary) => self.end_loop(*boundary, ctx),
            Event::PostLoop => match self.old.take() {
                Some(old) => self.emit_record(old, ctx),
                None => Ok(()),
            },
            Event::NewArchiveRecord(record, _) => self.store(record),
            _ => Ok(()),
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        let archive = self.archive.close();
        let stats = self.stats.close();
        archive.and(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::station::ReplayStation;
    use crate::units::UnitSystem;

    const T: Timestamp = 1_700_000_100;

    struct Harness {
        service: ArchiveService,
        archive: Archive,
        stats: StatsDb,
        clock: ManualClock,
    }

    impl Harness {
        fn new(options: ArchiveOptions) -> Self {
            let archive = Archive::open_in_memory().unwrap();
            let stats = StatsDb::open_in_memory().unwrap();
            let service = ArchiveService::new(Box::new(archive.clone()), Box::new(stats.clone()), options);
            Self {
                service,
                archive,
                stats,
                clock: ManualClock::new(T),
            }
        }

        fn deliver(&mut self, mut event: Event) -> Vec<Event> {
            let mut station = ReplayStation::new(Vec::new());
            let mut emitted = Vec::new();
            let mut ctx = ServiceContext::new(&mut station, &self.clock, &mut emitted);
            self.service.handle(&mut event, &mut ctx).unwrap();
            emitted
        }

        fn packet(&mut self, ts: Timestamp, temp: f64) -> Vec<Event> {
            self.clock.set(ts);
            self.deliver(Event::NewLoopPacket(Record::new(ts, UnitSystem::Us).with("outTemp", temp)))
        }
    }

    fn archived(events: &[Event]) -> Vec<&Record> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::NewArchiveRecord(r, Origin::Software) => Some(r),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_close_without_accumulator_is_noop() {
        let mut h = Harness::new(ArchiveOptions::software(300));
        assert!(h.deliver(Event::EndLoop(T + 300)).is_empty());
        assert!(h.deliver(Event::PostLoop).is_empty());
    }

    #[test]
    fn test_rollover_emits_record_at_post_loop() {
        let mut h = Harness::new(ArchiveOptions::software(300));
        assert!(h.packet(T, 50.0).is_empty());
        assert!(h.packet(T + 150, 56.0).is_empty());
        assert!(h.packet(T + 299, 53.0).is_empty());
        assert!(h.packet(T + 301, 70.0).is_empty());

        let emitted = h.deliver(Event::PostLoop);
        let records = archived(&emitted);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date_time, T + 300);
        assert_eq!(records[0].get("outTemp"), Some(53.0));

        // Nothing is emitted twice
        assert!(h.deliver(Event::PostLoop).is_empty());

        // LOOP highs reach the statistics before the record does
        let day = crate::db::archive_day(T + 300);
        let summary = h.stats.day_summary(day, "outTemp").unwrap().unwrap();
        assert_eq!(summary.max, Some(56.0));
        assert_eq!(summary.count, 0);
    }

    #[test]
    fn test_end_loop_closes_finished_interval() {
        let mut h = Harness::new(ArchiveOptions::software(300));
        h.packet(T + 10, 50.0);

        // Boundary reached but the clock has not passed it yet
        h.clock.set(T + 200);
        assert!(h.deliver(Event::EndLoop(T + 300)).is_empty());
        assert!(h.deliver(Event::PostLoop).is_empty());

        h.clock.set(T + 316);
        h.deliver(Event::EndLoop(T + 300));
        let records = h.deliver(Event::PostLoop);
        assert_eq!(archived(&records).len(), 1);

        // A straggler from the closed interval is dropped
        assert!(h.packet(T + 290, 10.0).is_empty());
        h.packet(T + 320, 51.0);
        assert_eq!(
            h.service.accumulator.as_ref().map(|a| a.span()),
            Some(TimeSpan::new(T + 300, T + 600))
        );
    }

    #[test]
    fn test_stale_interval_is_emitted_immediately() {
        let mut h = Harness::new(ArchiveOptions::software(300));
        h.packet(T, 50.0);
        h.packet(T + 300, 51.0);
        let emitted = h.packet(T + 600, 52.0);
        let records = archived(&emitted);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date_time, T + 300);

        let emitted = h.deliver(Event::PostLoop);
        assert_eq!(archived(&emitted)[0].date_time, T + 600);
    }

    #[test]
    fn test_startup_requests_catchup_and_records_are_stored() {
        let mut h = Harness::new(ArchiveOptions::software(300));
        assert_eq!(h.deliver(Event::Startup), vec![Event::CatchupArchive(None)]);

        let mut record = Record::new(T + 300, UnitSystem::Us).with("outTemp", 49.0);
        record.interval = Some(5);
        h.deliver(Event::NewArchiveRecord(record.clone(), Origin::Hardware));
        assert_eq!(h.archive.get_record(T + 300).unwrap(), Some(record));
        assert_eq!(h.deliver(Event::Startup), vec![Event::CatchupArchive(Some(T + 300))]);

        let mut quiet = ArchiveOptions::software(300);
        quiet.catchup = false;
        assert!(Harness::new(quiet).deliver(Event::Startup).is_empty());
    }

    #[test]
    fn test_duplicate_record_is_counted_once() {
        let mut h = Harness::new(ArchiveOptions::software(300));
        let first = Record::new(T + 300, UnitSystem::Us).with("outTemp", 50.0);
        let second = Record::new(T + 300, UnitSystem::Us).with("outTemp", 90.0);
        h.deliver(Event::NewArchiveRecord(first, Origin::Hardware));
        h.deliver(Event::NewArchiveRecord(second, Origin::Software));

        assert_eq!(h.archive.get_record(T + 300).unwrap().unwrap().get("outTemp"), Some(50.0));
        let day = crate::db::archive_day(T + 300);
        let summary = h.stats.day_summary(day, "outTemp").unwrap().unwrap();
        assert_eq!(summary.count, 1);
        assert_eq!(summary.max, Some(50.0));
    }

    #[test]
    fn test_restart_drops_packets_already_archived() {
        let mut archive = Archive::open_in_memory().unwrap();
        archive
            .add_record(&Record::new(T + 300, UnitSystem::Us).with("outTemp", 50.0))
            .unwrap();
        let stats = StatsDb::open_in_memory().unwrap();
        let mut quiet = ArchiveOptions::software(300);
        quiet.catchup = false;
        let mut h = Harness {
            service: ArchiveService::new(Box::new(archive.clone()), Box::new(stats.clone()), quiet),
            archive,
            stats,
            clock: ManualClock::new(T),
        };

        assert!(h.deliver(Event::Startup).is_empty());
        // Falls in the interval the archive already holds
        h.packet(T + 150, 60.0);
        assert!(h.service.accumulator.is_none());
        h.packet(T + 310, 61.0);
        assert_eq!(
            h.service.accumulator.as_ref().map(|a| a.span()),
            Some(TimeSpan::new(T + 300, T + 600))
        );
    }

    #[test]
    fn test_hardware_generation_asks_station() {
        let mut options = ArchiveOptions::software(300);
        options.record_generation = RecordGeneration::Hardware;
        let mut h = Harness::new(options);
        h.packet(T, 50.0);
        h.packet(T + 305, 51.0);
        assert_eq!(h.deliver(Event::PostLoop), vec![Event::CatchupArchive(None)]);
    }

    #[test]
    fn test_unit_mismatch_is_an_error() {
        let mut h = Harness::new(ArchiveOptions::software(300));
        h.packet(T, 50.0);
        let mut station = ReplayStation::new(Vec::new());
        let mut emitted = Vec::new();
        let mut ctx = ServiceContext::new(&mut station, &h.clock, &mut emitted);
        let mut event = Event::NewLoopPacket(Record::new(T + 5, UnitSystem::MetricWx).with("outTemp", 10.0));
        let err = h.service.handle(&mut event, &mut ctx).unwrap_err();
        assert!(err.downcast_ref::<AccumError>().is_some());
    }
}
