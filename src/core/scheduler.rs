// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Archive-period scheduling: clocks, interval boundaries and the
//! self-terminating packet stream

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use chrono::Utc;

use super::Timestamp;
use crate::station::{Station, StationError};
use super::Record;

/// Source of "now" for deadline checks
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().timestamp()
    }
}

/// Clock that only moves when told to
///
/// Clones share the same time, so a generator station and the engine can
/// follow simulated time together.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    pub fn set(&self, ts: Timestamp) {
        self.now.store(ts, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Start of the interval containing `ts`
pub fn start_of_interval(ts: Timestamp, interval: i64) -> Timestamp {
    ts - ts.rem_euclid(interval)
}

/// Archive interval and delay, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSchedule {
    pub interval: i64,
    pub delay: i64,
}

impl ArchiveSchedule {
    pub fn new(interval: i64, delay: i64) -> Self {
        Self { interval, delay }
    }

    /// First interval boundary strictly after `now`
    ///
    /// Recomputed from the clock before every packet loop, so the schedule
    /// stays aligned to wall-clock boundaries.
    pub fn next_boundary(&self, now: Timestamp) -> Timestamp {
        (now.div_euclid(self.interval) + 1) * self.interval
    }

    /// Time at which the packet loop for the boundary after `now` ends
    pub fn deadline(&self, now: Timestamp) -> Timestamp {
        self.next_boundary(now) + self.delay
    }
}

/// Packet loop over a station that ends itself once its deadline passes
///
/// The deadline is tested after each yielded packet, so the loop always
/// lets the packet that crossed the deadline through before stopping.
pub struct PacketStream {
    deadline: Timestamp,
    started: bool,
    exhausted: bool,
}

impl PacketStream {
    pub fn new(deadline: Timestamp) -> Self {
        Self {
            deadline,
            started: false,
            exhausted: false,
        }
    }

    pub fn deadline(&self) -> Timestamp {
        self.deadline
    }

    /// Whether the station ran out of packets, as opposed to the deadline passing
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Next packet, or `None` when the deadline passed or the station ran dry
    pub fn next_packet(
        &mut self,
        station: &mut dyn Station,
        clock: &dyn Clock,
    ) -> Option<Result<Record, StationError>> {
        if self.started && clock.now() >= self.deadline {
            return None;
        }
        self.started = true;
        match station.next_packet() {
            Ok(Some(packet)) => Some(Ok(packet)),
            Ok(None) => {
                self.exhausted = true;
                None
            }
            Err(e) => Some(Err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::ReplayStation;
    use crate::units::UnitSystem;

    #[test]
    fn test_boundaries_are_aligned() {
        let schedule = ArchiveSchedule::new(300, 15);
        assert_eq!(schedule.next_boundary(0), 300);
        assert_eq!(schedule.next_boundary(299), 300);
        assert_eq!(schedule.next_boundary(300), 600);
        assert_eq!(schedule.next_boundary(1_700_000_123), 1_700_000_400);
        assert_eq!(schedule.deadline(1_700_000_123), 1_700_000_415);
        assert_eq!(schedule.next_boundary(1_700_000_123) % 300, 0);
    }

    #[test]
    fn test_start_of_interval() {
        assert_eq!(start_of_interval(1_700_000_123, 300), 1_700_000_100);
        assert_eq!(start_of_interval(600, 300), 600);
        assert_eq!(start_of_interval(-1, 300), -300);
    }

    #[test]
    fn test_manual_clock_is_shared() {
        let clock = ManualClock::new(100);
        let other = clock.clone();
        other.advance(50);
        assert_eq!(clock.now(), 150);
        clock.set(10);
        assert_eq!(other.now(), 10);
    }

    #[test]
    fn test_stream_stops_after_deadline() {
        let clock = ManualClock::new(0);
        let packets = (1..=10)
            .map(|i| Record::new(i * 100, UnitSystem::Us).with("outTemp", i as f64))
            .collect();
        let mut station = ReplayStation::new(packets).with_clock(clock.clone());

        let mut stream = PacketStream::new(450);
        let mut seen = Vec::new();
        while let Some(packet) = stream.next_packet(&mut station, &clock) {
            seen.push(packet.unwrap().date_time);
        }
        // The packet at 500 crosses the deadline and is still delivered.
        assert_eq!(seen, vec![100, 200, 300, 400, 500]);
        assert!(!stream.is_exhausted());

        // A fresh stream picks up where the station left off.
        let mut stream = PacketStream::new(650);
        let next = stream.next_packet(&mut station, &clock).unwrap().unwrap();
        assert_eq!(next.date_time, 600);
    }

    #[test]
    fn test_stream_ends_when_station_runs_dry() {
        let clock = ManualClock::new(0);
        let mut station = ReplayStation::new(vec![Record::new(10, UnitSystem::Us)]);
        let mut stream = PacketStream::new(1_000);
        assert!(stream.next_packet(&mut station, &clock).is_some());
        assert!(stream.next_packet(&mut station, &clock).is_none());
        assert!(stream.is_exhausted());
    }
}
