// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Accumulator module - turns LOOP packets into one archive record per interval
//!
//! An [`Accumulator`] covers the half-open span `[start, end)`. Packets
//! inside the span update per-field statistics; anything else is rejected
//! without touching the state, which is how the archive service notices an
//! interval rolled over.

mod stats;

pub use stats::{ScalarStats, WindStats};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::core::{Record, Timestamp};
use crate::units::UnitSystem;

/// Half-open time span `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeSpan {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        self.start <= ts && ts < self.end
    }

    pub fn length(&self) -> i64 {
        self.end - self.start
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Accumulator rejections
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccumError {
    #[error("timestamp {ts} outside of accumulator span {span}")]
    OutOfSpan { ts: Timestamp, span: TimeSpan },

    #[error("unit system mismatch: accumulator holds {expected}, packet is {found}")]
    UnitMismatch {
        expected: UnitSystem,
        found: UnitSystem,
    },
}

/// How a field's archive value is derived from its statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractRule {
    Avg,
    Sum,
    Last,
    Min,
    Max,
    /// Speed-weighted vector average of the wind direction
    VectorDir,
    /// Magnitude of the mean wind vector
    VectorSpeed,
    /// Direction at the time of the highest wind speed
    GustDir,
    /// Leave the field out of the archive record
    Noop,
}

/// Field name -> extraction rule, with built-in defaults
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractRules {
    overrides: BTreeMap<String, ExtractRule>,
}

impl ExtractRules {
    pub fn new(overrides: BTreeMap<String, ExtractRule>) -> Self {
        Self { overrides }
    }

    pub fn rule_for(&self, obs_type: &str) -> ExtractRule {
        if let Some(rule) = self.overrides.get(obs_type) {
            return *rule;
        }
        match obs_type {
            "rain" | "ET" | "hail" => ExtractRule::Sum,
            "dayRain" | "monthRain" | "yearRain" | "stormRain" | "totalRain" => ExtractRule::Last,
            "windDir" => ExtractRule::VectorDir,
            "windGust" => ExtractRule::Max,
            "windGustDir" => ExtractRule::GustDir,
            _ => ExtractRule::Avg,
        }
    }
}

/// Aggregation state for one archive interval
#[derive(Debug, Clone)]
pub struct Accumulator {
    span: TimeSpan,
    unit_system: Option<UnitSystem>,
    fields: BTreeMap<String, ScalarStats>,
    wind: WindStats,
    rules: Arc<ExtractRules>,
}

impl Accumulator {
    pub fn new(span: TimeSpan, rules: Arc<ExtractRules>) -> Self {
        Self {
            span,
            unit_system: None,
            fields: BTreeMap::new(),
            wind: WindStats::default(),
            rules,
        }
    }

    pub fn span(&self) -> TimeSpan {
        self.span
    }

    pub fn unit_system(&self) -> Option<UnitSystem> {
        self.unit_system
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Per-field statistics, keyed by observation type
    pub fn fields(&self) -> impl Iterator<Item = (&str, &ScalarStats)> {
        self.fields.iter().map(|(name, stats)| (name.as_str(), stats))
    }

    pub fn field(&self, obs_type: &str) -> Option<&ScalarStats> {
        self.fields.get(obs_type)
    }

    pub fn wind(&self) -> &WindStats {
        &self.wind
    }

    /// Fold a packet into the statistics
    ///
    /// Null values register the field but leave its statistics alone.
    pub fn add_record(&mut self, packet: &Record) -> Result<(), AccumError> {
        let ts = packet.date_time;
        if !self.span.contains(ts) {
            return Err(AccumError::OutOfSpan {
                ts,
                span: self.span,
            });
        }
        if let Some(expected) = self.unit_system {
            if expected != packet.us_units {
                return Err(AccumError::UnitMismatch {
                    expected,
                    found: packet.us_units,
                });
            }
        }
        self.unit_system = Some(packet.us_units);

        for (obs_type, value) in &packet.values {
            let stats = self.fields.entry(obs_type.clone()).or_default();
            if let Some(value) = value {
                stats.add(*value, ts);
            }
        }

        if let Some(speed) = packet.get("windSpeed") {
            let direction = if speed > 0.0 { packet.get("windDir") } else { None };
            self.wind.add(speed, direction, ts);
        }
        Ok(())
    }

    /// Archive record for the span, stamped with its end time
    pub fn get_record(&self) -> Record {
        let mut record = Record::new(self.span.end, self.unit_system.unwrap_or(UnitSystem::Us));
        record.interval = Some(self.span.length() / 60);

        for (obs_type, stats) in &self.fields {
            let value = match self.rules.rule_for(obs_type) {
                ExtractRule::Avg => stats.avg(),
                ExtractRule::Sum => stats.total(),
                ExtractRule::Last => stats.last,
                ExtractRule::Min => stats.min,
                ExtractRule::Max => stats.max,
                ExtractRule::VectorDir => self.wind.vector_dir(),
                ExtractRule::VectorSpeed => self.wind.vector_speed(),
                ExtractRule::GustDir => self.wind.gust_dir,
                ExtractRule::Noop => continue,
            };
            record.set(obs_type, value);
        }

        // Stations without a gust sensor get the highest speed seen
        if self.fields.contains_key("windSpeed") {
            if !self.fields.contains_key("windGust") {
                record.set("windGust", self.wind.gust);
            }
            if !self.fields.contains_key("windGustDir") {
                record.set("windGustDir", self.wind.gust_dir);
            }
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Timestamp = 1_700_000_100;

    fn accumulator() -> Accumulator {
        Accumulator::new(TimeSpan::new(T, T + 300), Arc::new(ExtractRules::default()))
    }

    fn packet(ts: Timestamp, temp: f64) -> Record {
        Record::new(ts, UnitSystem::Us).with("outTemp", temp)
    }

    #[test]
    fn test_interval_boundaries() {
        let mut accum = accumulator();
        accum.add_record(&packet(T, 50.0)).unwrap();
        accum.add_record(&packet(T + 150, 56.0)).unwrap();
        accum.add_record(&packet(T + 299, 53.0)).unwrap();

        let before = accum.field("outTemp").cloned();
        for ts in [T + 300, T + 301, T - 1] {
            let err = accum.add_record(&packet(ts, 99.0)).unwrap_err();
            assert!(matches!(err, AccumError::OutOfSpan { .. }));
        }
        assert_eq!(accum.field("outTemp").cloned(), before);

        let record = accum.get_record();
        assert_eq!(record.date_time, T + 300);
        assert_eq!(record.date_time % 300, 0);
        assert_eq!(record.interval, Some(5));
        assert_eq!(record.get("outTemp"), Some(53.0));

        let stats = accum.field("outTemp").unwrap();
        assert_eq!(stats.min, Some(50.0));
        assert_eq!(stats.mintime, Some(T));
        assert_eq!(stats.max, Some(56.0));
        assert_eq!(stats.maxtime, Some(T + 150));
    }

    #[test]
    fn test_get_record_is_idempotent() {
        let mut accum = accumulator();
        accum.add_record(&packet(T + 10, 40.0).with("rain", 0.01)).unwrap();
        accum.add_record(&packet(T + 20, 42.0).with("rain", 0.02)).unwrap();
        let first = accum.get_record();
        assert_eq!(first, accum.get_record());
        assert!((first.get("rain").unwrap() - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_unit_mismatch_leaves_state() {
        let mut accum = accumulator();
        accum.add_record(&packet(T, 50.0)).unwrap();
        let metric = Record::new(T + 5, UnitSystem::Metric).with("outTemp", 10.0);
        assert_eq!(
            accum.add_record(&metric),
            Err(AccumError::UnitMismatch {
                expected: UnitSystem::Us,
                found: UnitSystem::Metric
            })
        );
        assert_eq!(accum.field("outTemp").unwrap().count, 1);
    }

    #[test]
    fn test_nulls_are_present_but_not_counted() {
        let mut accum = accumulator();
        let mut null_packet = Record::new(T + 1, UnitSystem::Us);
        null_packet.set("outTemp", None);
        accum.add_record(&null_packet).unwrap();

        let record = accum.get_record();
        assert!(record.contains("outTemp"));
        assert_eq!(record.get("outTemp"), None);
        assert_eq!(accum.field("outTemp").unwrap().count, 0);
    }

    #[test]
    fn test_wind_extraction() {
        let mut accum = accumulator();
        let wind = |ts, speed, dir| {
            Record::new(ts, UnitSystem::Us)
                .with("windSpeed", speed)
                .with("windDir", dir)
        };
        accum.add_record(&wind(T + 1, 4.0, 80.0)).unwrap();
        accum.add_record(&wind(T + 2, 10.0, 100.0)).unwrap();
        accum.add_record(&wind(T + 3, 4.0, 90.0)).unwrap();

        let record = accum.get_record();
        assert_eq!(record.get("windSpeed"), Some(6.0));
        assert!((record.get("windDir").unwrap() - 93.2).abs() < 0.5);
        assert_eq!(record.get("windGust"), Some(10.0));
        assert_eq!(record.get("windGustDir"), Some(100.0));
    }

    #[test]
    fn test_vector_speed_rule() {
        let mut overrides = BTreeMap::new();
        overrides.insert("windSpeed".to_string(), ExtractRule::VectorSpeed);
        let mut accum = Accumulator::new(TimeSpan::new(T, T + 300), Arc::new(ExtractRules::new(overrides)));
        // Opposing winds cancel out
        accum.add_record(&Record::new(T + 1, UnitSystem::Us).with("windSpeed", 6.0).with("windDir", 90.0)).unwrap();
        accum.add_record(&Record::new(T + 2, UnitSystem::Us).with("windSpeed", 6.0).with("windDir", 270.0)).unwrap();

        let record = accum.get_record();
        assert!(record.get("windSpeed").unwrap().abs() < 1e-9);
        assert_eq!(record.get("windGust"), Some(6.0));
    }

    #[test]
    fn test_rule_overrides() {
        let mut overrides = BTreeMap::new();
        overrides.insert("outTemp".to_string(), ExtractRule::Max);
        overrides.insert("inTemp".to_string(), ExtractRule::Noop);
        let mut accum = Accumulator::new(TimeSpan::new(T, T + 300), Arc::new(ExtractRules::new(overrides)));
        accum.add_record(&packet(T, 50.0).with("inTemp", 70.0)).unwrap();
        accum.add_record(&packet(T + 60, 58.0).with("inTemp", 71.0)).unwrap();

        let record = accum.get_record();
        assert_eq!(record.get("outTemp"), Some(58.0));
        assert!(!record.contains("inTemp"));
    }
}
