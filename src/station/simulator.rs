// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Station simulator for demo/testing

use anyhow::{anyhow, Result};
use chrono::{NaiveDateTime, Utc};
use rand::prelude::*;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::time::Duration;

use super::{ArchiveRecords, Station, StationError};
use crate::core::{ManualClock, Record, Timestamp};
use crate::units::UnitSystem;

const SECS_PER_HOUR: f64 = 3600.0;

/// How the simulator paces its packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimulatorMode {
    /// Sleep between packets as real hardware would
    Simulator,
    /// Emit packets as fast as possible
    Generator,
}

/// Simulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Pacing mode
    pub mode: SimulatorMode,

    /// Seconds between LOOP packets
    pub loop_interval: f64,

    /// Simulated start time ("YYYY-MM-DD HH:MM", UTC); absent means real time
    pub start: Option<String>,

    /// Standard deviation of the Gaussian noise added to each observation
    pub noise_level: f64,

    /// RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            mode: SimulatorMode::Simulator,
            loop_interval: 2.5,
            start: None,
            noise_level: 0.0,
            seed: None,
        }
    }
}

/// A cyclic observation model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// Amplitude; the range is twice this value
    pub magnitude: f64,
    /// Mean over a full cycle
    pub average: f64,
    /// Cycle length in seconds
    pub period: f64,
    /// Seconds after `start` at which the maximum occurs
    pub phase_lag: f64,
    /// Time zero of the cycle
    pub start: f64,
}

impl Observation {
    pub fn new(magnitude: f64, average: f64, period_hours: f64, phase_lag_hours: f64, start: f64) -> Self {
        Self {
            magnitude,
            average,
            period: period_hours * SECS_PER_HOUR,
            phase_lag: phase_lag_hours * SECS_PER_HOUR,
            start,
        }
    }

    pub fn value_at(&self, time_ts: f64) -> f64 {
        let phase = 2.0 * PI * (time_ts - self.start - self.phase_lag) / self.period;
        self.magnitude * phase.cos() + self.average
    }
}

/// Simulates a weather station console
pub struct SimulatorStation {
    mode: SimulatorMode,
    loop_interval: f64,
    start_ts: Option<f64>,
    the_time: f64,
    observations: BTreeMap<&'static str, Observation>,
    rng: StdRng,
    noise: Option<Normal<f64>>,
    clock: ManualClock,
}

impl SimulatorStation {
    pub fn new(mode: SimulatorMode, loop_interval: f64, start_ts: Option<Timestamp>) -> Self {
        let the_time = start_ts.map(|ts| ts as f64).unwrap_or_else(now_secs);
        let start_of_day = (the_time / 86_400.0).floor() * 86_400.0;

        let mut observations = BTreeMap::new();
        observations.insert("outTemp", Observation::new(20.0, 50.0, 24.0, 14.0, start_of_day));
        observations.insert("inTemp", Observation::new(5.0, 68.0, 24.0, 12.0, start_of_day));
        observations.insert("barometer", Observation::new(1.0, 30.1, 96.0, 48.0, start_of_day));
        observations.insert("outHumidity", Observation::new(20.0, 60.0, 24.0, 2.0, start_of_day));
        observations.insert("windSpeed", Observation::new(5.0, 8.0, 12.0, 3.0, start_of_day));
        observations.insert("windDir", Observation::new(180.0, 180.0, 48.0, 0.0, start_of_day));

        Self {
            mode,
            loop_interval,
            start_ts: start_ts.map(|ts| ts as f64),
            the_time,
            observations,
            rng: StdRng::from_entropy(),
            noise: None,
            clock: ManualClock::new(the_time as Timestamp),
        }
    }

    pub fn from_config(config: &SimulatorConfig) -> Result<Self> {
        if config.loop_interval <= 0.0 {
            return Err(anyhow!("simulator loop_interval must be positive"));
        }
        let start_ts = match &config.start {
            Some(start) => Some(parse_start(start)?),
            None => None,
        };
        let mut simulator = Self::new(config.mode, config.loop_interval, start_ts);
        if let Some(seed) = config.seed {
            simulator.rng = StdRng::seed_from_u64(seed);
        }
        if config.noise_level > 0.0 {
            simulator.noise = Some(Normal::new(0.0, config.noise_level)?);
        }
        Ok(simulator)
    }

    pub fn mode(&self) -> SimulatorMode {
        self.mode
    }

    /// Clock that tracks simulated time in generator mode
    pub fn share_clock(&self) -> ManualClock {
        self.clock.clone()
    }

    fn pace(&self) {
        if self.mode != SimulatorMode::Simulator {
            return;
        }
        let wait = if self.start_ts.is_some() {
            self.loop_interval
        } else {
            // Real time: keep in step with the wall clock
            self.the_time + self.loop_interval - now_secs()
        };
        if wait > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(wait));
        }
    }

    fn generate(&mut self) -> Record {
        self.the_time += self.loop_interval;

        // A packet covers the loop interval, so sample its midpoint
        let avg_time = self.the_time - self.loop_interval / 2.0;
        let date_time = (self.the_time + 0.5).floor() as Timestamp;

        let mut packet = Record::new(date_time, UnitSystem::Us);
        for (obs_type, observation) in &self.observations {
            let mut value = observation.value_at(avg_time);
            if let Some(noise) = &self.noise {
                value += noise.sample(&mut self.rng);
            }
            let value = match *obs_type {
                "windSpeed" => value.max(0.0),
                "windDir" => value.rem_euclid(360.0),
                "outHumidity" => value.clamp(0.0, 100.0),
                _ => value,
            };
            packet.set(obs_type, Some(value));
        }

        // Low pressure brings a drizzle
        let rain = match packet.get("barometer") {
            Some(barometer) if barometer < 29.6 => 0.01,
            _ => 0.0,
        };
        packet.set("rain", Some(rain));

        if self.mode == SimulatorMode::Generator {
            self.clock.set(date_time);
        }
        packet
    }
}

impl Station for SimulatorStation {
    fn hardware_name(&self) -> &str {
        "Simulator"
    }

    fn next_packet(&mut self) -> Result<Option<Record>, StationError> {
        self.pace();
        Ok(Some(self.generate()))
    }

    fn archive_records_since(
        &mut self,
        since: Option<Timestamp>,
    ) -> Result<ArchiveRecords<'_>, StationError> {
        // No logger to read, but resume simulated time from the archive
        if let (Some(last_good), Some(_)) = (since, self.start_ts) {
            self.the_time = last_good as f64;
            self.clock.set(last_good);
        }
        Err(StationError::NotSupported("archive record retrieval"))
    }

    fn get_time(&mut self) -> Result<Timestamp, StationError> {
        Ok(self.the_time as Timestamp)
    }

    fn set_time(&mut self, ts: Timestamp) -> Result<(), StationError> {
        // Simulated time runs on its own schedule
        if self.start_ts.is_none() {
            self.the_time = ts as f64;
        }
        Ok(())
    }
}

fn now_secs() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

fn parse_start(start: &str) -> Result<Timestamp> {
    let parsed = NaiveDateTime::parse_from_str(start, "%Y-%m-%d %H:%M")
        .map_err(|e| anyhow!("invalid simulator start '{}': {}", start, e))?;
    Ok(parsed.and_utc().timestamp())
}
