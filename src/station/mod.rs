// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Station module - observation sources (hardware drivers, simulator, replay)

mod replay;
mod simulator;

pub use replay::{read_packets, ReplayConfig, ReplayStation};
pub use simulator::{Observation, SimulatorConfig, SimulatorMode, SimulatorStation};

use std::collections::BTreeMap;
use std::sync::Arc;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::core::{Clock, EngineError, Record, SystemClock, Timestamp};

/// Errors reported by a station
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StationError {
    /// Communication with the hardware failed; the engine is rebuilt
    #[error("station I/O error: {0}")]
    Io(String),

    /// The station does not offer this optional capability
    #[error("station does not support {0}")]
    NotSupported(&'static str),
}

impl StationError {
    pub fn io(err: impl std::fmt::Display) -> Self {
        StationError::Io(err.to_string())
    }

    pub fn is_not_supported(&self) -> bool {
        matches!(self, StationError::NotSupported(_))
    }
}

/// Boxed sequence of archive records read back from a station
pub type ArchiveRecords<'a> = Box<dyn Iterator<Item = Result<Record, StationError>> + 'a>;

/// Trait for every observation source
///
/// Only `next_packet` is mandatory. Optional capabilities default to
/// `StationError::NotSupported`.
pub trait Station {
    /// Hardware name for logging
    fn hardware_name(&self) -> &str;

    /// Next LOOP packet; `Ok(None)` once a finite source is exhausted
    fn next_packet(&mut self) -> Result<Option<Record>, StationError>;

    /// Archive records stored on the station newer than `since`
    fn archive_records_since(
        &mut self,
        _since: Option<Timestamp>,
    ) -> Result<ArchiveRecords<'_>, StationError> {
        Err(StationError::NotSupported("archive record retrieval"))
    }

    /// Archive interval the hardware logger is set to, in seconds
    fn archive_interval(&self) -> Option<i64> {
        None
    }

    fn get_time(&mut self) -> Result<Timestamp, StationError> {
        Err(StationError::NotSupported("reading the clock"))
    }

    fn set_time(&mut self, _ts: Timestamp) -> Result<(), StationError> {
        Err(StationError::NotSupported("setting the clock"))
    }

    /// Release the port/connection
    fn close(&mut self) -> Result<(), StationError> {
        Ok(())
    }
}

/// Snapshot of station facts handed to services at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationInfo {
    pub hardware: String,
    pub archive_interval: Option<i64>,
}

impl StationInfo {
    pub fn of(station: &dyn Station) -> Self {
        Self {
            hardware: station.hardware_name().to_string(),
            archive_interval: station.archive_interval(),
        }
    }
}

/// A loaded station and the clock the engine should follow
pub struct LoadedStation {
    pub station: Box<dyn Station>,
    pub clock: Arc<dyn Clock>,
}

type StationLoader = fn(&Config) -> Result<LoadedStation>;

/// Maps `station.station_type` names to loaders
pub struct StationRegistry {
    loaders: BTreeMap<String, StationLoader>,
}

impl StationRegistry {
    pub fn empty() -> Self {
        Self {
            loaders: BTreeMap::new(),
        }
    }

    /// Registry with every built-in station type
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("simulator", load_simulator);
        registry.register("replay", load_replay);
        registry
    }

    pub fn register(&mut self, station_type: &str, loader: StationLoader) {
        self.loaders.insert(station_type.to_ascii_lowercase(), loader);
    }

    pub fn load(&self, config: &Config) -> Result<LoadedStation> {
        let station_type = config.station.station_type.to_ascii_lowercase();
        let loader = self
            .loaders
            .get(&station_type)
            .ok_or_else(|| EngineError::UnknownStation(station_type.clone()))?;
        let loaded = loader(config)?;
        info!("Opened station hardware: {}", loaded.station.hardware_name());
        Ok(loaded)
    }
}

impl Default for StationRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn load_simulator(config: &Config) -> Result<LoadedStation> {
    let simulator = SimulatorStation::from_config(&config.simulator)?;
    let clock: Arc<dyn Clock> = match simulator.mode() {
        SimulatorMode::Generator => Arc::new(simulator.share_clock()),
        SimulatorMode::Simulator => Arc::new(SystemClock),
    };
    Ok(LoadedStation {
        station: Box::new(simulator),
        clock,
    })
}

fn load_replay(config: &Config) -> Result<LoadedStation> {
    let replay = ReplayStation::from_config(&config.replay)?;
    info!("Replaying {} packets", replay.remaining());
    let clock: Arc<dyn Clock> = match replay.share_clock() {
        Some(clock) => Arc::new(clock),
        None => Arc::new(SystemClock),
    };
    Ok(LoadedStation {
        station: Box::new(replay),
        clock,
    })
}
