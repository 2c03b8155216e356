// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Core engine module - event model, dispatch and the archive control loop

mod engine;
mod event_bus;
mod runner;
mod scheduler;
mod worker;

pub use engine::{ControlHandle, Engine, ServiceContext};
pub use event_bus::{Event, EventBus, EventKind, Origin, ServiceId};
pub use runner::{Failure, RetryPolicy, Runner};
pub use scheduler::{start_of_interval, ArchiveSchedule, Clock, ManualClock, PacketStream, SystemClock};
pub use worker::WorkerHandle;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::units::UnitSystem;

/// Unix epoch seconds
pub type Timestamp = i64;

/// One observation record: a LOOP packet or an archive record
///
/// Packets leave `interval` unset; archive records carry the archive
/// interval in minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "dateTime")]
    pub date_time: Timestamp,

    #[serde(rename = "usUnits")]
    pub us_units: UnitSystem,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<i64>,

    /// Observation type -> value, `None` marks an explicit null
    #[serde(flatten)]
    pub values: BTreeMap<String, Option<f64>>,
}

impl Record {
    pub fn new(date_time: Timestamp, us_units: UnitSystem) -> Self {
        Self {
            date_time,
            us_units,
            interval: None,
            values: BTreeMap::new(),
        }
    }

    /// Value of an observation type, `None` if absent or null
    pub fn get(&self, obs_type: &str) -> Option<f64> {
        self.values.get(obs_type).copied().flatten()
    }

    pub fn set(&mut self, obs_type: &str, value: Option<f64>) {
        self.values.insert(obs_type.to_string(), value);
    }

    pub fn contains(&self, obs_type: &str) -> bool {
        self.values.contains_key(obs_type)
    }

    pub fn with(mut self, obs_type: &str, value: f64) -> Self {
        self.set(obs_type, Some(value));
        self
    }
}

/// Errors raised by the engine itself
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("restart requested")]
    Restart,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown service '{0}'")]
    UnknownService(String),

    #[error("unknown station type '{0}'")]
    UnknownStation(String),

    #[error("service '{later}' must run after '{earlier}'")]
    ServiceOrder { earlier: String, later: String },
}

/// Running counters for one engine instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub loop_packets: u64,
    pub archive_records: u64,
    pub intervals_closed: u64,
    pub catchup_records: u64,
    pub events_dispatched: u64,
}
