// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Unit systems and the minimal conversion table used by the convert service

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::{EngineError, Record};

/// Unit system tag carried by every record (`usUnits`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum UnitSystem {
    /// Fahrenheit, inHg, inches, mph
    Us,
    /// Celsius, mbar, cm, km/h
    Metric,
    /// Celsius, mbar, mm, m/s
    MetricWx,
}

impl UnitSystem {
    pub const fn code(self) -> u8 {
        match self {
            UnitSystem::Us => 1,
            UnitSystem::Metric => 16,
            UnitSystem::MetricWx => 17,
        }
    }
}

impl From<UnitSystem> for u8 {
    fn from(system: UnitSystem) -> Self {
        system.code()
    }
}

impl TryFrom<u8> for UnitSystem {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(UnitSystem::Us),
            16 => Ok(UnitSystem::Metric),
            17 => Ok(UnitSystem::MetricWx),
            other => Err(format!("unknown unit system code {}", other)),
        }
    }
}

impl FromStr for UnitSystem {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "US" => Ok(UnitSystem::Us),
            "METRIC" => Ok(UnitSystem::Metric),
            "METRICWX" => Ok(UnitSystem::MetricWx),
            _ => Err(EngineError::Config(format!("unknown unit system '{}'", s))),
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitSystem::Us => "US",
            UnitSystem::Metric => "METRIC",
            UnitSystem::MetricWx => "METRICWX",
        };
        write!(f, "{}", name)
    }
}

/// Physical quantity an observation type belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitGroup {
    Temperature,
    Pressure,
    Rain,
    RainRate,
    Speed,
}

fn group_of(obs_type: &str) -> Option<UnitGroup> {
    match obs_type {
        "outTemp" | "inTemp" | "dewpoint" | "windchill" | "heatindex" | "extraTemp1"
        | "extraTemp2" | "soilTemp1" => Some(UnitGroup::Temperature),
        "barometer" | "pressure" | "altimeter" => Some(UnitGroup::Pressure),
        "rain" | "ET" | "hail" => Some(UnitGroup::Rain),
        "rainRate" | "hailRate" => Some(UnitGroup::RainRate),
        "windSpeed" | "windGust" | "windSpeed10" => Some(UnitGroup::Speed),
        _ => None,
    }
}

/// Convert one value of the given group between unit systems
fn convert_value(group: UnitGroup, value: f64, from: UnitSystem, to: UnitSystem) -> f64 {
    if from == to {
        return value;
    }
    match group {
        UnitGroup::Temperature => match (from, to) {
            (UnitSystem::Us, _) => (value - 32.0) * 5.0 / 9.0,
            (_, UnitSystem::Us) => value * 9.0 / 5.0 + 32.0,
            _ => value,
        },
        UnitGroup::Pressure => match (from, to) {
            (UnitSystem::Us, _) => value * 33.863_886_666_7,
            (_, UnitSystem::Us) => value / 33.863_886_666_7,
            _ => value,
        },
        UnitGroup::Rain | UnitGroup::RainRate => {
            let mm = match from {
                UnitSystem::Us => value * 25.4,
                UnitSystem::Metric => value * 10.0,
                UnitSystem::MetricWx => value,
            };
            match to {
                UnitSystem::Us => mm / 25.4,
                UnitSystem::Metric => mm / 10.0,
                UnitSystem::MetricWx => mm,
            }
        }
        UnitGroup::Speed => {
            let kph = match from {
                UnitSystem::Us => value * 1.609_344,
                UnitSystem::Metric => value,
                UnitSystem::MetricWx => value * 3.6,
            };
            match to {
                UnitSystem::Us => kph / 1.609_344,
                UnitSystem::Metric => kph,
                UnitSystem::MetricWx => kph / 3.6,
            }
        }
    }
}

/// Return a copy of `record` expressed in `target`
///
/// Observation types without a known unit group are copied unchanged.
pub fn convert_record(record: &Record, target: UnitSystem) -> Record {
    let from = record.us_units;
    let mut converted = record.clone();
    converted.us_units = target;
    if from == target {
        return converted;
    }

    for (obs_type, value) in converted.values.iter_mut() {
        if let (Some(group), Some(v)) = (group_of(obs_type), value.as_mut()) {
            *v = convert_value(group, *v, from, target);
        }
    }
    converted
}
