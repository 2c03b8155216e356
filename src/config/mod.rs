// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Configuration module

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::accum::ExtractRule;
use crate::core::EngineError;
use crate::expr::Expression;
use crate::report::ReportConfig;
use crate::station::{ReplayConfig, SimulatorConfig};
use crate::units::UnitSystem;
use crate::upload::RestfulConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory; relative database paths live here
    pub data_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// Station configuration
    pub station: StationConfig,

    /// Simulator configuration
    pub simulator: SimulatorConfig,

    /// Replay station configuration
    pub replay: ReplayConfig,

    /// Engine configuration
    pub engine: EngineConfig,

    /// Archive configuration
    pub archive: ArchiveConfig,

    /// Unit conversion
    pub convert: ConvertConfig,

    /// Calibration corrections
    pub calibrate: CalibrateConfig,

    /// Quality control bounds
    pub qc: QcConfig,

    /// Upload sites
    pub restful: RestfulConfig,

    /// Report generation
    pub report: ReportConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            station: StationConfig::default(),
            simulator: SimulatorConfig::default(),
            replay: ReplayConfig::default(),
            engine: EngineConfig::default(),
            archive: ArchiveConfig::default(),
            convert: ConvertConfig::default(),
            calibrate: CalibrateConfig::default(),
            qc: QcConfig::default(),
            restful: RestfulConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            // Create parent directories
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("wxcore"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Resolve a path against the data directory
    pub fn data_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    pub fn archive_path(&self) -> PathBuf {
        self.data_path(&self.archive.archive_path)
    }

    pub fn stats_path(&self) -> PathBuf {
        self.data_path(&self.archive.stats_path)
    }

    /// Check the settings the engine cannot run without
    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |msg: String| -> Result<(), EngineError> { Err(EngineError::Config(msg)) };

        if self.station.station_type.trim().is_empty() {
            return invalid("station.station_type is empty".to_string());
        }
        if self.archive.archive_interval <= 0 || self.archive.archive_interval % 60 != 0 {
            return invalid(format!(
                "archive.archive_interval must be a positive multiple of 60, got {}",
                self.archive.archive_interval
            ));
        }
        if self.archive.archive_delay < 0 || self.archive.archive_delay >= self.archive.archive_interval {
            return invalid(format!(
                "archive.archive_delay must lie in [0, archive_interval), got {}",
                self.archive.archive_delay
            ));
        }
        if self.engine.services.is_empty() {
            return invalid("engine.services is empty".to_string());
        }
        self.convert.target()?;

        for (obs_type, (min, max)) in &self.qc.min_max {
            if min > max {
                return invalid(format!("qc bounds for {} are reversed: [{}, {}]", obs_type, min, max));
            }
        }
        for (obs_type, source) in &self.calibrate.corrections {
            Expression::parse(source).map_err(|e| {
                EngineError::Config(format!("calibration for {}: {}", obs_type, e))
            })?;
        }
        Ok(())
    }
}

/// Where archive records come from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordGeneration {
    /// Synthesized from LOOP packets
    Software,
    /// Read back from the station's logger
    Hardware,
}

/// Station configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Station driver name
    pub station_type: String,

    /// Free-form location label
    pub location: String,

    pub latitude: f64,
    pub longitude: f64,

    pub record_generation: RecordGeneration,

    /// Seconds between station clock checks
    pub clock_check: u64,

    /// Largest tolerated clock drift in seconds
    pub max_drift: i64,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            station_type: "simulator".to_string(),
            location: "Nowhere".to_string(),
            latitude: 0.0,
            longitude: 0.0,
            record_generation: RecordGeneration::Software,
            clock_check: 14_400,
            max_drift: 5,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Services to load, in order
    pub services: Vec<String>,

    /// Seconds to wait before retrying after a station I/O error
    pub io_retry_wait: u64,

    /// Seconds to wait before retrying after an operating system error
    pub os_retry_wait: u64,

    /// Exit instead of retrying after a station I/O error
    pub exit_on_io_error: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            services: ["timesync", "calibrate", "qc", "convert", "archive", "restful", "report"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            io_retry_wait: 60,
            os_retry_wait: 10,
            exit_on_io_error: false,
        }
    }
}

/// Archive configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Archive interval in seconds, unless the hardware reports one
    pub archive_interval: i64,

    /// Seconds to keep listening for packets after a boundary
    pub archive_delay: i64,

    /// Archive database path
    pub archive_path: PathBuf,

    /// Statistics database path
    pub stats_path: PathBuf,

    /// Replay station-buffered records at startup
    pub catchup: bool,

    /// Per-field extraction rule overrides
    pub extract: BTreeMap<String, ExtractRule>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            archive_interval: 300,
            archive_delay: 15,
            archive_path: PathBuf::from("weather.sdb"),
            stats_path: PathBuf::from("weather_stats.sdb"),
            catchup: true,
            extract: BTreeMap::new(),
        }
    }
}

/// Unit conversion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// Target unit system: US, METRIC or METRICWX
    pub target_unit: String,
}

impl ConvertConfig {
    pub fn target(&self) -> Result<UnitSystem, EngineError> {
        self.target_unit.parse()
    }
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            target_unit: "US".to_string(),
        }
    }
}

/// Calibration configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrateConfig {
    /// Observation type -> correction expression, applied in file order
    #[serde(with = "ordered_table")]
    pub corrections: Vec<(String, String)>,
}

/// A TOML table read as `(key, value)` pairs in the order they were written
mod ordered_table {
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(pairs: &[(String, String)], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(pairs.len()))?;
        for (key, value) in pairs {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<(String, String)>, D::Error> {
        struct Pairs;

        impl<'de> Visitor<'de> for Pairs {
            type Value = Vec<(String, String)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of strings")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(pair) = access.next_entry::<String, String>()? {
                    pairs.push(pair);
                }
                Ok(pairs)
            }
        }

        deserializer.deserialize_map(Pairs)
    }
}

/// Quality control configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QcConfig {
    /// Observation type -> (min, max)
    pub min_max: BTreeMap<String, (f64, f64)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.archive.archive_interval, 300);
        assert_eq!(config.engine.services[0], "timesync");
        assert_eq!(config.archive_path(), PathBuf::from("./data/weather.sdb"));
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [archive]
            archive_interval = 600

            [calibrate.corrections]
            outTemp = "outTemp - 0.5"

            [qc.min_max]
            outTemp = [-40.0, 120.0]
        "#,
        )
        .unwrap();
        assert_eq!(config.archive.archive_interval, 600);
        assert_eq!(config.archive.archive_delay, 15);
        assert_eq!(config.qc.min_max["outTemp"], (-40.0, 120.0));
        assert_eq!(config.station.station_type, "simulator");
        config.validate().unwrap();
    }

    #[test]
    fn test_corrections_keep_file_order() {
        let text = r#"
            [calibrate.corrections]
            outTemp = "outTemp - 2"
            dewpoint = "outTemp - 10"
            barometer = "barometer + 0.01"
        "#;
        let config: Config = toml::from_str(text).unwrap();
        let order: Vec<_> = config.calibrate.corrections.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(order, ["outTemp", "dewpoint", "barometer"]);

        let reread: Config = toml::from_str(&toml::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(reread.calibrate.corrections, config.calibrate.corrections);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.archive.archive_interval = 90;
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));

        let mut config = Config::default();
        config.convert.target_unit = "imperial".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.qc.min_max.insert("outTemp".to_string(), (120.0, -40.0));
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.calibrate.corrections.push(("outTemp".to_string(), "outTemp +".to_string()));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_create_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("wxcore.toml");

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.engine.services, created.engine.services);
        assert_eq!(loaded.station.record_generation, RecordGeneration::Software);
    }
}
