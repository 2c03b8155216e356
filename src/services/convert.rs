// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Unit conversion service

use anyhow::Result;
use tracing::debug;

use super::Service;
use crate::config::Config;
use crate::core::{Event, EventKind, ServiceContext};
use crate::units::{convert_record, UnitSystem};

/// Rewrites packets and archive records into the target unit system
pub struct ConvertService {
    target: UnitSystem,
}

impl ConvertService {
    pub fn new(target: UnitSystem) -> Self {
        Self { target }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let target = config.convert.target()?;
        debug!("Converting records to {}", target);
        Ok(Self::new(target))
    }
}

impl Service for ConvertService {
    fn name(&self) -> &str {
        "convert"
    }

    fn subscriptions(&self) -> Vec<EventKind> {
        vec![EventKind::NewLoopPacket, EventKind::NewArchiveRecord]
    }

    fn handle(&mut self, event: &mut Event, _ctx: &mut ServiceContext<'_>) -> Result<()> {
        if let Some(record) = event.record_mut() {
            if record.us_units != self.target {
                *record = convert_record(record, self.target);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ManualClock, Record};
    use crate::station::ReplayStation;

    #[test]
    fn test_packets_are_rewritten() {
        let mut service = ConvertService::new(UnitSystem::MetricWx);
        let mut station = ReplayStation::new(Vec::new());
        let clock = ManualClock::new(0);
        let mut emitted = Vec::new();
        let mut ctx = ServiceContext::new(&mut station, &clock, &mut emitted);

        let mut event = Event::NewLoopPacket(Record::new(300, UnitSystem::Us).with("outTemp", 32.0));
        service.handle(&mut event, &mut ctx).unwrap();
        let record = event.record().unwrap();
        assert_eq!(record.us_units, UnitSystem::MetricWx);
        assert_eq!(record.get("outTemp"), Some(0.0));

        let mut event = Event::PostLoop;
        service.handle(&mut event, &mut ctx).unwrap();
        assert_eq!(event, Event::PostLoop);
    }

    #[test]
    fn test_from_config_rejects_unknown_system() {
        let mut config = Config::default();
        config.convert.target_unit = "furlongs".to_string();
        assert!(ConvertService::from_config(&config).is_err());
        config.convert.target_unit = "metric".to_string();
        assert_eq!(ConvertService::from_config(&config).unwrap().target, UnitSystem::Metric);
    }
}
