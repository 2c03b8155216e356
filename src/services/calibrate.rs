// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Calibration service - per-field correction expressions

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::Service;
use crate::config::Config;
use crate::core::{Event, EventKind, Origin, Record, ServiceContext};
use crate::expr::Expression;

/// Applies `calibrate.corrections` to packets and station archive records
///
/// Corrections run in the order they are configured and each sees the
/// record as already corrected by the ones before it. Archive records the engine synthesized
/// were built from corrected packets and are left alone.
pub struct CalibrateService {
    corrections: Vec<(String, Expression)>,
}

impl CalibrateService {
    pub fn new(corrections: Vec<(String, Expression)>) -> Self {
        Self { corrections }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut corrections = Vec::with_capacity(config.calibrate.corrections.len());
        for (obs_type, source) in &config.calibrate.corrections {
            let expr = Expression::parse(source)
                .with_context(|| format!("calibration expression for {}", obs_type))?;
            debug!("Calibration for {}: {}", obs_type, expr);
            corrections.push((obs_type.clone(), expr));
        }
        Ok(Self::new(corrections))
    }

    fn apply(&self, record: &mut Record) {
        for (obs_type, expr) in &self.corrections {
            if record.get(obs_type).is_none() {
                continue;
            }
            match expr.eval(record) {
                Ok(value) => record.set(obs_type, Some(value)),
                Err(e) => warn!("Calibration of {} at {} skipped: {}", obs_type, record.date_time, e),
            }
        }
    }
}

impl Service for CalibrateService {
    fn name(&self) -> &str {
        "calibrate"
    }

    fn subscriptions(&self) -> Vec<EventKind> {
        if self.corrections.is_empty() {
            return Vec::new();
        }
        vec![EventKind::NewLoopPacket, EventKind::NewArchiveRecord]
    }

    fn handle(&mut self, event: &mut Event, _ctx: &mut ServiceContext<'_>) -> Result<()> {
        match event {
            Event::NewLoopPacket(record) | Event::NewArchiveRecord(record, Origin::Hardware) => {
                self.apply(record)
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::station::ReplayStation;
    use crate::units::UnitSystem;

    fn service(pairs: &[(&str, &str)]) -> CalibrateService {
        let mut config = Config::default();
        for (obs_type, source) in pairs {
            config.calibrate.corrections.push((obs_type.to_string(), source.to_string()));
        }
        CalibrateService::from_config(&config).unwrap()
    }

    fn run(service: &mut CalibrateService, mut event: Event) -> Event {
        let mut station = ReplayStation::new(Vec::new());
        let clock = ManualClock::new(0);
        let mut emitted = Vec::new();
        let mut ctx = ServiceContext::new(&mut station, &clock, &mut emitted);
        service.handle(&mut event, &mut ctx).unwrap();
        event
    }

    #[test]
    fn test_corrections_chain_in_configured_order() {
        // outTemp is listed first, so dewpoint sees the corrected temperature
        let mut calibrate = service(&[("outTemp", "outTemp - 2"), ("dewpoint", "outTemp - 10")]);
        let packet = Record::new(300, UnitSystem::Us)
            .with("outTemp", 60.0)
            .with("dewpoint", 0.0);
        let out = run(&mut calibrate, Event::NewLoopPacket(packet.clone()));
        let record = out.record().unwrap();
        assert_eq!(record.get("outTemp"), Some(58.0));
        assert_eq!(record.get("dewpoint"), Some(48.0));

        let mut reversed = service(&[("dewpoint", "outTemp - 10"), ("outTemp", "outTemp - 2")]);
        let out = run(&mut reversed, Event::NewLoopPacket(packet));
        assert_eq!(out.record().unwrap().get("dewpoint"), Some(50.0));
    }

    #[test]
    fn test_nulls_and_missing_fields_are_untouched() {
        let mut calibrate = service(&[("outTemp", "outTemp * 2"), ("inTemp", "inTemp + outHumidity")]);
        let mut packet = Record::new(300, UnitSystem::Us).with("inTemp", 70.0);
        packet.set("outTemp", None);
        let out = run(&mut calibrate, Event::NewLoopPacket(packet));
        let record = out.record().unwrap();
        assert_eq!(record.get("outTemp"), None);
        // outHumidity is absent, so inTemp keeps its reading
        assert_eq!(record.get("inTemp"), Some(70.0));
    }

    #[test]
    fn test_software_records_are_not_recalibrated() {
        let mut calibrate = service(&[("outTemp", "outTemp + 1")]);
        let record = Record::new(300, UnitSystem::Us).with("outTemp", 50.0);

        let out = run(&mut calibrate, Event::NewArchiveRecord(record.clone(), Origin::Software));
        assert_eq!(out.record().unwrap().get("outTemp"), Some(50.0));

        let out = run(&mut calibrate, Event::NewArchiveRecord(record, Origin::Hardware));
        assert_eq!(out.record().unwrap().get("outTemp"), Some(51.0));
    }

    #[test]
    fn test_bad_expression_fails_load_and_empty_config_binds_nothing() {
        let mut config = Config::default();
        config.calibrate.corrections.push(("outTemp".to_string(), "outTemp ** 2".to_string()));
        assert!(CalibrateService::from_config(&config).is_err());

        assert!(service(&[]).subscriptions().is_empty());
    }
}
