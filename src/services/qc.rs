// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Quality control service

use anyhow::Result;
use std::collections::BTreeMap;
use tracing::info;

use super::Service;
use crate::config::Config;
use crate::core::{Event, EventKind, Record, ServiceContext};

/// Nulls values that fall outside their configured `[min, max]`
pub struct QcService {
    bounds: BTreeMap<String, (f64, f64)>,
}

impl QcService {
    pub fn new(bounds: BTreeMap<String, (f64, f64)>) -> Self {
        Self { bounds }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.qc.min_max.clone())
    }

    fn check(&self, record: &mut Record, kind: &str) {
        for (obs_type, (min, max)) in &self.bounds {
            if let Some(value) = record.get(obs_type) {
                if value < *min || value > *max {
                    info!(
                        "{} {} value '{}' {} outside limits ({}, {})",
                        record.date_time, kind, obs_type, value, min, max
                    );
                    record.set(obs_type, None);
                }
            }
        }
    }
}

impl Service for QcService {
    fn name(&self) -> &str {
        "qc"
    }

    fn subscriptions(&self) -> Vec<EventKind> {
        vec![EventKind::NewLoopPacket, EventKind::NewArchiveRecord]
    }

    fn handle(&mut self, event: &mut Event, _ctx: &mut ServiceContext<'_>) -> Result<()> {
        match event {
            Event::NewLoopPacket(packet) => self.check(packet, "LOOP"),
            Event::NewArchiveRecord(record, _) => self.check(record, "Archive"),
            _ => {}
        }
        Ok(())
    }
}
