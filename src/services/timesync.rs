// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Station clock synchronization

use anyhow::Result;
use tracing::{debug, info, warn};

use super::Service;
use crate::config::Config;
use crate::core::{Event, EventKind, ServiceContext, Timestamp};

/// Checks the station clock on PreLoop and asks the engine to reset it when
/// it has drifted too far
pub struct TimeSyncService {
    clock_check: i64,
    max_drift: i64,
    last_check: Option<Timestamp>,
}

impl TimeSyncService {
    pub fn new(clock_check: i64, max_drift: i64) -> Self {
        Self {
            clock_check,
            max_drift,
            last_check: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let clock_check = i64::try_from(config.station.clock_check).unwrap_or(i64::MAX);
        Self::new(clock_check, config.station.max_drift)
    }

    fn due(&self, now: Timestamp) -> bool {
        self.last_check
            .map_or(true, |last| now - last >= self.clock_check)
    }
}

impl Service for TimeSyncService {
    fn name(&self) -> &str {
        "timesync"
    }

    fn subscriptions(&self) -> Vec<EventKind> {
        vec![EventKind::PreLoop]
    }

    fn handle(&mut self, event: &mut Event, ctx: &mut ServiceContext<'_>) -> Result<()> {
        if !matches!(event, Event::PreLoop) {
            return Ok(());
        }
        let now = ctx.now();
        if !self.due(now) {
            return Ok(());
        }
        self.last_check = Some(now);

        let station_time = match ctx.station().get_time() {
            Ok(ts) => ts,
            Err(e) if e.is_not_supported() => {
                debug!("Clock check skipped: {}", e);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let drift = station_time - now;
        info!(drift, "Station clock error is {} seconds (positive is fast)", drift);
        if drift.abs() > self.max_drift {
            warn!("Station clock drift of {}s exceeds {}s, resetting", drift, self.max_drift);
            ctx.emit(Event::SetTime(now));
        }
        Ok(())
    }
}
