// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Running per-field statistics held by an accumulator

use serde::{Deserialize, Serialize};

use crate::core::Timestamp;

/// Min/max/sum/count/last for one scalar observation type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScalarStats {
    pub min: Option<f64>,
    pub mintime: Option<Timestamp>,
    pub max: Option<f64>,
    pub maxtime: Option<Timestamp>,
    pub sum: f64,
    pub count: u64,
    pub last: Option<f64>,
    pub lasttime: Option<Timestamp>,
}

impl ScalarStats {
    pub fn add(&mut self, value: f64, ts: Timestamp) {
        if self.min.map_or(true, |min| value < min) {
            self.min = Some(value);
            self.mintime = Some(ts);
        }
        if self.max.map_or(true, |max| value > max) {
            self.max = Some(value);
            self.maxtime = Some(ts);
        }
        self.sum += value;
        self.count += 1;
        self.last = Some(value);
        self.lasttime = Some(ts);
    }

    pub fn avg(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }

    pub fn total(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum)
        }
    }
}

/// Vector wind statistics
///
/// Speed and direction are folded together so the average direction is
/// weighted by speed. Calm readings carry no direction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindStats {
    pub xsum: f64,
    pub ysum: f64,
    pub dir_count: u64,
    pub gust: Option<f64>,
    pub gust_dir: Option<f64>,
    pub gust_time: Option<Timestamp>,
}

impl WindStats {
    pub fn add(&mut self, speed: f64, direction: Option<f64>, ts: Timestamp) {
        if let Some(dir) = direction {
            let radians = dir.to_radians();
            self.xsum += speed * radians.sin();
            self.ysum += speed * radians.cos();
            self.dir_count += 1;
        }
        if self.gust.map_or(true, |gust| speed > gust) {
            self.gust = Some(speed);
            self.gust_dir = direction;
            self.gust_time = Some(ts);
        }
    }

    /// Speed-weighted mean direction in compass degrees
    pub fn vector_dir(&self) -> Option<f64> {
        if self.dir_count == 0 || (self.xsum == 0.0 && self.ysum == 0.0) {
            return None;
        }
        Some(self.xsum.atan2(self.ysum).to_degrees().rem_euclid(360.0))
    }

    pub fn vector_speed(&self) -> Option<f64> {
        if self.dir_count == 0 {
            return None;
        }
        Some(self.xsum.hypot(self.ysum) / self.dir_count as f64)
    }
}
