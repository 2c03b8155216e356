// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! wxcore - Weather Station Engine
//!
//! Turns a station's stream of instantaneous LOOP packets into
//! interval-aligned archive records, and drives everything else off the
//! same events:
//! - calibration, quality control and unit conversion of every packet
//! - SQLite archive plus daily summary statistics
//! - catch-up of records buffered in the station logger
//! - uploads over HTTP/MQTT and file reports on worker threads
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      wxcore Engine                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐  ┌───────────┐  ┌─────────┐  ┌─────────────┐   │
//! │  │ Station │→ │ Calibrate │→ │   QC    │→ │   Convert   │   │
//! │  └─────────┘  └───────────┘  └─────────┘  └─────────────┘   │
//! │       ↓             ↓             ↓              ↓          │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Event Bus                        │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! │       ↓             ↓             ↓              ↓          │
//! │  ┌─────────┐  ┌───────────┐  ┌─────────┐  ┌─────────────┐   │
//! │  │ Archive │  │  Stats DB │  │ Upload  │  │   Report    │   │
//! │  │ Service │  │           │  │ Worker  │  │   Worker    │   │
//! │  └─────────┘  └───────────┘  └─────────┘  └─────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod accum;
pub mod config;
pub mod core;
pub mod db;
pub mod expr;
pub mod report;
pub mod services;
pub mod station;
pub mod units;
pub mod upload;

// Re-exports for convenience
pub use config::Config;
pub use core::{ControlHandle, Engine, Event, EventBus, Record, Runner};
pub use services::{Service, ServiceRegistry};
pub use station::{Station, StationRegistry};
pub use units::UnitSystem;

/// wxcore version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// wxcore name
pub const NAME: &str = "wxcore";
