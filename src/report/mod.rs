// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Report module - file reports regenerated after every archive interval

mod export;

pub use export::{day_label, ReportExporter, ReportSummary};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Report configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub enabled: bool,

    /// Output directory, relative to the data directory unless absolute
    pub output_dir: PathBuf,

    pub format: ReportFormat,

    /// Seconds to wait for a running report at shutdown
    pub shutdown_timeout_secs: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            output_dir: PathBuf::from("reports"),
            format: ReportFormat::Json,
            shutdown_timeout_secs: 20,
        }
    }
}

/// Per-day file format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// One JSON record per line
    Json,
    Csv,
}
