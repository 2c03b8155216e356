// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Report service - one report run per closed interval, off the engine thread

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::Service;
use crate::config::Config;
use crate::core::{Event, EventKind, ServiceContext, WorkerHandle};
use crate::db::{Archive, StatsDb};
use crate::report::{ReportExporter, ReportFormat};

/// Where a report run reads from and writes to
#[derive(Debug, Clone)]
struct ReportJob {
    archive_path: PathBuf,
    stats_path: PathBuf,
    output_dir: PathBuf,
    format: ReportFormat,
}

impl ReportJob {
    fn run(&self, all_days: bool) -> Result<()> {
        let archive = Archive::open(&self.archive_path)?;
        let stats = StatsDb::open(&self.stats_path)?;
        ReportExporter::new(&self.output_dir, self.format)?.run(&archive, &stats, all_days)?;
        Ok(())
    }
}

pub struct ReportService {
    job: Option<ReportJob>,
    worker: Option<WorkerHandle>,
    first_run: bool,
    shutdown_timeout: Duration,
}

impl ReportService {
    pub fn from_config(config: &Config) -> Self {
        let job = config.report.enabled.then(|| ReportJob {
            archive_path: config.archive_path(),
            stats_path: config.stats_path(),
            output_dir: config.data_path(&config.report.output_dir),
            format: config.report.format,
        });
        if job.is_none() {
            debug!("Reports disabled");
        }

        Self {
            job,
            worker: None,
            first_run: true,
            shutdown_timeout: Duration::from_secs(config.report.shutdown_timeout_secs),
        }
    }

    /// Start a report run unless the previous one is still going
    fn launch(&mut self) -> Result<()> {
        let Some(job) = self.job.clone() else {
            return Ok(());
        };
        if let Some(worker) = &mut self.worker {
            if !worker.is_finished() {
                warn!("Previous report run still active, skipping this one");
                return Ok(());
            }
            worker.join_timeout(Duration::ZERO);
        }

        let all_days = self.first_run;
        self.worker = Some(WorkerHandle::spawn("report", move || {
            if let Err(e) = job.run(all_days) {
                error!("Report generation failed: {:#}", e);
            }
        })?);
        self.first_run = false;
        Ok(())
    }
}

impl Service for ReportService {
    fn name(&self) -> &str {
        "report"
    }

    fn subscriptions(&self) -> Vec<EventKind> {
        if self.job.is_none() {
            return Vec::new();
        }
        vec![EventKind::PostLoop]
    }

    fn handle(&mut self, event: &mut Event, _ctx: &mut ServiceContext<'_>) -> Result<()> {
        if matches!(event, Event::PostLoop) {
            self.launch()?;
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        if let Some(mut worker) = self.worker.take() {
            if !worker.join_timeout(self.shutdown_timeout) {
                warn!("Report run did not finish within {:?}", self.shutdown_timeout);
            }
        }
        Ok(())
    }
}
