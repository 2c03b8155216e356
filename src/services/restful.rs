// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Upload service - queues new archive records for the upload worker

use anyhow::Result;
use crossbeam::channel::{unbounded, Sender};
use std::time::Duration;
use tracing::{info, warn};

use super::Service;
use crate::config::Config;
use crate::core::{Event, EventKind, ServiceContext, WorkerHandle};
use crate::upload::{spawn_upload_worker, usable_sites, StationMeta, UploadMessage};

pub struct RestfulService {
    queue: Option<Sender<UploadMessage>>,
    worker: Option<WorkerHandle>,
    shutdown_timeout: Duration,
}

impl RestfulService {
    /// Service feeding an already running worker
    pub fn new(queue: Sender<UploadMessage>, worker: WorkerHandle, shutdown_timeout: Duration) -> Self {
        Self {
            queue: Some(queue),
            worker: Some(worker),
            shutdown_timeout,
        }
    }

    /// Service with nothing to upload to
    pub fn idle() -> Self {
        Self {
            queue: None,
            worker: None,
            shutdown_timeout: Duration::ZERO,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let sites = usable_sites(&config.restful.sites);
        if sites.is_empty() {
            info!("No upload sites configured, uploads disabled");
            return Ok(Self::idle());
        }

        info!("Uploading archive records to {} site(s)", sites.len());
        let (tx, rx) = unbounded();
        let station = StationMeta::from_config(&config.station);
        let worker = spawn_upload_worker(config.archive_path(), station, sites, rx)?;
        Ok(Self::new(
            tx,
            worker,
            Duration::from_secs(config.restful.shutdown_timeout_secs),
        ))
    }
}

impl Service for RestfulService {
    fn name(&self) -> &str {
        "restful"
    }

    fn subscriptions(&self) -> Vec<EventKind> {
        if self.queue.is_none() {
            return Vec::new();
        }
        vec![EventKind::NewArchiveRecord]
    }

    fn handle(&mut self, event: &mut Event, _ctx: &mut ServiceContext<'_>) -> Result<()> {
        if let (Event::NewArchiveRecord(record, _), Some(queue)) = (&*event, &self.queue) {
            if queue.send(UploadMessage::Record(record.date_time)).is_err() {
                warn!("Upload worker is gone; record {} not queued", record.date_time);
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<()> {
        if let Some(queue) = self.queue.take() {
            let _ = queue.send(UploadMessage::Shutdown);
        }
        if let Some(mut worker) = self.worker.take() {
            if !worker.join_timeout(self.shutdown_timeout) {
                warn!("Upload worker did not stop within {:?}", self.shutdown_timeout);
            }
        }
        Ok(())
    }
}
