// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Upload module - posts archive records to remote sites over HTTP or MQTT
//!
//! The engine thread only pushes timestamps onto a queue. A worker thread
//! owns its own archive connection, looks each record up and hands it to
//! every configured site.

mod http;
mod mqtt;

pub use http::HttpUploader;
pub use mqtt::MqttUploader;

use anyhow::Result;
use async_trait::async_trait;
use crossbeam::channel::Receiver;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};

use crate::config::StationConfig;
use crate::core::{Record, Timestamp, WorkerHandle};
use crate::db::{Archive, ArchiveSink};

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestfulConfig {
    pub sites: Vec<SiteConfig>,

    /// Seconds to wait for the worker to drain at shutdown
    pub shutdown_timeout_secs: u64,
}

impl Default for RestfulConfig {
    fn default() -> Self {
        Self {
            sites: Vec::new(),
            shutdown_timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Mqtt,
}

/// One upload destination
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub name: String,
    pub protocol: Protocol,

    /// HTTP endpoint
    pub url: Option<String>,

    /// MQTT broker
    pub broker: Option<String>,
    pub port: u16,
    pub topic: Option<String>,
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,

    pub timeout_secs: u64,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            protocol: Protocol::Http,
            url: None,
            broker: None,
            port: 1883,
            topic: None,
            client_id: None,
            username: None,
            password: None,
            timeout_secs: 10,
        }
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |s| !s.trim().is_empty())
}

impl SiteConfig {
    /// Name for logs, falling back to the protocol
    pub fn label(&self) -> &str {
        if !self.name.is_empty() {
            return &self.name;
        }
        match self.protocol {
            Protocol::Http => "http",
            Protocol::Mqtt => "mqtt",
        }
    }

    /// What is missing for this site to be usable, if anything
    pub fn missing(&self) -> Option<&'static str> {
        match self.protocol {
            Protocol::Http if !present(&self.url) => Some("url"),
            Protocol::Mqtt if !present(&self.broker) => Some("broker"),
            Protocol::Mqtt if !present(&self.topic) => Some("topic"),
            _ => None,
        }
    }
}

/// Sites with everything they need; the rest are skipped
pub fn usable_sites(sites: &[SiteConfig]) -> Vec<SiteConfig> {
    sites
        .iter()
        .filter(|site| match site.missing() {
            Some(field) => {
                debug!("Upload site {} skipped: no {}", site.label(), field);
                false
            }
            None => true,
        })
        .cloned()
        .collect()
}

/// Where the station stands; sent with every record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationMeta {
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl StationMeta {
    pub fn from_config(station: &StationConfig) -> Self {
        Self {
            location: station.location.clone(),
            latitude: station.latitude,
            longitude: station.longitude,
        }
    }
}

/// Body of one upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadPayload<'a> {
    pub station: &'a StationMeta,
    pub record: &'a Record,
}

/// A remote destination for archive records
#[async_trait]
pub trait Uploader: Send + Sync {
    fn name(&self) -> &str;

    async fn upload(&self, payload: &UploadPayload<'_>) -> Result<()>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Messages on the upload queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMessage {
    Record(Timestamp),
    Shutdown,
}

/// Drains the upload queue
pub struct UploadWorker {
    station: StationMeta,
    archive: Box<dyn ArchiveSink>,
    uploaders: Vec<Box<dyn Uploader>>,
}

impl UploadWorker {
    pub fn new(station: StationMeta, archive: Box<dyn ArchiveSink>, uploaders: Vec<Box<dyn Uploader>>) -> Self {
        Self {
            station,
            archive,
            uploaders,
        }
    }

    /// Post the record stamped `ts` to every site; returns how many took it
    pub async fn upload(&self, ts: Timestamp) -> usize {
        let record = match self.archive.get_record(ts) {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!("Record {} not in the archive, not uploaded", ts);
                return 0;
            }
            Err(e) => {
                error!("Reading record {} for upload failed: {:#}", ts, e);
                return 0;
            }
        };

        let payload = UploadPayload {
            station: &self.station,
            record: &record,
        };
        let mut delivered = 0;
        for uploader in &self.uploaders {
            match uploader.upload(&payload).await {
                Ok(()) => {
                    debug!("Uploaded record {} to {}", ts, uploader.name());
                    delivered += 1;
                }
                Err(e) => warn!("Upload of record {} to {} failed: {:#}", ts, uploader.name(), e),
            }
        }
        delivered
    }

    /// Process messages until `Shutdown` or until every sender is gone
    pub fn run(mut self, runtime: &Runtime, rx: Receiver<UploadMessage>) {
        for message in rx.iter() {
            match message {
                UploadMessage::Record(ts) => {
                    runtime.block_on(self.upload(ts));
                }
                UploadMessage::Shutdown => break,
            }
        }

        for uploader in &self.uploaders {
            if let Err(e) = runtime.block_on(uploader.close()) {
                warn!("Closing upload site {} failed: {:#}", uploader.name(), e);
            }
        }
        if let Err(e) = self.archive.close() {
            warn!("Closing upload archive connection failed: {:#}", e);
        }
        info!("Upload worker stopped");
    }
}

async fn connect_sites(sites: &[SiteConfig]) -> Vec<Box<dyn Uploader>> {
    let mut uploaders: Vec<Box<dyn Uploader>> = Vec::new();
    for site in sites {
        let uploader: Result<Box<dyn Uploader>> = match site.protocol {
            Protocol::Http => HttpUploader::new(site).map(|u| Box::new(u) as Box<dyn Uploader>),
            Protocol::Mqtt => MqttUploader::connect(site).map(|u| Box::new(u) as Box<dyn Uploader>),
        };
        match uploader {
            Ok(uploader) => {
                info!("Upload site {} ready", uploader.name());
                uploaders.push(uploader);
            }
            Err(e) => warn!("Upload site {} unavailable: {:#}", site.label(), e),
        }
    }
    uploaders
}

/// Start the upload worker thread for `sites`
pub fn spawn_upload_worker(
    archive_path: PathBuf,
    station: StationMeta,
    sites: Vec<SiteConfig>,
    rx: Receiver<UploadMessage>,
) -> Result<WorkerHandle> {
    WorkerHandle::spawn("restful", move || {
        // One runtime thread keeps MQTT event loops polled between uploads
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                error!("Upload worker runtime failed: {}", e);
                return;
            }
        };
        let archive = match Archive::open(&archive_path) {
            Ok(archive) => archive,
            Err(e) => {
                error!("Upload worker cannot open the archive: {:#}", e);
                return;
            }
        };

        let uploaders = runtime.block_on(connect_sites(&sites));
        UploadWorker::new(station, Box::new(archive), uploaders).run(&runtime, rx);
    })
}
