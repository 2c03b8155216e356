// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Services - pluggable subscribers to engine events
//!
//! A service declares the event kinds it wants at load time; the engine binds
//! it once per kind, in load order. Callbacks may rewrite the event's record
//! in place and may emit follow-up events through the [`ServiceContext`].

mod archive;
mod calibrate;
mod convert;
mod print;
mod qc;
mod report;
mod restful;
mod timesync;

pub use archive::{ArchiveOptions, ArchiveService};
pub use calibrate::CalibrateService;
pub use convert::ConvertService;
pub use print::PrintService;
pub use qc::QcService;
pub use report::ReportService;
pub use restful::RestfulService;
pub use timesync::TimeSyncService;

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Config;
use crate::core::{Clock, EngineError, Event, EventKind, ServiceContext};
use crate::station::StationInfo;

/// A unit of behaviour driven by engine events
pub trait Service {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Event kinds to bind, each at most once
    fn subscriptions(&self) -> Vec<EventKind>;

    /// Handle one event
    fn handle(&mut self, event: &mut Event, ctx: &mut ServiceContext<'_>) -> Result<()>;

    /// Release queues, threads and files
    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// What a service constructor gets to look at
pub struct BuildContext<'a> {
    pub config: &'a Config,
    pub station: &'a StationInfo,
    /// Effective archive interval in seconds
    pub archive_interval: i64,
    pub clock: Arc<dyn Clock>,
}

type ServiceFactory = fn(&BuildContext<'_>) -> Result<Box<dyn Service>>;

/// Record-rewriting services and the order they must run in
const PIPELINE_ORDER: [&str; 4] = ["calibrate", "qc", "convert", "archive"];

/// Services that read back records the archive service stored
const ARCHIVE_READERS: [&str; 2] = ["restful", "report"];

/// Reject a service list that runs the record pipeline out of order
pub fn validate_order(names: &[String]) -> Result<(), EngineError> {
    let position = |stage: &str| names.iter().position(|name| name.eq_ignore_ascii_case(stage));

    let pipeline = PIPELINE_ORDER
        .iter()
        .enumerate()
        .flat_map(|(i, earlier)| PIPELINE_ORDER[i + 1..].iter().map(move |later| (*earlier, *later)));
    let readers = ARCHIVE_READERS.iter().map(|reader| ("archive", *reader));

    for (earlier, later) in pipeline.chain(readers) {
        if let (Some(earlier_pos), Some(later_pos)) = (position(earlier), position(later)) {
            if later_pos < earlier_pos {
                return Err(EngineError::ServiceOrder {
                    earlier: earlier.to_string(),
                    later: later.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Maps configured service names to constructors
pub struct ServiceRegistry {
    factories: BTreeMap<String, ServiceFactory>,
}

impl ServiceRegistry {
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with every built-in service
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("calibrate", |ctx| Ok(Box::new(CalibrateService::from_config(ctx.config)?)));
        registry.register("qc", |ctx| Ok(Box::new(QcService::from_config(ctx.config))));
        registry.register("convert", |ctx| Ok(Box::new(ConvertService::from_config(ctx.config)?)));
        registry.register("archive", |ctx| Ok(Box::new(ArchiveService::open(ctx)?)));
        registry.register("timesync", |ctx| Ok(Box::new(TimeSyncService::from_config(ctx.config))));
        registry.register("print", |_| Ok(Box::new(PrintService::new())));
        registry.register("restful", |ctx| Ok(Box::new(RestfulService::from_config(ctx.config)?)));
        registry.register("report", |ctx| Ok(Box::new(ReportService::from_config(ctx.config))));
        registry
    }

    pub fn register(&mut self, name: &str, factory: ServiceFactory) {
        self.factories.insert(name.to_ascii_lowercase(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_ascii_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn build(&self, name: &str, ctx: &BuildContext<'_>) -> Result<Box<dyn Service>> {
        let factory = self
            .factories
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| EngineError::UnknownService(name.to_string()))?;
        factory(ctx)
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
