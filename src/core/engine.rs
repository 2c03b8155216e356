// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Main weather engine - owns the station, the services and the event bus,
//! and drives the archive-interval control loop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use super::{
    ArchiveSchedule, Clock, EngineError, EngineStats, Event, EventBus, EventKind, Origin,
    PacketStream, Record, ServiceId, Timestamp,
};
use crate::config::Config;
use crate::services::{validate_order, BuildContext, Service, ServiceRegistry};
use crate::station::{LoadedStation, Station, StationInfo, StationRegistry};

/// Shared shutdown/restart flags
///
/// Signal handlers set them; the engine checks them after every packet.
#[derive(Debug, Clone, Default)]
pub struct ControlHandle {
    shutdown: Arc<AtomicBool>,
    restart: Arc<AtomicBool>,
}

impl ControlHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn request_restart(&self) {
        self.restart.store(true, Ordering::SeqCst);
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Consume a pending restart request
    pub fn take_restart(&self) -> bool {
        self.restart.swap(false, Ordering::SeqCst)
    }
}

/// What a service sees of the engine while handling an event
pub struct ServiceContext<'a> {
    station: &'a mut dyn Station,
    clock: &'a dyn Clock,
    emitted: &'a mut Vec<Event>,
}

impl<'a> ServiceContext<'a> {
    pub fn new(station: &'a mut dyn Station, clock: &'a dyn Clock, emitted: &'a mut Vec<Event>) -> Self {
        Self {
            station,
            clock,
            emitted,
        }
    }

    /// Queue an event; it is dispatched as soon as the current callback returns
    pub fn emit(&mut self, event: Event) {
        self.emitted.push(event);
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn station(&mut self) -> &mut dyn Station {
        &mut *self.station
    }
}

/// The weather engine
pub struct Engine {
    station: Box<dyn Station>,
    clock: Arc<dyn Clock>,
    services: Vec<Box<dyn Service>>,
    bus: EventBus,
    schedule: ArchiveSchedule,
    control: ControlHandle,
    stats: EngineStats,
    shut_down: bool,
}

impl Engine {
    /// Open the configured station and load the configured services
    ///
    /// Any failure aborts construction; services loaded so far are shut down
    /// and the station is closed before the error is returned.
    pub fn build(
        config: &Config,
        stations: &StationRegistry,
        registry: &ServiceRegistry,
        control: ControlHandle,
    ) -> Result<Self> {
        config.validate()?;
        validate_order(&config.engine.services)?;

        let LoadedStation { mut station, clock } = stations.load(config)?;
        let info = StationInfo::of(station.as_ref());
        let archive_interval = match info.archive_interval {
            None => config.archive.archive_interval,
            Some(secs) if secs > 0 => secs,
            Some(secs) => {
                if let Err(close_err) = station.close() {
                    warn!("Closing station failed: {}", close_err);
                }
                return Err(EngineError::Config(format!(
                    "station {} reports an archive interval of {}s",
                    info.hardware, secs
                ))
                .into());
            }
        };
        let ctx = BuildContext {
            config,
            station: &info,
            archive_interval,
            clock: clock.clone(),
        };

        let mut services: Vec<Box<dyn Service>> = Vec::with_capacity(config.engine.services.len());
        for name in &config.engine.services {
            match registry.build(name, &ctx) {
                Ok(service) => {
                    debug!("Loaded service {}", name);
                    services.push(service);
                }
                Err(e) => {
                    shutdown_services(&mut services);
                    if let Err(close_err) = station.close() {
                        warn!("Closing station failed: {}", close_err);
                    }
                    return Err(e.context(format!("loading service '{}'", name)));
                }
            }
        }

        let schedule = ArchiveSchedule::new(archive_interval, config.archive.archive_delay);
        Ok(Self::assemble(station, clock, services, schedule, control))
    }

    /// Wire already-built parts together, binding every service's subscriptions
    pub fn assemble(
        station: Box<dyn Station>,
        clock: Arc<dyn Clock>,
        services: Vec<Box<dyn Service>>,
        schedule: ArchiveSchedule,
        control: ControlHandle,
    ) -> Self {
        let mut bus = EventBus::new();
        for (index, service) in services.iter().enumerate() {
            for kind in service.subscriptions() {
                debug!("Binding {} to {:?}", service.name(), kind);
                bus.bind(kind, ServiceId(index));
            }
        }
        debug!("{} services hold {} bindings", services.len(), bus.binding_count());

        Self {
            station,
            clock,
            services,
            bus,
            schedule,
            control,
            stats: EngineStats::default(),
            shut_down: false,
        }
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn schedule(&self) -> ArchiveSchedule {
        self.schedule
    }

    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.name()).collect()
    }

    /// Run until the station runs dry, a shutdown is requested or an error
    /// escapes; the engine is shut down in every case
    pub fn run(&mut self) -> Result<()> {
        let result = self.run_loop();
        self.shutdown();
        result
    }

    fn run_loop(&mut self) -> Result<()> {
        info!("Starting main packet loop on {}", self.station.hardware_name());
        self.dispatch(Event::Startup)?;

        loop {
            if self.control.shutdown_requested() {
                info!("Shutdown requested");
                return Ok(());
            }

            self.dispatch(Event::PreLoop)?;

            // Realigned to the clock every period
            let now = self.clock.now();
            let boundary = self.schedule.next_boundary(now);
            let mut stream = PacketStream::new(self.schedule.deadline(now));
            debug!(boundary, deadline = stream.deadline(), "Entering packet loop");

            while let Some(packet) = stream.next_packet(self.station.as_mut(), self.clock.as_ref()) {
                self.dispatch(Event::NewLoopPacket(packet?))?;

                if self.control.take_restart() {
                    return Err(EngineError::Restart.into());
                }
                if self.control.shutdown_requested() {
                    info!("Shutdown requested");
                    return Ok(());
                }
            }

            self.dispatch(Event::EndLoop(boundary))?;
            self.dispatch(Event::PostLoop)?;
            self.stats.intervals_closed += 1;

            if stream.is_exhausted() {
                info!("Station has no more packets");
                return Ok(());
            }
        }
    }

    /// Deliver an event to its subscribers, then to the engine's own handlers
    ///
    /// Events a service emits are dispatched as soon as its callback returns,
    /// before the next subscriber sees the original event.
    fn dispatch(&mut self, mut event: Event) -> Result<()> {
        self.stats.events_dispatched += 1;
        match event.kind() {
            EventKind::NewLoopPacket => self.stats.loop_packets += 1,
            EventKind::NewArchiveRecord => self.stats.archive_records += 1,
            _ => {}
        }

        let subscribers = self.bus.subscribers(event.kind()).to_vec();
        for id in subscribers {
            let mut emitted = Vec::new();
            let service = &mut self.services[id.0];
            let mut ctx = ServiceContext::new(self.station.as_mut(), self.clock.as_ref(), &mut emitted);
            service
                .handle(&mut event, &mut ctx)
                .with_context(|| format!("service {} failed on {:?}", service.name(), event.kind()))?;

            for follow_up in emitted {
                self.dispatch(follow_up)?;
            }
        }

        match event {
            Event::CatchupArchive(since) => self.catchup(since),
            Event::SetTime(ts) => self.set_station_time(ts),
            _ => Ok(()),
        }
    }

    /// Replay station-buffered archive records newer than `since`
    fn catchup(&mut self, since: Option<Timestamp>) -> Result<()> {
        let mut records: Vec<Record> = match self.station.archive_records_since(since) {
            Ok(records) => records.collect::<Result<_, _>>()?,
            Err(e) if e.is_not_supported() => {
                debug!("Catch-up skipped: {}", e);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        records.retain(|r| since.map_or(true, |ts| r.date_time > ts));
        records.sort_by_key(|r| r.date_time);
        if !records.is_empty() {
            info!("Catching up {} archive records from the station", records.len());
        }

        for record in records {
            self.stats.catchup_records += 1;
            self.dispatch(Event::NewArchiveRecord(record, Origin::Hardware))?;
        }
        Ok(())
    }

    fn set_station_time(&mut self, ts: Timestamp) -> Result<()> {
        match self.station.set_time(ts) {
            Ok(()) => {
                info!("Station clock set to {}", ts);
                Ok(())
            }
            Err(e) if e.is_not_supported() => {
                debug!("Station clock not set: {}", e);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Shut every service down in load order, then close the station
    ///
    /// Failures are logged and never stop the remaining teardown. Calling it
    /// again does nothing.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        shutdown_services(&mut self.services);
        self.bus.clear();
        if let Err(e) = self.station.close() {
            warn!("Closing station failed: {}", e);
        }

        info!(
            packets = self.stats.loop_packets,
            records = self.stats.archive_records,
            catchup = self.stats.catchup_records,
            "Engine shut down"
        );
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn shutdown_services(services: &mut [Box<dyn Service>]) {
    for service in services.iter_mut() {
        match service.shutdown() {
            Ok(()) => debug!("Service {} shut down", service.name()),
            Err(e) => warn!("Service {} failed to shut down: {:#}", service.name(), e),
        }
    }
}
