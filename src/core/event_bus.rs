// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/wxcore

//! Event bus for engine/service communication

use std::collections::HashMap;
use std::fmt;
use serde::{Deserialize, Serialize};

use super::{Record, Timestamp};

/// Event kinds known to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Startup,
    PreLoop,
    NewLoopPacket,
    EndLoop,
    PostLoop,
    NewArchiveRecord,
    CatchupArchive,
    SetTime,
}

/// Where an archive record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Synthesized by the engine from LOOP packets
    Software,
    /// Read back from the station's logger
    Hardware,
}

/// An event and its payload
///
/// Services receive events by mutable reference, so a packet or record
/// rewritten by one service is what the next service sees.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Startup,
    PreLoop,
    NewLoopPacket(Record),
    /// The packet loop ended; carries the interval boundary that was reached
    EndLoop(Timestamp),
    PostLoop,
    NewArchiveRecord(Record, Origin),
    /// Request for station records newer than the given timestamp
    CatchupArchive(Option<Timestamp>),
    /// Request to set the station clock
    SetTime(Timestamp),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Startup => EventKind::Startup,
            Event::PreLoop => EventKind::PreLoop,
            Event::NewLoopPacket(_) => EventKind::NewLoopPacket,
            Event::EndLoop(_) => EventKind::EndLoop,
            Event::PostLoop => EventKind::PostLoop,
            Event::NewArchiveRecord(..) => EventKind::NewArchiveRecord,
            Event::CatchupArchive(_) => EventKind::CatchupArchive,
            Event::SetTime(_) => EventKind::SetTime,
        }
    }

    /// The packet or record carried by this event, if any
    pub fn record_mut(&mut self) -> Option<&mut Record> {
        match self {
            Event::NewLoopPacket(record) | Event::NewArchiveRecord(record, _) => Some(record),
            _ => None,
        }
    }

    pub fn record(&self) -> Option<&Record> {
        match self {
            Event::NewLoopPacket(record) | Event::NewArchiveRecord(record, _) => Some(record),
            _ => None,
        }
    }
}

/// Handle of a loaded service, its index in the engine's service list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceId(pub usize);

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Binding table from event kind to subscribed services
///
/// Subscribers run in binding order. A kind nobody bound is simply skipped.
#[derive(Debug, Default)]
pub struct EventBus {
    bindings: HashMap<EventKind, Vec<ServiceId>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `service` to the subscribers of `kind`
    pub fn bind(&mut self, kind: EventKind, service: ServiceId) {
        self.bindings.entry(kind).or_default().push(service);
    }

    pub fn subscribers(&self, kind: EventKind) -> &[ServiceId] {
        self.bindings.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_bound(&self, kind: EventKind) -> bool {
        !self.subscribers(kind).is_empty()
    }

    /// Drop every binding
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.values().map(Vec::len).sum()
    }
}
