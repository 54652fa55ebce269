//! Marker sinks.
//!
//! | Sink | Delivery |
//! |---|---|
//! | [`MarkerBus`] | [`tokio::sync::broadcast`] fan-out to any number of viewers |
//! | [`MarkerLog`] | in-memory list, for tests and post-run inspection |
//! | [`JsonLinesSink`] | one JSON object per line to any writer (e.g. a file) |
//!
//! Publishing is best effort.  Callers log a [`VizError`] and carry on; a
//! failed marker never changes a filter result.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::broadcast;

use crate::marker::MarkerEvent;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VizError {
    #[error("no marker subscribers")]
    NoSubscribers,

    #[error("marker serialization failed: {0}")]
    Serialization(String),

    #[error("marker write failed: {0}")]
    Io(String),
}

pub trait MarkerSink: Send + Sync {
    fn publish(&self, event: MarkerEvent) -> Result<(), VizError>;

    /// Push any buffered markers to the viewer.
    fn flush(&self) -> Result<(), VizError> {
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MarkerBus
// ────────────────────────────────────────────────────────────────────────────

/// Broadcast channel of marker events.  Clones share the same channel.
#[derive(Clone, Debug)]
pub struct MarkerBus {
    sender: broadcast::Sender<MarkerEvent>,
}

impl Default for MarkerBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MarkerBus {
    /// `capacity` events are buffered before slow subscribers start lagging.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarkerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl MarkerSink for MarkerBus {
    fn publish(&self, event: MarkerEvent) -> Result<(), VizError> {
        self.sender
            .send(event)
            .map(|_| ())
            .map_err(|_| VizError::NoSubscribers)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MarkerLog
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MarkerLog {
    events: Mutex<Vec<MarkerEvent>>,
}

impl MarkerLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event received so far.
    pub fn events(&self) -> Vec<MarkerEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MarkerSink for MarkerLog {
    fn publish(&self, event: MarkerEvent) -> Result<(), VizError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// JsonLinesSink
// ────────────────────────────────────────────────────────────────────────────

/// Writes each event as a single line of JSON.
#[derive(Debug)]
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> MarkerSink for JsonLinesSink<W> {
    fn publish(&self, event: MarkerEvent) -> Result<(), VizError> {
        let line = serde_json::to_string(&event).map_err(|e| VizError::Serialization(e.to_string()))?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{line}").map_err(|e| VizError::Io(e.to_string()))
    }

    fn flush(&self) -> Result<(), VizError> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()
            .map_err(|e| VizError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::{Marker, MarkerColor};
    use graspkit_geometry::Vec3;
    use graspkit_types::CandidateId;
    use uuid::Uuid;

    fn contact_event() -> MarkerEvent {
        MarkerEvent::new(
            Uuid::new_v4(),
            Marker::Contact {
                candidate: CandidateId(7),
                link: "palm".into(),
                position: Vec3::new(0.1, 0.2, 0.3),
                color: MarkerColor::Pink,
            },
        )
    }

    #[test]
    fn bus_without_subscribers_reports_error() {
        let bus = MarkerBus::new(8);
        assert_eq!(bus.publish(contact_event()), Err(VizError::NoSubscribers));
    }

    #[test]
    fn bus_delivers_to_every_subscriber() {
        let bus = MarkerBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.clone().subscribe();
        let event = contact_event();
        bus.publish(event.clone()).unwrap();
        assert_eq!(a.try_recv().unwrap(), event);
        assert_eq!(b.try_recv().unwrap(), event);
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn log_keeps_events_in_order() {
        let log = MarkerLog::new();
        let first = contact_event();
        let second = contact_event();
        log.publish(first.clone()).unwrap();
        log.publish(second.clone()).unwrap();
        assert_eq!(log.events(), vec![first, second]);
    }

    #[test]
    fn json_lines_sink_writes_one_line_per_event() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.publish(contact_event()).unwrap();
        sink.publish(contact_event()).unwrap();
        sink.flush().unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: MarkerEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.marker.namespace(), "collision_contacts");
    }
}
