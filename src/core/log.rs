use std::ops::Range;

use crate::{op::Event, types::EventIndex};

/// Append-only byte buffer of encoded [`Event`]s.
///
/// Events are addressed by index; `offsets[i]` is the first byte of event `i`.
/// The log only ever grows at the back or shrinks from either end.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    bytes: Vec<u8>,
    offsets: Vec<usize>,
}

impl EventLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a log holding `events` in order.
    pub fn from_events(events: &[Event]) -> Result<Self, serde_json::Error> {
        let mut log = Self::new();
        for event in events {
            log.append(event)?;
        }
        Ok(log)
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Returns true when no events are stored.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Total encoded size.
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Byte position where event `index` starts; `len()` maps to the end.
    pub fn byte_offset(&self, index: EventIndex) -> usize {
        self.offsets.get(index).copied().unwrap_or(self.bytes.len())
    }

    /// Encoded size of the events in `range`.
    pub fn bytes_in(&self, range: Range<EventIndex>) -> usize {
        self.byte_offset(range.end) - self.byte_offset(range.start)
    }

    /// Serialized form of one event.
    pub fn encode(event: &Event) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(event)
    }

    /// Encodes and appends `event`, returning its index.
    pub fn append(&mut self, event: &Event) -> Result<EventIndex, serde_json::Error> {
        let encoded = Self::encode(event)?;
        Ok(self.push_encoded(&encoded))
    }

    pub(crate) fn push_encoded(&mut self, encoded: &[u8]) -> EventIndex {
        let index = self.offsets.len();
        self.offsets.push(self.bytes.len());
        self.bytes.extend_from_slice(encoded);
        index
    }

    /// Raw bytes of event `index`.
    pub fn raw(&self, index: EventIndex) -> Option<&[u8]> {
        let start = *self.offsets.get(index)?;
        let end = self.byte_offset(index + 1);
        Some(&self.bytes[start..end])
    }

    /// Decodes event `index`.
    pub fn decode(&self, index: EventIndex) -> Option<Result<Event, serde_json::Error>> {
        self.raw(index).map(serde_json::from_slice)
    }

    /// Decodes every event in `range`, in order.
    pub fn decode_range(&self, range: Range<EventIndex>) -> Result<Vec<Event>, serde_json::Error> {
        range
            .filter_map(|index| self.decode(index))
            .collect()
    }

    /// Drops the oldest `count` events. Callers truncate at action boundaries.
    pub fn truncate_front(&mut self, count: usize) {
        let count = count.min(self.offsets.len());
        if count == 0 {
            return;
        }
        let shift = self.byte_offset(count);
        self.bytes.drain(..shift);
        self.offsets.drain(..count);
        for offset in &mut self.offsets {
            *offset -= shift;
        }
    }

    /// Drops the newest `count` events. Callers truncate at action boundaries.
    pub fn truncate_back(&mut self, count: usize) {
        let keep = self.offsets.len().saturating_sub(count);
        let end = self.byte_offset(keep);
        self.offsets.truncate(keep);
        self.bytes.truncate(end);
    }

    /// Drops every event.
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.offsets.clear();
    }
}
