//! Control event types carried alongside audio in node buffers.
//!
//! Events are timestamped by frame offset within the block. All messages
//! are:
//! - Fixed-size (no heap allocation)
//! - Copy (can be moved between buffers freely)
//! - Self-contained (no references or pointers)
//!
//! An [`EventBuffer`] has a fixed capacity chosen at preparation time and
//! never grows on the audio thread; events past capacity are dropped.

#![forbid(unsafe_code)]

/// Default capacity of an event buffer.
/// Should handle bursts of note events (e.g. chord presses).
pub const EVENT_CAPACITY: usize = 256;

/// Control messages flowing through the graph with the audio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlMsg {
    /// Start a note.
    NoteOn {
        channel: u8,
        note: u8,
        /// Velocity (0.0 to 1.0)
        velocity: f32,
    },

    /// Release a note.
    NoteOff { channel: u8, note: u8 },

    /// Continuous controller change.
    Controller {
        channel: u8,
        number: u8,
        /// Normalised value (0.0 to 1.0)
        value: f32,
    },

    /// Pitch bend (-1.0 to +1.0).
    PitchBend { channel: u8, value: f32 },

    /// Release every note on a channel.
    AllNotesOff { channel: u8 },
}

impl ControlMsg {
    /// Channel this message addresses.
    pub fn channel(&self) -> u8 {
        match self {
            ControlMsg::NoteOn { channel, .. }
            | ControlMsg::NoteOff { channel, .. }
            | ControlMsg::Controller { channel, .. }
            | ControlMsg::PitchBend { channel, .. }
            | ControlMsg::AllNotesOff { channel } => *channel,
        }
    }

    /// Returns a human-readable description (for debugging).
    pub fn description(&self) -> &'static str {
        match self {
            ControlMsg::NoteOn { .. } => "NoteOn",
            ControlMsg::NoteOff { .. } => "NoteOff",
            ControlMsg::Controller { .. } => "Controller",
            ControlMsg::PitchBend { .. } => "PitchBend",
            ControlMsg::AllNotesOff { .. } => "AllNotesOff",
        }
    }
}

/// A control message at a frame offset within the current block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlEvent {
    pub offset: u32,
    pub msg: ControlMsg,
}

impl ControlEvent {
    pub fn new(offset: u32, msg: ControlMsg) -> Self {
        Self { offset, msg }
    }
}

/// Fixed-capacity list of control events for one block.
#[derive(Debug, PartialEq)]
pub struct EventBuffer {
    events: Vec<ControlEvent>,
    capacity: usize,
}

impl EventBuffer {
    /// Create an empty buffer holding at most `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn as_slice(&self) -> &[ControlEvent] {
        &self.events
    }

    pub fn iter(&self) -> impl Iterator<Item = &ControlEvent> {
        self.events.iter()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Append one event. Returns it back if the buffer is full.
    pub fn push(&mut self, event: ControlEvent) -> Result<(), ControlEvent> {
        if self.events.len() >= self.capacity {
            return Err(event);
        }
        self.events.push(event);
        Ok(())
    }

    /// Append as many of `other`'s events as fit, returning how many were
    /// dropped.
    pub fn extend_from(&mut self, other: &EventBuffer) -> usize {
        let room = self.capacity.saturating_sub(self.events.len());
        let take = other.events.len().min(room);
        self.events.extend_from_slice(&other.events[..take]);
        other.events.len() - take
    }

    /// Replace the contents with `other`'s events, returning how many did
    /// not fit.
    pub fn copy_from(&mut self, other: &EventBuffer) -> usize {
        self.events.clear();
        self.extend_from(other)
    }
}

// A derived clone would shrink the reserve to the current length.
impl Clone for EventBuffer {
    fn clone(&self) -> Self {
        let mut events = Vec::with_capacity(self.capacity);
        events.extend_from_slice(&self.events);
        Self {
            events,
            capacity: self.capacity,
        }
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::with_capacity(EVENT_CAPACITY)
    }
}
