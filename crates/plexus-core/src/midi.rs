//! MIDI events, fixed-capacity event buffers, and the cross-thread collector.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

/// A short MIDI message stamped with a frame offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidiEvent {
    /// Frame offset within the block.
    pub frame: u32,
    len: u8,
    data: [u8; 3],
}

impl MidiEvent {
    /// Creates an event from 1 to 3 raw bytes. Longer or empty messages are rejected.
    pub fn new(frame: u32, bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() || bytes.len() > 3 {
            return None;
        }
        let mut data = [0u8; 3];
        data[..bytes.len()].copy_from_slice(bytes);
        Some(Self {
            frame,
            len: bytes.len() as u8,
            data,
        })
    }

    /// Note-on on `channel` (0-15).
    pub fn note_on(frame: u32, channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            frame,
            len: 3,
            data: [0x90 | (channel & 0x0f), note & 0x7f, velocity & 0x7f],
        }
    }

    /// Note-off on `channel` (0-15).
    pub fn note_off(frame: u32, channel: u8, note: u8) -> Self {
        Self {
            frame,
            len: 3,
            data: [0x80 | (channel & 0x0f), note & 0x7f, 0],
        }
    }

    /// The raw message bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// Copy of the event with a different frame offset.
    #[inline]
    pub fn at(self, frame: u32) -> Self {
        Self { frame, ..self }
    }
}

/// Preallocated event sequence for one port and one block.
///
/// Pushing past capacity drops the event instead of growing, so the buffer
/// never allocates after construction.
#[derive(Clone, Debug)]
pub struct EventBuffer {
    events: Vec<MidiEvent>,
}

impl EventBuffer {
    /// Creates an empty buffer holding up to `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
        }
    }

    /// Maximum number of events.
    pub fn capacity(&self) -> usize {
        self.events.capacity()
    }

    /// Appends an event. Returns `false` if the buffer is full.
    pub fn push(&mut self, event: MidiEvent) -> bool {
        if self.events.len() == self.events.capacity() {
            return false;
        }
        self.events.push(event);
        true
    }

    /// Appends every event of `other` that fits. Returns the number appended.
    pub fn extend_from(&mut self, other: &EventBuffer) -> usize {
        let room = self.events.capacity() - self.events.len();
        let n = other.events.len().min(room);
        self.events.extend_from_slice(&other.events[..n]);
        n
    }

    /// Removes all events.
    #[inline]
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Number of events.
    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether there are no events.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, MidiEvent> {
        self.events.iter()
    }

    /// Events as a slice.
    pub fn as_slice(&self) -> &[MidiEvent] {
        &self.events
    }
}

impl<'a> IntoIterator for &'a EventBuffer {
    type Item = &'a MidiEvent;
    type IntoIter = std::slice::Iter<'a, MidiEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// Creates a collector for MIDI produced off the audio thread.
///
/// The [`MidiSender`] side may be cloned and used from any number of threads.
/// The [`MidiCollector`] side is drained by the audio thread once per cycle.
pub fn midi_collector(capacity: usize) -> (MidiSender, MidiCollector) {
    let (tx, rx) = bounded(capacity.max(1));
    (MidiSender { tx }, MidiCollector { rx })
}

/// Producer side of the MIDI collector.
#[derive(Clone, Debug)]
pub struct MidiSender {
    tx: Sender<MidiEvent>,
}

impl MidiSender {
    /// Queues an event for the next audio cycle. Returns `false` if the queue is
    /// full or the collector is gone.
    pub fn send(&self, event: MidiEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Audio-thread side of the MIDI collector.
#[derive(Debug)]
pub struct MidiCollector {
    rx: Receiver<MidiEvent>,
}

impl MidiCollector {
    /// Moves queued events into `dest`, stamped at frame 0. Never blocks.
    ///
    /// Events that do not fit stay queued for the next cycle.
    pub fn drain_into(&self, dest: &mut EventBuffer) -> usize {
        let mut moved = 0;
        while dest.len() < dest.capacity() {
            match self.rx.try_recv() {
                Ok(event) => {
                    dest.push(event.at(0));
                    moved += 1;
                }
                Err(_) => break,
            }
        }
        moved
    }
}
