//! Header framing for values that cross threads through a ring buffer.
//!
//! A record is a fixed [`PORT_EVENT_HEADER_SIZE`]-byte header followed by
//! `size` payload bytes. All integers are little-endian.
//!
//! ```text
//! offset  0  u32  port index
//! offset  4  u32  protocol
//! offset  8  u8   time tag (0 = frames, 1 = decimal)
//! offset  9  8B   i64 frames | f64 decimal
//! offset 17  u32  payload size
//! ```

use crate::ring_buffer::{RingReader, RingWriter};

/// Encoded header length.
pub const PORT_EVENT_HEADER_SIZE: usize = 21;

/// Payload is one little-endian `f32` control value.
pub const PROTOCOL_FLOAT: u32 = 0;

/// Payload is one raw MIDI message for an event or MIDI input port.
pub const PROTOCOL_MIDI: u32 = 1;

/// Timestamp attached to a port event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PortEventTime {
    /// Frame offset.
    Frames(i64),
    /// Seconds or beats, as agreed by producer and consumer.
    Decimal(f64),
}

impl Default for PortEventTime {
    fn default() -> Self {
        PortEventTime::Frames(0)
    }
}

/// Header of one cross-thread port value record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PortEvent {
    /// Destination or origin port.
    pub index: u32,
    /// Payload interpretation.
    pub protocol: u32,
    /// Timestamp.
    pub time: PortEventTime,
    /// Payload length in bytes.
    pub size: u32,
}

impl PortEvent {
    /// Header for a float control value on `index`.
    pub fn float(index: u32) -> Self {
        Self {
            index,
            protocol: PROTOCOL_FLOAT,
            time: PortEventTime::default(),
            size: 4,
        }
    }

    /// Serialises the header.
    pub fn encode(&self) -> [u8; PORT_EVENT_HEADER_SIZE] {
        let mut out = [0u8; PORT_EVENT_HEADER_SIZE];
        out[0..4].copy_from_slice(&self.index.to_le_bytes());
        out[4..8].copy_from_slice(&self.protocol.to_le_bytes());
        match self.time {
            PortEventTime::Frames(frames) => {
                out[8] = 0;
                out[9..17].copy_from_slice(&frames.to_le_bytes());
            }
            PortEventTime::Decimal(decimal) => {
                out[8] = 1;
                out[9..17].copy_from_slice(&decimal.to_le_bytes());
            }
        }
        out[17..21].copy_from_slice(&self.size.to_le_bytes());
        out
    }

    /// Parses a header. Unknown time tags read as frames.
    pub fn decode(bytes: &[u8; PORT_EVENT_HEADER_SIZE]) -> Self {
        let word = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let mut time_bytes = [0u8; 8];
        time_bytes.copy_from_slice(&bytes[9..17]);
        let time = if bytes[8] == 1 {
            PortEventTime::Decimal(f64::from_le_bytes(time_bytes))
        } else {
            PortEventTime::Frames(i64::from_le_bytes(time_bytes))
        };
        Self {
            index: word(0),
            protocol: word(4),
            time,
            size: word(17),
        }
    }

    /// Header plus payload length.
    #[inline]
    pub fn record_size(&self) -> usize {
        PORT_EVENT_HEADER_SIZE + self.size as usize
    }

    /// Frame offset of the event, zero for decimal timestamps.
    pub fn frame(&self) -> u32 {
        match self.time {
            PortEventTime::Frames(frames) => frames.clamp(0, i64::from(u32::MAX)) as u32,
            PortEventTime::Decimal(_) => 0,
        }
    }
}

/// Writes one record (header and payload) as a unit.
///
/// Returns `false` without writing anything if the record does not fit.
pub fn write_port_event(writer: &mut RingWriter, event: &PortEvent, payload: &[u8]) -> bool {
    debug_assert_eq!(event.size as usize, payload.len());
    let header = event.encode();
    writer.write_parts(&[&header, payload]) > 0
}

/// Reads the next complete record, copying its payload into `scratch`.
///
/// Returns `None` when no complete record is available; a partially written
/// record stays queued. A record whose payload does not fit in `scratch` is
/// consumed and dropped, and its header is returned with `size` set to 0.
pub fn read_port_event(reader: &mut RingReader, scratch: &mut [u8]) -> Option<PortEvent> {
    let mut header = [0u8; PORT_EVENT_HEADER_SIZE];
    if reader.peek(&mut header) == 0 {
        return None;
    }
    let mut event = PortEvent::decode(&header);
    if !reader.can_read(event.record_size()) {
        return None;
    }
    reader.skip(PORT_EVENT_HEADER_SIZE);
    let size = event.size as usize;
    if size > scratch.len() {
        reader.skip(size);
        event.size = 0;
        return Some(event);
    }
    if size > 0 {
        reader.read(&mut scratch[..size]);
    }
    Some(event)
}
