//! # FreeD Protocol Constants and Types
//!
//! Core protocol definitions for the FreeD D1 camera tracking message.
//!
//! ```text
//! Offset  Size  Field
//!  0      1     message type (0xD1)
//!  1      1     camera id
//!  2      3     pan          (signed 24-bit, big-endian)
//!  5      3     tilt
//!  8      3     roll
//! 11      3     X
//! 14      3     Y
//! 17      3     Z
//! 20      3     zoom         (lens encoder count)
//! 23      3     focus        (lens encoder count)
//! 26      2     spare        (unsigned 16-bit, vendor-defined)
//! 28      1     checksum     (XOR of bytes 0-27)
//! ```

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// D1 message type tag (always 0xD1)
pub const FREED_MESSAGE_TYPE_D1: u8 = 0xD1;

/// Canonical D1 packet size in bytes
pub const FREED_PACKET_SIZE: usize = 29;

/// Offset of the checksum byte in a canonical packet
pub const FREED_CHECKSUM_OFFSET: usize = 28;

/// Smallest value representable in a 24-bit signed field
pub const FREED_FIELD_MIN: i32 = -8_388_608;

/// Largest value representable in a 24-bit signed field
pub const FREED_FIELD_MAX: i32 = 8_388_607;

/// Zoom encoder value meaning "no lens data"
pub const ZOOM_NO_DATA: i32 = 0;

/// Focus encoder value meaning "no lens data"
pub const FOCUS_NO_DATA: i32 = 65_535;

/// Byte offsets of the multi-byte fields
pub const OFFSET_CAMERA_ID: usize = 1;
pub const OFFSET_PAN: usize = 2;
pub const OFFSET_TILT: usize = 5;
pub const OFFSET_ROLL: usize = 8;
pub const OFFSET_X: usize = 11;
pub const OFFSET_Y: usize = 14;
pub const OFFSET_Z: usize = 17;
pub const OFFSET_ZOOM: usize = 20;
pub const OFFSET_FOCUS: usize = 23;
pub const OFFSET_SPARE: usize = 26;

/// Camera position in raw 24-bit units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// Tracking values carried by one D1 packet, in raw protocol units
///
/// This is both the decoder's output and the encoder's input, so
/// `decode(encode(fields)).fields == fields` for every in-range value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameFields {
    /// Camera identifier (0-255)
    pub camera_id: u8,

    /// Pan angle, raw units (1/32768 degree by convention)
    pub pan: i32,

    /// Tilt angle, raw units
    pub tilt: i32,

    /// Roll angle, raw units
    pub roll: i32,

    /// Position, raw units (1/64 mm by convention)
    pub position: Position,

    /// Zoom encoder count (0 means no data)
    pub zoom: i32,

    /// Focus encoder count (65535 means no data)
    pub focus: i32,

    /// Vendor-defined spare word (genlock phase / timecode)
    pub spare: u16,
}

impl FrameFields {
    /// High and low bytes of the spare word as transmitted
    pub fn spare_bytes(&self) -> [u8; 2] {
        self.spare.to_be_bytes()
    }
}

/// A successfully decoded D1 datagram
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedFrame {
    /// Message type tag (always 0xD1)
    pub message_type: u8,

    /// Decoded tracking values
    #[serde(flatten)]
    pub fields: FrameFields,

    /// Whether the trailing checksum byte matched
    pub checksum_valid: bool,

    /// Checksum recomputed over all but the last byte
    pub checksum_expected: u8,

    /// Checksum byte found in the datagram
    pub checksum_actual: u8,

    /// Bytes past the canonical 29, never interpreted
    pub extra_bytes: Option<Bytes>,

    /// Size of the whole datagram
    pub packet_size: usize,

    /// Copy of the whole datagram
    pub raw_bytes: Bytes,

    /// Wall-clock receive time
    pub received_at: DateTime<Utc>,
}

impl DecodedFrame {
    /// Protocol label derived from the message type, e.g. `D1`
    pub fn protocol_label(&self) -> String {
        format!("D{:X}", self.message_type & 0x0F)
    }

    /// Whether the datagram carried bytes past the canonical frame
    pub fn is_oversized(&self) -> bool {
        self.extra_bytes.is_some()
    }
}
