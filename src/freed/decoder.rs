//! # FreeD Packet Decoder
//!
//! Validates and decodes D1 datagrams.
//!
//! Length and message type failures are hard: no frame is produced. A checksum
//! mismatch is soft by default and only reported on the frame; the caller
//! decides whether to promote it through [`DecodeOptions::checksum_fatal`].

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, trace};

use super::checksum::xor_checksum;
use super::protocol::*;
use crate::error::DecodeError;

/// Checksum policy applied while decoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Do not count or act on checksum mismatches
    pub ignore_checksum: bool,

    /// Reject frames whose checksum does not match (ignored when `ignore_checksum` is set)
    pub checksum_fatal: bool,
}

/// Decode a 3-byte big-endian two's-complement value
///
/// # Examples
///
/// ```
/// use freed_reader::freed::decoder::decode_i24;
///
/// assert_eq!(decode_i24([0x00, 0x00, 0x00]), 0);
/// assert_eq!(decode_i24([0x7F, 0xFF, 0xFF]), 8_388_607);
/// assert_eq!(decode_i24([0x80, 0x00, 0x00]), -8_388_608);
/// assert_eq!(decode_i24([0xFF, 0xFF, 0xFF]), -1);
/// ```
pub fn decode_i24(bytes: [u8; 3]) -> i32 {
    let value = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]) as i32;
    if value & 0x80_0000 != 0 {
        value - 0x100_0000
    } else {
        value
    }
}

/// Read the 24-bit field starting at `offset`
///
/// Callers guarantee `offset + 3 <= data.len()`.
fn read_i24(data: &[u8], offset: usize) -> i32 {
    decode_i24([data[offset], data[offset + 1], data[offset + 2]])
}

/// Decode the tracking fields of a datagram already known to hold 29 bytes
fn decode_fields(data: &[u8]) -> FrameFields {
    FrameFields {
        camera_id: data[OFFSET_CAMERA_ID],
        pan: read_i24(data, OFFSET_PAN),
        tilt: read_i24(data, OFFSET_TILT),
        roll: read_i24(data, OFFSET_ROLL),
        position: Position {
            x: read_i24(data, OFFSET_X),
            y: read_i24(data, OFFSET_Y),
            z: read_i24(data, OFFSET_Z),
        },
        zoom: read_i24(data, OFFSET_ZOOM),
        focus: read_i24(data, OFFSET_FOCUS),
        spare: u16::from_be_bytes([data[OFFSET_SPARE], data[OFFSET_SPARE + 1]]),
    }
}

/// Decode a complete FreeD datagram
///
/// # Arguments
///
/// * `datagram` - Datagram bytes as received (any length)
/// * `options` - Checksum policy
/// * `received_at` - Receive timestamp stored on the frame
///
/// # Returns
///
/// * `Result<DecodedFrame, DecodeError>` - Decoded frame, or the reason it was rejected
///
/// # Errors
///
/// Returns error if:
/// - Datagram is shorter than 29 bytes
/// - Message type is not 0xD1
/// - Checksum mismatches and checksums are fatal
pub fn decode_datagram(
    datagram: Bytes,
    options: &DecodeOptions,
    received_at: DateTime<Utc>,
) -> Result<DecodedFrame, DecodeError> {
    if datagram.len() < FREED_PACKET_SIZE {
        return Err(DecodeError::TooShort {
            len: datagram.len(),
            expected: FREED_PACKET_SIZE,
        });
    }

    let message_type = datagram[0];
    if message_type != FREED_MESSAGE_TYPE_D1 {
        return Err(DecodeError::WrongMessageType {
            found: message_type,
            expected: FREED_MESSAGE_TYPE_D1,
        });
    }

    // Checksum covers everything up to the final byte, including any surplus
    let last = datagram.len() - 1;
    let checksum_expected = xor_checksum(&datagram[..last]);
    let checksum_actual = datagram[last];
    let checksum_valid = checksum_expected == checksum_actual;

    if !checksum_valid && !options.ignore_checksum && options.checksum_fatal {
        return Err(DecodeError::ChecksumMismatch {
            expected: checksum_expected,
            actual: checksum_actual,
        });
    }

    let extra_bytes = if datagram.len() > FREED_PACKET_SIZE {
        let extra = datagram.slice(FREED_PACKET_SIZE..);
        debug!(
            size = datagram.len(),
            extra = extra.len(),
            "Packet larger than a D1 frame"
        );
        Some(extra)
    } else {
        None
    };

    let fields = decode_fields(&datagram);
    trace!(camera_id = fields.camera_id, spare = fields.spare, "Decoded D1 frame");

    Ok(DecodedFrame {
        message_type,
        fields,
        checksum_valid,
        checksum_expected,
        checksum_actual,
        extra_bytes,
        packet_size: datagram.len(),
        raw_bytes: datagram,
        received_at,
    })
}

/// Decode a datagram slice, stamping it with the current time
///
/// # Examples
///
/// ```
/// use freed_reader::freed::decoder::{decode, DecodeOptions};
/// use freed_reader::freed::encoder::encode;
/// use freed_reader::freed::protocol::FrameFields;
///
/// let fields = FrameFields { camera_id: 3, pan: -32768, ..Default::default() };
/// let packet = encode(&fields);
///
/// let frame = decode(&packet, &DecodeOptions::default()).unwrap();
/// assert_eq!(frame.fields, fields);
/// assert!(frame.checksum_valid);
/// ```
pub fn decode(datagram: &[u8], options: &DecodeOptions) -> Result<DecodedFrame, DecodeError> {
    decode_datagram(Bytes::copy_from_slice(datagram), options, Utc::now())
}

/// Running packet statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PacketCounters {
    /// Datagrams that produced a frame
    pub packets: u64,

    /// Datagrams rejected (hard failures)
    pub errors: u64,

    /// Checksum mismatches seen while checksums are not ignored
    pub checksum_errors: u64,
}

/// Decoder that keeps caller-visible packet counters
#[derive(Debug, Clone, Default)]
pub struct FrameDecoder {
    options: DecodeOptions,
    counters: PacketCounters,
}

impl FrameDecoder {
    /// Create a decoder with the given checksum policy
    pub fn new(options: DecodeOptions) -> Self {
        Self {
            options,
            counters: PacketCounters::default(),
        }
    }

    /// Decode one datagram and update the counters
    pub fn decode(
        &mut self,
        datagram: Bytes,
        received_at: DateTime<Utc>,
    ) -> Result<DecodedFrame, DecodeError> {
        let result = decode_datagram(datagram, &self.options, received_at);

        match &result {
            Ok(frame) => {
                self.counters.packets += 1;
                if !frame.checksum_valid && !self.options.ignore_checksum {
                    self.counters.checksum_errors += 1;
                }
            }
            Err(DecodeError::ChecksumMismatch { .. }) => {
                self.counters.checksum_errors += 1;
                self.counters.errors += 1;
            }
            Err(_) => {
                self.counters.errors += 1;
            }
        }

        result
    }

    /// Current counter values
    pub fn counters(&self) -> PacketCounters {
        self.counters
    }

    /// Checksum policy in use
    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }
}
