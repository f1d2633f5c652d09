//! # FreeD Packet Encoder
//!
//! Builds D1 packets from tracking values. Used by the simulator and by tests;
//! the receive path never encodes.
//!
//! Out-of-range values are clamped to the 24-bit signed range, never wrapped.

use super::checksum::xor_checksum;
use super::protocol::*;

/// Raw units per degree of rotation
pub const ROTATION_RAW_PER_DEGREE: f64 = 32_768.0;

/// Raw units per meter of position (64 per millimeter)
pub const POSITION_RAW_PER_METER: f64 = 64_000.0;

/// Raw units per millimeter of focal length, and per meter of focus distance
pub const LENS_RAW_PER_UNIT: f64 = 1_000.0;

/// Clamp a value to the 24-bit signed range
///
/// # Examples
///
/// ```
/// use freed_reader::freed::encoder::clamp_i24;
///
/// assert_eq!(clamp_i24(10_000_000), 8_388_607);
/// assert_eq!(clamp_i24(-10_000_000), -8_388_608);
/// assert_eq!(clamp_i24(-5), -5);
/// ```
pub fn clamp_i24(value: i64) -> i32 {
    value.clamp(FREED_FIELD_MIN as i64, FREED_FIELD_MAX as i64) as i32
}

/// Encode a value as 3 big-endian two's-complement bytes, clamping first
pub fn encode_i24(value: i32) -> [u8; 3] {
    let clamped = clamp_i24(value as i64) as u32 & 0xFF_FFFF;
    [(clamped >> 16) as u8, (clamped >> 8) as u8, clamped as u8]
}

/// Convert a scaled physical value to a clamped raw field
///
/// Truncates toward zero; NaN maps to 0.
fn scaled_raw(value: f64, scale: f64) -> i32 {
    clamp_i24((value * scale) as i64)
}

/// Encode tracking values into a complete D1 packet
///
/// # Arguments
///
/// * `fields` - Raw tracking values
///
/// # Returns
///
/// * `[u8; 29]` - Packet with type tag and checksum filled in
///
/// # Examples
///
/// ```
/// use freed_reader::freed::encoder::encode;
/// use freed_reader::freed::protocol::FrameFields;
///
/// let packet = encode(&FrameFields::default());
/// assert_eq!(packet[0], 0xD1);
/// assert_eq!(packet[28], 0xD1); // XOR of the tag and 27 zero bytes
/// ```
pub fn encode(fields: &FrameFields) -> [u8; FREED_PACKET_SIZE] {
    let mut packet = [0u8; FREED_PACKET_SIZE];
    packet[0] = FREED_MESSAGE_TYPE_D1;
    packet[OFFSET_CAMERA_ID] = fields.camera_id;

    for (offset, value) in [
        (OFFSET_PAN, fields.pan),
        (OFFSET_TILT, fields.tilt),
        (OFFSET_ROLL, fields.roll),
        (OFFSET_X, fields.position.x),
        (OFFSET_Y, fields.position.y),
        (OFFSET_Z, fields.position.z),
        (OFFSET_ZOOM, fields.zoom),
        (OFFSET_FOCUS, fields.focus),
    ] {
        packet[offset..offset + 3].copy_from_slice(&encode_i24(value));
    }

    packet[OFFSET_SPARE..OFFSET_SPARE + 2].copy_from_slice(&fields.spare_bytes());
    packet[FREED_CHECKSUM_OFFSET] = xor_checksum(&packet[..FREED_CHECKSUM_OFFSET]);

    packet
}

/// Spare word carrying a genlock phase counter in the upper nibble of byte 26
///
/// Byte 27 (reference format) is left at zero.
pub fn genlock_spare(phase: u8) -> u16 {
    u16::from(phase & 0x0F) << 12
}

/// Camera pose in physical units
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhysicalPose {
    pub camera_id: u8,

    /// Rotation in degrees
    pub pan_deg: f64,
    pub tilt_deg: f64,
    pub roll_deg: f64,

    /// Position in meters
    pub x_m: f64,
    pub y_m: f64,
    pub z_m: f64,

    /// Focal length in millimeters, `None` sends the "no data" sentinel
    pub zoom_mm: Option<f64>,

    /// Focus distance in meters, `None` sends the "no data" sentinel
    pub focus_m: Option<f64>,
}

impl PhysicalPose {
    /// Convert to raw protocol units
    ///
    /// Lens values below zero clamp to zero.
    pub fn to_raw(&self, spare: u16) -> FrameFields {
        let zoom = match self.zoom_mm {
            Some(mm) => scaled_raw(mm, LENS_RAW_PER_UNIT).max(0),
            None => ZOOM_NO_DATA,
        };
        let focus = match self.focus_m {
            Some(m) => scaled_raw(m, LENS_RAW_PER_UNIT).max(0),
            None => FOCUS_NO_DATA,
        };

        FrameFields {
            camera_id: self.camera_id,
            pan: scaled_raw(self.pan_deg, ROTATION_RAW_PER_DEGREE),
            tilt: scaled_raw(self.tilt_deg, ROTATION_RAW_PER_DEGREE),
            roll: scaled_raw(self.roll_deg, ROTATION_RAW_PER_DEGREE),
            position: Position {
                x: scaled_raw(self.x_m, POSITION_RAW_PER_METER),
                y: scaled_raw(self.y_m, POSITION_RAW_PER_METER),
                z: scaled_raw(self.z_m, POSITION_RAW_PER_METER),
            },
            zoom,
            focus,
            spare,
        }
    }
}

/// Stateful packet builder emulating a tracker's genlock phase counter
#[derive(Debug, Clone, Default)]
pub struct PacketGenerator {
    genlock: bool,
    phase: u8,
}

impl PacketGenerator {
    /// Create a generator
    ///
    /// # Arguments
    ///
    /// * `genlock` - Cycle the phase counter once per packet
    pub fn new(genlock: bool) -> Self {
        Self { genlock, phase: 0 }
    }

    /// Enable or disable genlock emulation
    ///
    /// Disabling resets the phase counter.
    pub fn set_genlock(&mut self, genlock: bool) {
        self.genlock = genlock;
        if !genlock {
            self.phase = 0;
        }
    }

    /// Whether genlock emulation is on
    pub fn genlock(&self) -> bool {
        self.genlock
    }

    /// Phase counter used for the most recent packet
    pub fn phase(&self) -> u8 {
        self.phase
    }

    /// Build the next packet for `pose`, advancing the phase counter
    pub fn next_packet(&mut self, pose: &PhysicalPose) -> [u8; FREED_PACKET_SIZE] {
        let spare = if self.genlock {
            self.phase = (self.phase + 1) & 0x0F;
            genlock_spare(self.phase)
        } else {
            self.phase = 0;
            0
        };

        encode(&pose.to_raw(spare))
    }
}
