//! Human-readable console output

use std::fmt;
use std::io::{self, Write};

use super::FrameSink;
use crate::error::{DecodeError, Result};
use crate::freed::protocol::{DecodedFrame, FREED_PACKET_SIZE};
use crate::genlock::SpareReport;
use crate::session::{SessionSnapshot, TelemetryFrame};
use crate::units::PhysicalFrame;

/// Width of the separator rules
const RULE_WIDTH: usize = 80;

/// Cursor home; redraws the next frame over the previous one
const CURSOR_HOME: &str = "\x1b[H";

/// Clear from cursor to end of screen
const CLEAR_TO_END: &str = "\x1b[J";

/// What the console printer shows
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConsoleOptions {
    /// Hide checksum status
    pub ignore_checksum: bool,

    /// Redraw in place instead of scrolling
    pub clear_screen: bool,

    /// Show a hex dump of every packet
    pub debug: bool,

    /// Frame rate shown next to the timecode
    pub timecode_fps: Option<f64>,
}

/// Prints each frame as a block of labelled lines
#[derive(Debug)]
pub struct ConsolePrinter<W: Write> {
    out: W,
    options: ConsoleOptions,
}

impl ConsolePrinter<io::Stdout> {
    /// Printer writing to standard output
    pub fn stdout(options: ConsoleOptions) -> Self {
        Self::new(io::stdout(), options)
    }
}

impl<W: Write> ConsolePrinter<W> {
    /// Printer writing to `out`
    pub fn new(out: W, options: ConsoleOptions) -> Self {
        Self { out, options }
    }

    /// Recover the writer
    pub fn into_inner(self) -> W {
        self.out
    }

    /// Render one frame as text
    pub fn render(&self, telemetry: &TelemetryFrame, snapshot: &SessionSnapshot) -> String {
        FrameView {
            options: &self.options,
            telemetry,
            snapshot,
        }
        .to_string()
    }
}

/// One frame laid out as a console block
struct FrameView<'a> {
    options: &'a ConsoleOptions,
    telemetry: &'a TelemetryFrame,
    snapshot: &'a SessionSnapshot,
}

impl fmt::Display for FrameView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let telemetry = self.telemetry;
        let frame = &telemetry.frame;
        let rule = "=".repeat(RULE_WIDTH);

        if self.options.debug {
            writeln!(f, "{}", rule)?;
            writeln!(
                f,
                "Packet #{} from {} ({} bytes)",
                self.snapshot.counters.packets + self.snapshot.counters.errors,
                telemetry.sender,
                frame.packet_size
            )?;
            writeln!(f, "Raw bytes: {}", hex(&frame.raw_bytes))?;
        }

        writeln!(f, "{}", rule)?;
        write!(
            f,
            "{} | Camera ID: {} | From: {}",
            frame.protocol_label(),
            frame.fields.camera_id,
            telemetry.sender
        )?;
        if !self.options.ignore_checksum {
            let status = if frame.checksum_valid { "✓" } else { "✗ CHECKSUM WARNING" };
            write!(f, " | {}", status)?;
        }
        writeln!(f)?;
        writeln!(f, "{}", "-".repeat(RULE_WIDTH))?;

        match &telemetry.physical {
            Some(physical) => write_physical(f, frame, physical)?,
            None => write_raw(f, frame)?,
        }

        write_spare(f, frame, &telemetry.spare, self.options.timecode_fps)?;
        write_verification(f, frame, self.options.ignore_checksum)?;

        let counters = self.snapshot.counters;
        if self.options.ignore_checksum {
            writeln!(f, "\nPackets: {} | {} rejected", counters.packets, counters.errors)?;
        } else {
            writeln!(
                f,
                "\nPackets: {} valid | {} checksum errors | {} rejected",
                counters.packets, counters.checksum_errors, counters.errors
            )?;
        }
        if let (Some(interval), Some(fps)) = (self.snapshot.interval_ms, self.snapshot.fps) {
            writeln!(f, "Rate: {:.1} ms ({:.1} fps)", interval, fps)?;
        }
        writeln!(f, "Time: {}", frame.received_at.format("%Y-%m-%d %H:%M:%S%.3f"))?;
        writeln!(f, "{}", rule)
    }
}

fn write_spare(
    f: &mut fmt::Formatter<'_>,
    frame: &DecodedFrame,
    report: &SpareReport,
    timecode_fps: Option<f64>,
) -> fmt::Result {
    let spare = frame.fields.spare;
    writeln!(f, "\nSpare/Timecode:")?;
    writeln!(f, "  Value: {:10}  (0x{:04X})", spare, spare)?;
    writeln!(f, "  Bytes: {}", hex(&frame.fields.spare_bytes()))?;

    let trend = report.trend;
    match trend.delta {
        Some(1) => writeln!(
            f,
            "  Change: +1 (incrementing like timecode) [{} consecutive]",
            trend.increment_run
        )?,
        Some(0) => writeln!(f, "  Change: 0 (no change) [{} consecutive]", trend.unchanged_run)?,
        Some(delta) => writeln!(f, "  Change: {:+}", delta)?,
        None => {}
    }

    if let Some(timecode) = report.timecode {
        match timecode_fps {
            Some(fps) => writeln!(f, "  Timecode: {} @ {} fps", timecode, fps)?,
            None => writeln!(f, "  Timecode: {}", timecode)?,
        }
        if trend.likely_timecode() {
            writeln!(f, "  ✓ LIKELY REAL TIMECODE (incrementing consistently)")?;
        }
    }

    if let Some(genlock) = report.genlock {
        writeln!(
            f,
            "  Genlock: {} (phase {}, {}/{} distinct) flags 0x{:X} ref 0x{:02X}",
            if genlock.locked { "LOCKED" } else { "NO LOCK" },
            genlock.phase,
            genlock.distinct_phases,
            genlock.samples,
            genlock.lock_flags,
            genlock.reference
        )?;
    }
    Ok(())
}

fn write_physical(
    f: &mut fmt::Formatter<'_>,
    frame: &DecodedFrame,
    physical: &PhysicalFrame,
) -> fmt::Result {
    let fields = &frame.fields;
    writeln!(f, "Rotation:")?;
    writeln!(f, "  Pan:   {:10.2}°  (raw: {:10})", physical.pan_deg, fields.pan)?;
    writeln!(f, "  Tilt:  {:10.2}°  (raw: {:10})", physical.tilt_deg, fields.tilt)?;
    writeln!(f, "  Roll:  {:10.2}°  (raw: {:10})", physical.roll_deg, fields.roll)?;

    let (x_m, y_m, z_m) = physical.position_m();
    writeln!(f, "\nPosition:")?;
    for (label, meters, mm, raw) in [
        ("X", x_m, physical.x_mm, fields.position.x),
        ("Y", y_m, physical.y_mm, fields.position.y),
        ("Z", z_m, physical.z_mm, fields.position.z),
    ] {
        writeln!(f, "  {}:     {:10.3}m  ({:10.1}mm, raw: {:10})", label, meters, mm, raw)?;
    }

    writeln!(f, "\nLens Data:")?;
    match physical.zoom_mm {
        Some(mm) => writeln!(f, "  Zoom:  {:10.1}mm focal length  (raw: {:10})", mm, fields.zoom)?,
        None => writeln!(f, "  Zoom:  {:>10}  (raw: {:10})", "no data", fields.zoom)?,
    }
    match (physical.focus_m, physical.focus_feet_inches()) {
        (Some(m), Some((feet, inches))) => writeln!(
            f,
            "  Focus: {:10.2}m ({}ft {:.1}in) (raw: {:10})",
            m, feet, inches, fields.focus
        ),
        _ => writeln!(f, "  Focus: {:>10}  (raw: {:10})", "no data", fields.focus),
    }
}

fn write_raw(f: &mut fmt::Formatter<'_>, frame: &DecodedFrame) -> fmt::Result {
    let fields = &frame.fields;
    let sections: [(&str, [(&str, i32); 3]); 2] = [
        ("Rotation", [("Pan:", fields.pan), ("Tilt:", fields.tilt), ("Roll:", fields.roll)]),
        (
            "Position",
            [("X:", fields.position.x), ("Y:", fields.position.y), ("Z:", fields.position.z)],
        ),
    ];

    for (i, (title, values)) in sections.iter().enumerate() {
        if i > 0 {
            writeln!(f)?;
        }
        writeln!(f, "{}:", title)?;
        for &(label, value) in values {
            write_raw_value(f, label, value)?;
        }
    }

    writeln!(f, "\nLens Data:")?;
    write_raw_value(f, "Zoom:", fields.zoom)?;
    write_raw_value(f, "Focus:", fields.focus)
}

fn write_raw_value(f: &mut fmt::Formatter<'_>, label: &str, value: i32) -> fmt::Result {
    writeln!(f, "  {:<6} {:10}  (0x{:06X})", label, value, value & 0xFF_FFFF)
}

fn write_verification(
    f: &mut fmt::Formatter<'_>,
    frame: &DecodedFrame,
    ignore_checksum: bool,
) -> fmt::Result {
    writeln!(f, "\nPacket Verification:")?;
    if frame.packet_size == FREED_PACKET_SIZE {
        writeln!(f, "  Size: {} bytes ✓ (matches FreeD D1 standard)", frame.packet_size)?;
    } else {
        writeln!(
            f,
            "  Size: {} bytes ⚠ (expected {} bytes)",
            frame.packet_size, FREED_PACKET_SIZE
        )?;
        writeln!(
            f,
            "  Difference: {:+} bytes",
            frame.packet_size as i64 - FREED_PACKET_SIZE as i64
        )?;
    }

    if let Some(extra) = &frame.extra_bytes {
        writeln!(f, "\n⚠ EXTRA DATA DETECTED:")?;
        writeln!(f, "  Extra bytes: {} bytes", extra.len())?;
        writeln!(f, "  Hex: {}", hex(extra))?;
        writeln!(f, "  ASCII: {}", ascii(extra))?;
        let decimal: Vec<String> = extra.iter().map(u8::to_string).collect();
        writeln!(f, "  Decimal: {}", decimal.join(" "))?;
    }

    if !ignore_checksum && !frame.checksum_valid {
        writeln!(
            f,
            "\n⚠ Checksum: Expected 0x{:02X}, Got 0x{:02X}",
            frame.checksum_expected, frame.checksum_actual
        )?;
    }
    Ok(())
}

/// Space-separated upper-case hex
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Printable ASCII with `.` for everything else, space-separated
pub fn ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if (32..127).contains(&b) { char::from(b) } else { '.' })
        .map(String::from)
        .collect::<Vec<_>>()
        .join(" ")
}

impl<W: Write> FrameSink for ConsolePrinter<W> {
    fn on_frame(&mut self, frame: &TelemetryFrame, snapshot: &SessionSnapshot) -> Result<()> {
        let text = self.render(frame, snapshot);
        if self.options.clear_screen {
            write!(self.out, "{}{}{}", CURSOR_HOME, text, CLEAR_TO_END)?;
        } else {
            write!(self.out, "{}", text)?;
        }
        self.out.flush()?;
        Ok(())
    }

    fn on_rejected(&mut self, error: &DecodeError, snapshot: &SessionSnapshot) -> Result<()> {
        if !self.options.clear_screen {
            writeln!(
                self.out,
                "\nInvalid packet: {} ({} rejected so far)",
                error, snapshot.counters.errors
            )?;
        }
        Ok(())
    }

    fn on_finish(&mut self, snapshot: &SessionSnapshot) -> Result<()> {
        let counters = snapshot.counters;
        writeln!(self.out, "\nTotal packets received: {}", counters.packets)?;
        writeln!(self.out, "Total errors: {}", counters.errors)?;
        if !self.options.ignore_checksum {
            writeln!(self.out, "Total checksum errors: {}", counters.checksum_errors)?;
        }
        if let Some(error) = &snapshot.last_error {
            writeln!(self.out, "Session ended with error: {}", error)?;
        }
        self.out.flush()?;
        Ok(())
    }
}
