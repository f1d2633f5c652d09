//! Per-datagram processing shared by the receive worker and tests

use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, trace};

use super::stats::{Arrival, IntervalStats};
use super::SessionOptions;
use crate::error::{DecodeError, Result};
use crate::freed::decoder::{DecodeOptions, FrameDecoder, PacketCounters};
use crate::freed::protocol::DecodedFrame;
use crate::genlock::{SpareAnalyzer, SpareInterpretation, SpareReport};
use crate::units::{PhysicalFrame, UnitConverter};

/// A decoded frame with everything derived from it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryFrame {
    /// Sender of the datagram
    pub sender: SocketAddr,

    /// Raw decoded values
    pub frame: DecodedFrame,

    /// Values in physical units, `None` when conversion is off
    pub physical: Option<PhysicalFrame>,

    /// Genlock, timecode and trend derived from the spare word
    #[serde(flatten)]
    pub spare: SpareReport,
}

/// Decoder, converter, spare analyzer and rate statistics in one pass
#[derive(Debug, Clone)]
pub struct PacketPipeline {
    decoder: FrameDecoder,
    converter: Option<UnitConverter>,
    spare: SpareAnalyzer,
    stats: IntervalStats,
}

impl PacketPipeline {
    /// Build a pipeline
    ///
    /// # Errors
    ///
    /// Returns `FreedError::InvalidFps` if a timecode frame rate is set but unusable.
    pub fn new(
        options: &SessionOptions,
        converter: UnitConverter,
        interpretation: SpareInterpretation,
    ) -> Result<Self> {
        Ok(Self {
            decoder: FrameDecoder::new(DecodeOptions {
                ignore_checksum: options.ignore_checksum,
                checksum_fatal: options.checksum_fatal,
            }),
            converter: options.convert_units.then_some(converter),
            spare: SpareAnalyzer::new(interpretation, options.timecode_fps)?,
            stats: IntervalStats::new(),
        })
    }

    /// Process one datagram received at `now`
    ///
    /// Rejected datagrams only touch the counters.
    pub fn process(
        &mut self,
        datagram: Bytes,
        sender: SocketAddr,
        now: Instant,
        received_at: DateTime<Utc>,
    ) -> std::result::Result<TelemetryFrame, DecodeError> {
        let frame = self.decoder.decode(datagram, received_at)?;

        if self.stats.record(now) == Arrival::Reconnected {
            debug!(%sender, "Packet stream resumed after a gap, resetting rate and genlock history");
            self.spare.reset_genlock();
        }

        let physical = self.converter.as_ref().map(|c| c.convert(&frame.fields));
        let spare = self.spare.analyze(frame.fields.spare);
        trace!(
            %sender,
            camera_id = frame.fields.camera_id,
            checksum_valid = frame.checksum_valid,
            "Processed packet"
        );

        Ok(TelemetryFrame {
            sender,
            frame,
            physical,
            spare,
        })
    }

    /// Packet counters so far
    pub fn counters(&self) -> PacketCounters {
        self.decoder.counters()
    }

    /// Rolling mean inter-packet interval in milliseconds
    pub fn interval_ms(&self) -> Option<f64> {
        self.stats.interval_ms()
    }

    /// Packet rate from the rolling mean interval
    pub fn fps(&self) -> Option<f64> {
        self.stats.fps()
    }

    /// Arrival time of the last accepted packet
    pub fn last_arrival(&self) -> Option<Instant> {
        self.stats.last_arrival()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freed::encoder::{encode, genlock_spare};
    use crate::freed::protocol::FrameFields;
    use std::time::Duration;

    fn sender() -> SocketAddr {
        "192.168.1.50:6301".parse().unwrap()
    }

    fn pipeline(options: SessionOptions) -> PacketPipeline {
        PacketPipeline::new(&options, UnitConverter::default(), SpareInterpretation::default())
            .unwrap()
    }

    fn packet(spare: u16) -> Bytes {
        let fields = FrameFields {
            camera_id: 2,
            pan: 32_768 * 10,
            zoom: 35_000,
            focus: 1_299,
            spare,
            ..Default::default()
        };
        Bytes::copy_from_slice(&encode(&fields))
    }

    #[test]
    fn test_process_valid_packet() {
        let mut pipeline = pipeline(SessionOptions::default());
        let frame = pipeline
            .process(packet(0), sender(), Instant::now(), Utc::now())
            .unwrap();

        assert_eq!(frame.sender, sender());
        assert_eq!(frame.frame.fields.camera_id, 2);
        let physical = frame.physical.unwrap();
        assert_eq!(physical.pan_deg, 10.0);
        assert_eq!(physical.zoom_mm, Some(35.0));
        assert_eq!(pipeline.counters().packets, 1);
    }

    #[test]
    fn test_process_raw_mode_skips_conversion() {
        let mut pipeline = pipeline(SessionOptions {
            convert_units: false,
            ..Default::default()
        });
        let frame = pipeline
            .process(packet(0), sender(), Instant::now(), Utc::now())
            .unwrap();
        assert_eq!(frame.physical, None);
    }

    #[test]
    fn test_rejected_packet_only_counts() {
        let mut pipeline = pipeline(SessionOptions::default());
        let result = pipeline.process(
            Bytes::from_static(&[0xD1; 10]),
            sender(),
            Instant::now(),
            Utc::now(),
        );

        assert!(matches!(result, Err(DecodeError::TooShort { len: 10, .. })));
        assert_eq!(pipeline.counters().errors, 1);
        assert_eq!(pipeline.counters().packets, 0);
        assert_eq!(pipeline.last_arrival(), None, "rejected packets do not affect the rate");
    }

    #[test]
    fn test_timecode_from_options() {
        let mut pipeline = pipeline(SessionOptions {
            timecode_fps: Some(24.0),
            ..Default::default()
        });
        let frame = pipeline
            .process(packet(47), sender(), Instant::now(), Utc::now())
            .unwrap();
        assert_eq!(frame.spare.timecode.unwrap().to_string(), "00:00:01:23");
    }

    #[test]
    fn test_invalid_fps_rejected_at_construction() {
        let options = SessionOptions {
            timecode_fps: Some(-1.0),
            ..Default::default()
        };
        let result =
            PacketPipeline::new(&options, UnitConverter::default(), SpareInterpretation::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_reconnect_gap_resets_rate_and_genlock() {
        let mut pipeline = pipeline(SessionOptions::default());
        let start = Instant::now();

        let mut t = start;
        let mut last = None;
        for phase in 1..=4u8 {
            last = Some(
                pipeline
                    .process(packet(genlock_spare(phase)), sender(), t, Utc::now())
                    .unwrap(),
            );
            t += Duration::from_millis(40);
        }
        assert!(last.unwrap().spare.genlock.unwrap().locked);
        assert!((pipeline.interval_ms().unwrap() - 40.0).abs() < 1e-6);
        assert!((pipeline.fps().unwrap() - 25.0).abs() < 1e-6);

        // Next packet arrives after a 3 s dropout
        let resumed = start + Duration::from_millis(120 + 3000);
        let frame = pipeline
            .process(packet(genlock_spare(5)), sender(), resumed, Utc::now())
            .unwrap();
        let genlock = frame.spare.genlock.unwrap();
        assert!(!genlock.locked, "genlock history restarts after a gap");
        assert_eq!(genlock.samples, 1);
        assert_eq!(pipeline.interval_ms(), None);
        assert_eq!(pipeline.fps(), None);

        pipeline
            .process(packet(genlock_spare(6)), sender(), resumed + Duration::from_millis(20), Utc::now())
            .unwrap();
        assert!((pipeline.interval_ms().unwrap() - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_telemetry_frame_serializes_flat() {
        let mut pipeline = pipeline(SessionOptions {
            timecode_fps: Some(25.0),
            ..Default::default()
        });
        let frame = pipeline
            .process(packet(0x1000), sender(), Instant::now(), Utc::now())
            .unwrap();

        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["sender"], "192.168.1.50:6301");
        assert_eq!(json["frame"]["camera_id"], 2);
        assert!(json["genlock"].is_object());
        assert!(json["trend"].is_object());
        assert!(json["timecode"].is_object());
    }
}
