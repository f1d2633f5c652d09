//! # Display Module
//!
//! Presentation of published session snapshots.
//!
//! This module handles:
//! - The [`FrameSink`] trait shared by all outputs
//! - Console output mirroring the classic reader layout
//! - JSON Lines output for piping into other tools
//! - Turning snapshot updates into frame/rejection events

pub mod console;
pub mod json;

use std::sync::Arc;

pub use console::{ConsoleOptions, ConsolePrinter};
pub use json::JsonLinesPrinter;

use crate::error::{DecodeError, Result};
use crate::session::{SessionSnapshot, TelemetryFrame};

/// Consumer of decoded frames
pub trait FrameSink {
    /// A new frame was accepted
    fn on_frame(&mut self, frame: &TelemetryFrame, snapshot: &SessionSnapshot) -> Result<()>;

    /// A datagram was rejected
    fn on_rejected(&mut self, _error: &DecodeError, _snapshot: &SessionSnapshot) -> Result<()> {
        Ok(())
    }

    /// The session ended
    fn on_finish(&mut self, snapshot: &SessionSnapshot) -> Result<()>;
}

/// Tracks which snapshot changes a sink has already seen
///
/// A `watch` receiver only keeps the latest value, so at high packet rates
/// intermediate frames are skipped rather than queued.
#[derive(Debug, Default)]
pub struct SnapshotFeed {
    last_frame: Option<Arc<TelemetryFrame>>,
    errors_seen: u64,
}

impl SnapshotFeed {
    /// Feed that has delivered nothing yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward anything new in `snapshot` to `sink`
    ///
    /// Returns whether a new frame was delivered.
    pub fn deliver(&mut self, snapshot: &SessionSnapshot, sink: &mut dyn FrameSink) -> Result<bool> {
        if snapshot.counters.errors > self.errors_seen {
            self.errors_seen = snapshot.counters.errors;
            if let Some(error) = &snapshot.last_decode_error {
                sink.on_rejected(error, snapshot)?;
            }
        }

        let Some(frame) = &snapshot.last_frame else {
            return Ok(false);
        };
        let is_new = self
            .last_frame
            .as_ref()
            .map_or(true, |seen| !Arc::ptr_eq(seen, frame));
        if !is_new {
            return Ok(false);
        }

        self.last_frame = Some(Arc::clone(frame));
        sink.on_frame(frame, snapshot)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::freed::encoder::encode;
    use crate::freed::protocol::FrameFields;
    use crate::genlock::SpareInterpretation;
    use crate::session::{PacketPipeline, SessionOptions};
    use crate::units::UnitConverter;
    use bytes::Bytes;
    use chrono::Utc;
    use std::time::Instant;

    /// Sink recording what it was given
    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<u8>,
        rejected: Vec<DecodeError>,
        finished: bool,
    }

    impl FrameSink for RecordingSink {
        fn on_frame(&mut self, frame: &TelemetryFrame, _: &SessionSnapshot) -> Result<()> {
            self.frames.push(frame.frame.fields.camera_id);
            Ok(())
        }

        fn on_rejected(&mut self, error: &DecodeError, _: &SessionSnapshot) -> Result<()> {
            self.rejected.push(error.clone());
            Ok(())
        }

        fn on_finish(&mut self, _: &SessionSnapshot) -> Result<()> {
            self.finished = true;
            Ok(())
        }
    }

    fn frame(camera_id: u8) -> Arc<TelemetryFrame> {
        let mut pipeline = PacketPipeline::new(
            &SessionOptions::default(),
            UnitConverter::default(),
            SpareInterpretation::default(),
        )
        .unwrap();
        let packet = encode(&FrameFields { camera_id, ..Default::default() });
        Arc::new(
            pipeline
                .process(
                    Bytes::copy_from_slice(&packet),
                    "127.0.0.1:1".parse().unwrap(),
                    Instant::now(),
                    Utc::now(),
                )
                .unwrap(),
        )
    }

    #[test]
    fn test_delivers_each_frame_once() {
        let mut feed = SnapshotFeed::new();
        let mut sink = RecordingSink::default();

        let first = SessionSnapshot {
            last_frame: Some(frame(1)),
            ..Default::default()
        };
        assert!(feed.deliver(&first, &mut sink).unwrap());
        assert!(!feed.deliver(&first, &mut sink).unwrap(), "same frame is not repeated");

        let second = SessionSnapshot {
            last_frame: Some(frame(2)),
            ..Default::default()
        };
        assert!(feed.deliver(&second, &mut sink).unwrap());
        assert_eq!(sink.frames, vec![1, 2]);
    }

    #[test]
    fn test_delivers_new_rejections() {
        let mut feed = SnapshotFeed::new();
        let mut sink = RecordingSink::default();
        let error = DecodeError::TooShort { len: 4, expected: 29 };

        let mut snapshot = SessionSnapshot {
            last_decode_error: Some(error.clone()),
            ..Default::default()
        };
        snapshot.counters.errors = 1;

        assert!(!feed.deliver(&snapshot, &mut sink).unwrap());
        feed.deliver(&snapshot, &mut sink).unwrap();
        assert_eq!(sink.rejected, vec![error]);
        assert!(!sink.finished);
    }

    #[test]
    fn test_empty_snapshot_delivers_nothing() {
        let mut feed = SnapshotFeed::new();
        let mut sink = RecordingSink::default();
        assert!(!feed.deliver(&SessionSnapshot::default(), &mut sink).unwrap());
        assert!(sink.frames.is_empty());
        assert!(sink.rejected.is_empty());
    }
}
