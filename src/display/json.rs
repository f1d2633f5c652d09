//! JSON Lines output, one object per frame

use std::io::{self, Write};

use serde::Serialize;

use super::FrameSink;
use crate::error::{DecodeError, Result};
use crate::freed::decoder::PacketCounters;
use crate::session::{SessionSnapshot, TelemetryFrame};

/// One output record
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Record<'a> {
    Frame {
        #[serde(flatten)]
        frame: &'a TelemetryFrame,
        counters: PacketCounters,
        interval_ms: Option<f64>,
        fps: Option<f64>,
    },
    Rejected {
        error: String,
        counters: PacketCounters,
    },
    Summary {
        counters: PacketCounters,
        error: Option<String>,
    },
}

/// Writes frames as newline-delimited JSON
#[derive(Debug)]
pub struct JsonLinesPrinter<W: Write> {
    out: W,
}

impl JsonLinesPrinter<io::Stdout> {
    /// Printer writing to standard output
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonLinesPrinter<W> {
    /// Printer writing to `out`
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Recover the writer
    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_record(&mut self, record: &Record<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write> FrameSink for JsonLinesPrinter<W> {
    fn on_frame(&mut self, frame: &TelemetryFrame, snapshot: &SessionSnapshot) -> Result<()> {
        self.write_record(&Record::Frame {
            frame,
            counters: snapshot.counters,
            interval_ms: snapshot.interval_ms,
            fps: snapshot.fps,
        })
    }

    fn on_rejected(&mut self, error: &DecodeError, snapshot: &SessionSnapshot) -> Result<()> {
        self.write_record(&Record::Rejected {
            error: error.to_string(),
            counters: snapshot.counters,
        })
    }

    fn on_finish(&mut self, snapshot: &SessionSnapshot) -> Result<()> {
        self.write_record(&Record::Summary {
            counters: snapshot.counters,
            error: snapshot.last_error.as_ref().map(|e| e.to_string()),
        })
    }
}
