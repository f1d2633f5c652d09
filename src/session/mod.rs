//! # Receive Session Module
//!
//! Turns a stream of UDP datagrams into published telemetry snapshots.
//!
//! This module handles:
//! - Binding the UDP socket with address/port reuse and broadcast reception
//! - Running the receive loop on a tokio task with a bounded receive timeout
//! - Decoding, unit conversion and spare analysis per datagram
//! - Rolling packet interval/rate statistics
//! - Step-by-step and throttled playback
//! - Publishing immutable snapshots through a `watch` channel
//!
//! ## Lifecycle
//!
//! ```text
//! Idle --bind/attach--> Bound --run--> Receiving --stop/transport error--> Stopped
//! ```
//!
//! A transport error or a panic in the worker ends the session with the error
//! recorded in the snapshot; it never takes down the process.

pub mod pipeline;
pub mod source;
pub mod stats;

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::error::{DecodeError, FreedError, Result};
use crate::freed::decoder::PacketCounters;
use crate::genlock::SpareInterpretation;
use crate::units::UnitConverter;
pub use pipeline::{PacketPipeline, TelemetryFrame};
pub use source::{DatagramSource, UdpDatagramSource, DEFAULT_BUFFER_SIZE, MAX_UDP_PAYLOAD};

/// Default FreeD UDP port
pub const DEFAULT_PORT: u16 = 45000;

/// Default receive timeout; bounds how long `stop` can take to be noticed
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest receive timeout accepted
pub const MAX_RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Time without packets after which the signal counts as lost
pub const STALE_AFTER: Duration = Duration::from_secs(2);

/// Session lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Bound,
    Receiving,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Bound => "bound",
            Self::Receiving => "receiving",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Per-session processing options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    /// Do not count or act on checksum mismatches
    pub ignore_checksum: bool,

    /// Discard packets with a bad checksum
    pub checksum_fatal: bool,

    /// Frame rate for rendering the spare word as timecode
    pub timecode_fps: Option<f64>,

    /// Convert raw values to physical units
    pub convert_units: bool,

    /// Hold each packet until [`ReceiveSession::advance`] is called
    pub step_by_step: bool,

    /// Pause after each packet
    pub per_packet_delay: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            ignore_checksum: false,
            checksum_fatal: false,
            timecode_fps: None,
            convert_units: true,
            step_by_step: false,
            per_packet_delay: Duration::ZERO,
        }
    }
}

/// Everything needed to construct a session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Address to bind
    pub host: String,

    /// UDP port to bind
    pub port: u16,

    /// Upper bound on a single receive wait
    pub recv_timeout: Duration,

    /// Receive buffer size in bytes
    pub buffer_size: usize,

    /// Processing options
    pub options: SessionOptions,

    /// Scales and lens tables
    pub converter: UnitConverter,

    /// Spare word interpretation
    pub spare: SpareInterpretation,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            options: SessionOptions::default(),
            converter: UnitConverter::default(),
            spare: SpareInterpretation::default(),
        }
    }
}

/// Immutable view of a session, published after every change
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    /// Lifecycle state
    pub state: SessionState,

    /// Bound address, once bound
    pub local_addr: Option<SocketAddr>,

    /// Packet counters
    pub counters: PacketCounters,

    /// Most recent accepted frame
    pub last_frame: Option<Arc<TelemetryFrame>>,

    /// Sender of the most recent accepted frame
    pub last_sender: Option<SocketAddr>,

    /// Rolling mean inter-packet interval in milliseconds
    pub interval_ms: Option<f64>,

    /// Packet rate from the rolling mean interval
    pub fps: Option<f64>,

    /// Most recent rejected packet's reason
    pub last_decode_error: Option<DecodeError>,

    /// Error that stopped the session
    pub last_error: Option<Arc<FreedError>>,

    /// Monotonic arrival time of the most recent accepted frame
    pub last_packet_at: Option<Instant>,
}

impl SessionSnapshot {
    /// Whether no packet has arrived for longer than [`STALE_AFTER`]
    ///
    /// A session that has never received a packet is not stale.
    pub fn is_stale(&self, now: Instant) -> bool {
        self.last_packet_at
            .map_or(false, |at| now.saturating_duration_since(at) > STALE_AFTER)
    }
}

/// Stop and step signals shared with the worker
#[derive(Debug, Default)]
struct Control {
    stopping: AtomicBool,
    wake: Notify,
    advance: Notify,
}

impl Control {
    fn request_stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

/// A FreeD receive session
///
/// Lifecycle operations must be called from within a tokio runtime.
pub struct ReceiveSession {
    config: SessionConfig,
    pipeline: Option<PacketPipeline>,
    source: Option<Box<dyn DatagramSource>>,
    control: Arc<Control>,
    state: Arc<watch::Sender<SessionSnapshot>>,
    supervisor: Option<JoinHandle<()>>,
}

impl fmt::Debug for ReceiveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiveSession")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("state", &self.state.borrow().state)
            .finish_non_exhaustive()
    }
}

impl ReceiveSession {
    /// Create an idle session
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The receive timeout is zero or longer than one second
    /// - The timecode frame rate is unusable
    pub fn new(config: SessionConfig) -> Result<Self> {
        if config.recv_timeout.is_zero() || config.recv_timeout > MAX_RECV_TIMEOUT {
            return Err(FreedError::config(format!(
                "receive timeout must be between 1 ms and {} ms, got {:?}",
                MAX_RECV_TIMEOUT.as_millis(),
                config.recv_timeout
            )));
        }

        let pipeline = PacketPipeline::new(&config.options, config.converter.clone(), config.spare)?;
        let (state, _) = watch::channel(SessionSnapshot::default());

        Ok(Self {
            config,
            pipeline: Some(pipeline),
            source: None,
            control: Arc::new(Control::default()),
            state: Arc::new(state),
            supervisor: None,
        })
    }

    /// Create, bind and run a session with default settings and `options`
    ///
    /// # Errors
    ///
    /// Returns error if the options are invalid or the socket cannot be bound.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use freed_reader::session::{ReceiveSession, SessionOptions};
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let mut session = ReceiveSession::start("0.0.0.0", 45000, SessionOptions::default())?;
    ///     let mut updates = session.subscribe();
    ///
    ///     updates.changed().await?;
    ///     if let Some(frame) = &updates.borrow().last_frame {
    ///         println!("camera {}", frame.frame.fields.camera_id);
    ///     }
    ///
    ///     session.stop().await?;
    ///     Ok(())
    /// }
    /// ```
    pub fn start(host: &str, port: u16, options: SessionOptions) -> Result<Self> {
        let mut session = Self::new(SessionConfig {
            host: host.to_string(),
            port,
            options,
            ..SessionConfig::default()
        })?;
        session.bind()?;
        session.run()?;
        Ok(session)
    }

    /// Bind the configured UDP address
    ///
    /// # Errors
    ///
    /// Returns `FreedError::Bind` if binding fails, `FreedError::InvalidState`
    /// unless the session is idle.
    pub fn bind(&mut self) -> Result<SocketAddr> {
        self.expect_state(SessionState::Idle, "bind")?;
        let source =
            UdpDatagramSource::bind(&self.config.host, self.config.port, self.config.buffer_size)?;
        self.attach(Box::new(source))
    }

    /// Use an already open datagram source instead of binding
    ///
    /// # Errors
    ///
    /// Returns `FreedError::InvalidState` unless the session is idle.
    pub fn attach(&mut self, source: Box<dyn DatagramSource>) -> Result<SocketAddr> {
        self.expect_state(SessionState::Idle, "attach")?;
        let local_addr = source.local_addr()?;
        self.source = Some(source);

        self.state.send_modify(|s| {
            s.state = SessionState::Bound;
            s.local_addr = Some(local_addr);
        });
        debug!("Session bound to {}", local_addr);
        Ok(local_addr)
    }

    /// Start the receive worker
    ///
    /// # Errors
    ///
    /// Returns `FreedError::InvalidState` unless the session is bound.
    pub fn run(&mut self) -> Result<()> {
        self.expect_state(SessionState::Bound, "run")?;
        let (Some(source), Some(pipeline)) = (self.source.take(), self.pipeline.take()) else {
            return Err(FreedError::InvalidState("session has no source to run".to_string()));
        };

        let worker = Worker {
            source,
            pipeline,
            control: Arc::clone(&self.control),
            state: Arc::clone(&self.state),
            recv_timeout: self.config.recv_timeout,
            per_packet_delay: self.config.options.per_packet_delay,
            step_by_step: self.config.options.step_by_step,
        };

        self.state.send_modify(|s| s.state = SessionState::Receiving);
        info!("Receiving FreeD packets");

        let receiver = tokio::spawn(worker.run());
        let state = Arc::clone(&self.state);
        self.supervisor = Some(tokio::spawn(supervise(receiver, state)));
        Ok(())
    }

    /// Release the next packet in step-by-step mode
    pub fn advance(&self) {
        self.control.advance.notify_one();
    }

    /// Stop the session and wait for the worker to exit
    ///
    /// Stopping an already stopped session does nothing.
    ///
    /// # Errors
    ///
    /// Returns `FreedError::Worker` if the supervising task could not be joined.
    pub async fn stop(&mut self) -> Result<()> {
        self.control.request_stop();
        self.source = None;

        if let Some(supervisor) = self.supervisor.take() {
            supervisor
                .await
                .map_err(|e| FreedError::Worker(format!("supervisor failed: {}", e)))?;
        }

        self.state.send_modify(|s| s.state = SessionState::Stopped);
        Ok(())
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state.borrow().state
    }

    /// Configuration the session was built from
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn expect_state(&self, expected: SessionState, operation: &str) -> Result<()> {
        let current = self.state();
        if current != expected {
            return Err(FreedError::InvalidState(format!(
                "cannot {} a session that is {}",
                operation, current
            )));
        }
        Ok(())
    }
}

impl Drop for ReceiveSession {
    fn drop(&mut self) {
        self.control.request_stop();
    }
}

/// Wait for the worker and turn an abnormal exit into a stopped session
async fn supervise(receiver: JoinHandle<()>, state: Arc<watch::Sender<SessionSnapshot>>) {
    let Err(e) = receiver.await else {
        return;
    };

    let message = if e.is_panic() {
        let payload = e.into_panic();
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        format!("receive worker panicked: {}", detail)
    } else {
        "receive worker was cancelled".to_string()
    };

    error!("{}", message);
    state.send_modify(|s| {
        s.state = SessionState::Stopped;
        s.last_error = Some(Arc::new(FreedError::Worker(message)));
    });
}

/// Receive errors that do not end the session
fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
    )
}

/// Receive loop state owned by the worker task
struct Worker {
    source: Box<dyn DatagramSource>,
    pipeline: PacketPipeline,
    control: Arc<Control>,
    state: Arc<watch::Sender<SessionSnapshot>>,
    recv_timeout: Duration,
    per_packet_delay: Duration,
    step_by_step: bool,
}

impl Worker {
    async fn run(mut self) {
        while !self.control.is_stopping() {
            let received = tokio::select! {
                _ = self.control.wake.notified() => break,
                result = tokio::time::timeout(self.recv_timeout, self.source.recv()) => result,
            };

            match received {
                Err(_) => {
                    trace!("No packet within {:?}", self.recv_timeout);
                    continue;
                }
                Ok(Err(e)) if is_transient(&e) => {
                    debug!("Transient receive error: {}", e);
                    continue;
                }
                Ok(Err(e)) => {
                    error!("UDP receive error, stopping session: {}", e);
                    self.state.send_modify(|s| {
                        s.state = SessionState::Stopped;
                        s.last_error = Some(Arc::new(FreedError::Transport(e)));
                    });
                    return;
                }
                Ok(Ok((datagram, sender))) => self.ingest(datagram, sender),
            }

            if !self.per_packet_delay.is_zero() {
                tokio::select! {
                    _ = self.control.wake.notified() => break,
                    _ = tokio::time::sleep(self.per_packet_delay) => {}
                }
            }

            if self.step_by_step {
                tokio::select! {
                    _ = self.control.wake.notified() => break,
                    _ = self.control.advance.notified() => {}
                }
            }
        }

        debug!("Receive worker exiting");
        self.state.send_modify(|s| s.state = SessionState::Stopped);
    }

    fn ingest(&mut self, datagram: bytes::Bytes, sender: SocketAddr) {
        let result = self
            .pipeline
            .process(datagram, sender, Instant::now(), Utc::now());
        let counters = self.pipeline.counters();

        match result {
            Ok(frame) => {
                let frame = Arc::new(frame);
                let interval_ms = self.pipeline.interval_ms();
                let fps = self.pipeline.fps();
                let last_packet_at = self.pipeline.last_arrival();

                self.state.send_modify(|s| {
                    s.counters = counters;
                    s.last_frame = Some(frame);
                    s.last_sender = Some(sender);
                    s.interval_ms = interval_ms;
                    s.fps = fps;
                    s.last_packet_at = last_packet_at;
                });
            }
            Err(e) => {
                warn!(%sender, "Discarding packet: {}", e);
                self.state.send_modify(|s| {
                    s.counters = counters;
                    s.last_decode_error = Some(e);
                });
            }
        }
    }
}
