//! # Simulator Module
//!
//! Headless FreeD packet generator.
//!
//! Sends D1 packets for a camera pose to a UDP target, either one at a time or
//! at a fixed rate, optionally emulating a genlocked phase counter and
//! sweeping the pose so a receiver sees moving values.

use std::f64::consts::TAU;
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::{lookup_host, UdpSocket};
use tokio::time::{interval, Duration, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::{FreedError, Result};
use crate::freed::encoder::{PacketGenerator, PhysicalPose};

/// Number of packets between status log messages
const LOG_INTERVAL_PACKETS: u64 = 250;

/// Pose the simulator starts from
pub fn default_pose(camera_id: u8) -> PhysicalPose {
    PhysicalPose {
        camera_id,
        zoom_mm: Some(35.0),
        focus_m: Some(4.17),
        ..Default::default()
    }
}

/// Pose moved along a smooth periodic path, `elapsed_secs` after start
///
/// Pan swings ±45° every 8 s, tilt ±10° every 5 s, X ±0.5 m every 10 s and
/// zoom runs across 28-100 mm every 12 s. Lens values stay "no data" if the
/// base pose has none.
pub fn sweep_pose(base: &PhysicalPose, elapsed_secs: f64) -> PhysicalPose {
    let wave = |period: f64| (TAU * elapsed_secs / period).sin();

    PhysicalPose {
        pan_deg: base.pan_deg + 45.0 * wave(8.0),
        tilt_deg: base.tilt_deg + 10.0 * wave(5.0),
        x_m: base.x_m + 0.5 * wave(10.0),
        zoom_mm: base
            .zoom_mm
            .map(|_| 28.0 + 72.0 * (0.5 - 0.5 * (TAU * elapsed_secs / 12.0).cos())),
        ..*base
    }
}

/// Send period for a rate, never shorter than 1 ms
pub fn send_period(rate_hz: u32) -> Duration {
    Duration::from_millis(u64::from((1000 / rate_hz.max(1)).max(1)))
}

/// UDP sender for generated packets
#[derive(Debug)]
pub struct Simulator {
    socket: UdpSocket,
    target: SocketAddr,
    generator: PacketGenerator,
    pose: PhysicalPose,
    sweep: bool,
    started: Instant,
    sent: u64,
}

impl Simulator {
    /// Open a sending socket for `target` (`host:port`)
    ///
    /// # Errors
    ///
    /// Returns `FreedError::Bind` if the target does not resolve or no local
    /// socket can be opened.
    pub async fn connect(target: &str, pose: PhysicalPose, genlock: bool) -> Result<Self> {
        let unresolved = || FreedError::Bind {
            addr: target.to_string(),
            source: io::Error::new(io::ErrorKind::AddrNotAvailable, "target did not resolve"),
        };
        let target_addr = lookup_host(target)
            .await
            .map_err(|source| FreedError::Bind {
                addr: target.to_string(),
                source,
            })?
            .next()
            .ok_or_else(unresolved)?;

        let local = if target_addr.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| FreedError::bind(local, e))?;
        if let Err(e) = socket.set_broadcast(true) {
            debug!("SO_BROADCAST unavailable: {}", e);
        }

        info!("Simulator sending to {}", target_addr);
        Ok(Self {
            socket,
            target: target_addr,
            generator: PacketGenerator::new(genlock),
            pose,
            sweep: false,
            started: Instant::now(),
            sent: 0,
        })
    }

    /// Move the pose along [`sweep_pose`] on every packet
    pub fn set_sweep(&mut self, sweep: bool) {
        self.sweep = sweep;
        self.started = Instant::now();
    }

    /// Enable or disable genlock phase cycling
    pub fn set_genlock(&mut self, genlock: bool) {
        self.generator.set_genlock(genlock);
    }

    /// Replace the base pose
    pub fn set_pose(&mut self, pose: PhysicalPose) {
        self.pose = pose;
    }

    /// Base pose
    pub fn pose(&self) -> &PhysicalPose {
        &self.pose
    }

    /// Destination address
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Packets sent so far
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Build and send one packet
    ///
    /// # Errors
    ///
    /// Returns `FreedError::Transport` if the send fails.
    pub async fn send_one(&mut self) -> Result<usize> {
        let pose = if self.sweep {
            sweep_pose(&self.pose, self.started.elapsed().as_secs_f64())
        } else {
            self.pose
        };

        let packet = self.generator.next_packet(&pose);
        let sent = self
            .socket
            .send_to(&packet, self.target)
            .await
            .map_err(FreedError::Transport)?;

        self.sent += 1;
        debug!(phase = self.generator.phase(), "Sent FreeD packet ({} bytes)", sent);
        Ok(sent)
    }

    /// Send at `rate_hz` until `count` packets are sent or `shutdown` resolves
    ///
    /// Returns the number of packets sent by this call.
    ///
    /// # Errors
    ///
    /// Returns `FreedError::Transport` on the first failed send.
    pub async fn run<F>(&mut self, rate_hz: u32, count: Option<u64>, shutdown: F) -> Result<u64>
    where
        F: Future<Output = ()>,
    {
        let period = send_period(rate_hz);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!("Sending FreeD packets at {}Hz ({:?} period)", rate_hz, period);
        let mut sent_here = 0u64;

        loop {
            if matches!(count, Some(limit) if sent_here >= limit) {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    self.send_one().await?;
                    sent_here += 1;

                    if sent_here % LOG_INTERVAL_PACKETS == 0 {
                        info!("Sent {} packets", sent_here);
                    }
                }
                _ = &mut shutdown => {
                    info!("Simulator stopping");
                    break;
                }
            }
        }

        info!("Total packets sent: {}", sent_here);
        Ok(sent_here)
    }
}
