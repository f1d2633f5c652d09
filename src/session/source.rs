//! Trait abstraction for datagram reception to enable testing

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};

use async_trait::async_trait;
use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::error::{FreedError, Result};
use crate::freed::protocol::FREED_PACKET_SIZE;

/// Largest payload a UDP datagram over IPv4 can carry
pub const MAX_UDP_PAYLOAD: usize = 65_507;

/// Default receive buffer size, large enough that no datagram is truncated
pub const DEFAULT_BUFFER_SIZE: usize = MAX_UDP_PAYLOAD;

/// Source of datagrams for a receive session
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DatagramSource: Send {
    /// Wait for the next datagram and its sender
    async fn recv(&mut self) -> io::Result<(Bytes, SocketAddr)>;

    /// Address the source is bound to
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Wrapper around tokio::net::UdpSocket that implements DatagramSource
#[derive(Debug)]
pub struct UdpDatagramSource {
    socket: UdpSocket,
    buffer: Vec<u8>,
}

impl UdpDatagramSource {
    /// Wrap an already bound socket
    ///
    /// `buffer_size` is raised to one D1 frame if smaller.
    pub fn new(socket: UdpSocket, buffer_size: usize) -> Self {
        Self {
            socket,
            buffer: vec![0u8; buffer_size.max(FREED_PACKET_SIZE)],
        }
    }

    /// Bind a UDP socket for FreeD reception
    ///
    /// Address reuse (and port reuse on unix) lets several readers share a
    /// port, and broadcast reception is enabled for trackers that broadcast.
    /// These options are best-effort; only the bind itself must succeed.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `FreedError::Bind` if the address does not resolve or the
    /// socket cannot be created or bound.
    pub fn bind(host: &str, port: u16, buffer_size: usize) -> Result<Self> {
        let addr = resolve(host, port)?;
        let socket = bind_socket(addr).map_err(|e| FreedError::bind(addr, e))?;
        let socket = UdpSocket::from_std(socket.into()).map_err(|e| FreedError::bind(addr, e))?;

        info!("Listening for FreeD packets on {}", addr);
        Ok(Self::new(socket, buffer_size))
    }
}

/// Resolve `host:port` to the first matching socket address
fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    let target = format!("{}:{}", host, port);
    let mut addrs = (host, port).to_socket_addrs().map_err(|source| FreedError::Bind {
        addr: target.clone(),
        source,
    })?;

    addrs.next().ok_or_else(|| FreedError::Bind {
        addr: target,
        source: io::Error::new(io::ErrorKind::AddrNotAvailable, "address did not resolve"),
    })
}

fn bind_socket(addr: SocketAddr) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;

    if let Err(e) = socket.set_reuse_address(true) {
        debug!("SO_REUSEADDR unavailable: {}", e);
    }
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    {
        if let Err(e) = socket.set_reuse_port(true) {
            debug!("SO_REUSEPORT unavailable: {}", e);
        }
    }
    if let Err(e) = socket.set_broadcast(true) {
        debug!("SO_BROADCAST unavailable: {}", e);
    }

    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    Ok(socket)
}

#[async_trait]
impl DatagramSource for UdpDatagramSource {
    async fn recv(&mut self) -> io::Result<(Bytes, SocketAddr)> {
        let (len, sender) = self.socket.recv_from(&mut self.buffer).await?;
        if len == self.buffer.len() && len < MAX_UDP_PAYLOAD {
            warn!(
                %sender,
                "Datagram filled the {} byte receive buffer and may be truncated",
                len
            );
        }
        Ok((Bytes::copy_from_slice(&self.buffer[..len]), sender))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}
