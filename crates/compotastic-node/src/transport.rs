//! Frame transports.
//!
//! The protocol only needs a datagram service with a hard frame limit:
//! - [`UdpTransport`] fans frames out to a fixed peer list over UDP
//! - [`SimulatedMesh`](crate::SimulatedMesh) is an in-process lossy hub for tests

use std::future::Future;
use std::net::SocketAddr;

use anyhow::bail;
use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

/// A datagram service that carries whole frames.
pub trait Transport: Send {
    /// Largest frame `send` accepts.
    fn max_frame_size(&self) -> usize;

    /// Send one frame to every reachable peer.
    fn send(&mut self, frame: Bytes) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Next inbound frame, or `None` once the transport is closed.
    ///
    /// Must be cancel safe: the runner polls it inside `select!`.
    fn recv(&mut self) -> impl Future<Output = Option<Bytes>> + Send;
}

/// UDP transport configuration
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Address to bind to
    pub bind: SocketAddr,
    /// Every frame is sent to each of these
    pub peers: Vec<SocketAddr>,
    pub max_frame_size: usize,
    /// Send buffer size in bytes
    pub sndbuf: usize,
    /// Receive buffer size in bytes
    pub rcvbuf: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], crate::config::DEFAULT_PORT)),
            peers: Vec::new(),
            max_frame_size: compotastic_wire::DEFAULT_MAX_FRAME_SIZE,
            sndbuf: 64 * 1024,
            rcvbuf: 64 * 1024,
        }
    }
}

/// UDP stand-in for the radio link.
pub struct UdpTransport {
    socket: UdpSocket,
    peers: Vec<SocketAddr>,
    max_frame_size: usize,
    buf: Vec<u8>,
}

impl UdpTransport {
    /// Bind with the configured buffer sizes.
    pub async fn bind(cfg: UdpConfig) -> anyhow::Result<Self> {
        let domain = if cfg.bind.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

        // Buffer sizes must be set before binding
        socket.set_send_buffer_size(cfg.sndbuf)?;
        socket.set_recv_buffer_size(cfg.rcvbuf)?;
        socket.set_reuse_address(true)?;

        socket.bind(&cfg.bind.into())?;
        socket.set_nonblocking(true)?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)?;

        info!(
            "UDP transport bound to {} ({} peers, max frame {} bytes)",
            socket.local_addr()?,
            cfg.peers.len(),
            cfg.max_frame_size
        );

        Ok(Self {
            socket,
            peers: cfg.peers,
            max_frame_size: cfg.max_frame_size,
            // One spare byte so oversize datagrams are detectable.
            buf: vec![0u8; cfg.max_frame_size + 1],
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn add_peer(&mut self, peer: SocketAddr) {
        if !self.peers.contains(&peer) {
            self.peers.push(peer);
        }
    }

    pub fn peers(&self) -> &[SocketAddr] {
        &self.peers
    }
}

impl Transport for UdpTransport {
    fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    async fn send(&mut self, frame: Bytes) -> anyhow::Result<()> {
        if frame.len() > self.max_frame_size {
            bail!(
                "frame of {} bytes exceeds maximum {}",
                frame.len(),
                self.max_frame_size
            );
        }

        let mut failed = 0;
        for peer in &self.peers {
            if let Err(e) = self.socket.send_to(&frame, peer).await {
                warn!("Send to {} failed: {}", peer, e);
                failed += 1;
            }
        }
        if failed > 0 && failed == self.peers.len() {
            bail!("send failed for all {} peers", failed);
        }
        Ok(())
    }

    async fn recv(&mut self) -> Option<Bytes> {
        loop {
            match self.socket.recv_from(&mut self.buf).await {
                Ok((len, from)) if len > self.max_frame_size => {
                    debug!("Dropping oversize datagram ({}+ bytes) from {}", len, from);
                }
                Ok((len, _)) => return Some(Bytes::copy_from_slice(&self.buf[..len])),
                Err(e) => warn!("UDP receive failed: {}", e),
            }
        }
    }
}
