//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "UDP request/response client."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace};

use crate::error::TransportError;

const MAX_DATAGRAM: usize = 2048;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpEndpoint {
    pub host: String,
    pub port: u16,
    pub local_port: u16,
    pub timeout: Duration,
}

/// Text datagram exchange with a single device.
#[async_trait]
pub trait UdpTransport: Send + Sync {
    /// Send `command` and wait for the next datagram coming from the device.
    async fn exchange(&self, command: &str) -> Result<String, TransportError>;

    /// Re-apply the endpoint; the local socket is rebound on the next exchange.
    fn update(&self, endpoint: UdpEndpoint);
}

/// `tokio` UDP socket bound lazily to the configured local port.
pub struct UdpClient {
    endpoint: RwLock<UdpEndpoint>,
    socket: Mutex<Option<UdpSocket>>,
}

impl UdpClient {
    pub fn new(endpoint: UdpEndpoint) -> Self {
        Self {
            endpoint: RwLock::new(endpoint),
            socket: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> UdpEndpoint {
        self.endpoint.read().clone()
    }

    async fn peer(endpoint: &UdpEndpoint) -> Result<SocketAddr, TransportError> {
        let target = format!("{}:{}", endpoint.host, endpoint.port);
        let found = tokio::net::lookup_host(target.as_str()).await?.next();
        found.ok_or(TransportError::Resolve(target))
    }
}

/// Unspecified local address of the same family as `peer`.
fn local_bind_addr(peer: SocketAddr, local_port: u16) -> SocketAddr {
    let ip: IpAddr = match peer {
        SocketAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
        SocketAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
    };
    SocketAddr::new(ip, local_port)
}

#[async_trait]
impl UdpTransport for UdpClient {
    async fn exchange(&self, command: &str) -> Result<String, TransportError> {
        let endpoint = self.endpoint();
        let peer = Self::peer(&endpoint).await?;
        let mut slot = self.socket.lock().await;
        let rebind = match slot.as_ref() {
            Some(socket) => socket.local_addr()?.is_ipv4() != peer.is_ipv4(),
            None => true,
        };
        if rebind {
            // Release the old socket first, it may hold the configured local port.
            *slot = None;
            let socket = UdpSocket::bind(local_bind_addr(peer, endpoint.local_port)).await?;
            debug!(local = %socket.local_addr()?, "udp socket bound");
            *slot = Some(socket);
        }
        let Some(socket) = slot.as_ref() else {
            return Err(TransportError::Resolve(peer.to_string()));
        };

        // Replies from a previous exchange that arrived after its deadline.
        let mut buffer = [0u8; MAX_DATAGRAM];
        while let Ok((_, from)) = socket.try_recv_from(&mut buffer) {
            trace!(%from, "discarding stale datagram");
        }

        socket.send_to(command.as_bytes(), peer).await?;
        debug!(%peer, command, "udp request sent");

        let deadline = Instant::now() + endpoint.timeout;
        loop {
            let (len, from) = timeout_at(deadline, socket.recv_from(&mut buffer))
                .await
                .map_err(|_| TransportError::Timeout(endpoint.timeout))??;
            if from.ip() != peer.ip() {
                trace!(%from, "ignoring datagram from foreign host");
                continue;
            }
            let reply = String::from_utf8_lossy(&buffer[..len]).trim().to_owned();
            return Ok(reply);
        }
    }

    fn update(&self, endpoint: UdpEndpoint) {
        debug!(host = %endpoint.host, port = endpoint.port, "udp endpoint updated");
        *self.endpoint.write() = endpoint;
        if let Ok(mut socket) = self.socket.try_lock() {
            *socket = None;
        }
    }
}
