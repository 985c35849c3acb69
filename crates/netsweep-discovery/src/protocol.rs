//! Protocol handler seam between the engine and device-specific logic

use async_trait::async_trait;
use netsweep_core::Transport;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::{TcpStream, UdpSocket};

use crate::params::ScanParams;

/// A live connection handed to a protocol handler after a successful dial
///
/// The engine owns the connection and drops it as soon as the handler
/// returns, so handlers only ever borrow it.
#[derive(Debug)]
pub enum Connection {
    Tcp(TcpStream),
    /// A UDP socket already `connect`ed to the probed host
    Udp(UdpSocket),
}

impl Connection {
    pub fn transport(&self) -> Transport {
        match self {
            Connection::Tcp(_) => Transport::Tcp,
            Connection::Udp(_) => Transport::Udp,
        }
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Connection::Tcp(stream) => stream.peer_addr(),
            Connection::Udp(socket) => socket.peer_addr(),
        }
    }

    pub fn as_tcp_mut(&mut self) -> Option<&mut TcpStream> {
        match self {
            Connection::Tcp(stream) => Some(stream),
            Connection::Udp(_) => None,
        }
    }

    pub fn as_udp(&self) -> Option<&UdpSocket> {
        match self {
            Connection::Udp(socket) => Some(socket),
            Connection::Tcp(_) => None,
        }
    }
}

/// Device-protocol specific discovery behaviour
///
/// One implementation exists per supported device protocol. The engine only
/// moves `ProbeResult`s from workers to the aggregator and never looks
/// inside them.
#[async_trait]
pub trait ProtocolDiscovery: Send + Sync + 'static {
    /// Raw payload produced when a probe finds something
    type ProbeResult: Send + 'static;
    /// Record produced from a `ProbeResult`
    type Device: Send + 'static;

    /// Select, in order, which of the configured ports to probe on `host`.
    /// Returning an empty list skips the host.
    fn probe_filter(&self, host: Ipv4Addr, ports: &[String]) -> Vec<String>;

    /// Interrogate a freshly dialed connection. Errors are logged by the
    /// engine and never stop the scan.
    async fn on_connection_dialed(
        &self,
        host: Ipv4Addr,
        port: &str,
        conn: &mut Connection,
        params: &ScanParams,
    ) -> anyhow::Result<Vec<Self::ProbeResult>>;

    /// Turn a raw result into a device. A failed conversion drops only that result.
    fn convert_probe_result(
        &self,
        result: Self::ProbeResult,
        params: &ScanParams,
    ) -> anyhow::Result<Self::Device>;
}
