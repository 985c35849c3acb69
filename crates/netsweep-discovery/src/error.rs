//! Error types for subnet parsing and probing

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use thiserror::Error;

/// Why a configured subnet was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubnetError {
    #[error("empty CIDR entry")]
    Empty,
    #[error("unable to parse CIDR {cidr:?}: {reason}")]
    Parse { cidr: String, reason: String },
    #[error("only IPv4 subnets are supported, got {0:?}")]
    NotIpv4(String),
}

/// Outcome of a failed dial
#[derive(Error, Debug)]
pub enum DialError {
    #[error("i/o timeout dialing {0}")]
    Timeout(SocketAddr),
    #[error("connection refused by {0}")]
    Refused(SocketAddr),
    #[error("host unreachable dialing {addr}: {source}")]
    HostUnreachable {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("invalid port {0:?}")]
    InvalidPort(String),
    #[error("dial {addr} failed: {source}")]
    Io {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

impl DialError {
    /// Sort an I/O error from a connect attempt into a dial outcome.
    ///
    /// Only the dial deadline produces `Timeout`; an OS-level `TimedOut`
    /// (ETIMEDOUT) is an ordinary `Io` error and does not count against the
    /// host's timeout budget.
    pub fn classify(addr: SocketAddr, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => DialError::Refused(addr),
            io::ErrorKind::HostUnreachable => DialError::HostUnreachable { addr, source: err },
            _ => DialError::Io { addr, source: err },
        }
    }
}

/// Condition that ends probing of a host before all its ports were tried
#[derive(Error, Debug)]
pub enum HostAbort {
    #[error("host {host} is unreachable")]
    Unreachable {
        host: Ipv4Addr,
        #[source]
        source: DialError,
    },
    #[error("host {host} gave up after {timeouts} dial timeouts")]
    TooManyTimeouts { host: Ipv4Addr, timeouts: usize },
}
