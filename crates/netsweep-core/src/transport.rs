//! Transport protocol used to dial probe targets

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Network transport for probe connections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Stream connection; a successful dial means something is listening
    #[default]
    Tcp,
    /// Datagram "connection"; dialing never proves the host is there
    Udp,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Udp => "udp",
        }
    }

    /// Whether a successful dial says anything about the remote host
    pub fn has_handshake(&self) -> bool {
        matches!(self, Transport::Tcp)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown transport {0:?}, expected \"tcp\" or \"udp\"")]
pub struct ParseTransportError(pub String);

impl FromStr for Transport {
    type Err = ParseTransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tcp" => Ok(Transport::Tcp),
            "udp" => Ok(Transport::Udp),
            _ => Err(ParseTransportError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transport() {
        assert_eq!("tcp".parse::<Transport>().unwrap(), Transport::Tcp);
        assert_eq!(" UDP ".parse::<Transport>().unwrap(), Transport::Udp);
        assert!("sctp".parse::<Transport>().is_err());
    }

    #[test]
    fn test_transport_serde_names() {
        let json = serde_json::to_string(&Transport::Udp).unwrap();
        assert_eq!(json, "\"udp\"");
        let parsed: Transport = serde_json::from_str("\"tcp\"").unwrap();
        assert_eq!(parsed, Transport::Tcp);
    }

    #[test]
    fn test_only_tcp_has_handshake() {
        assert!(Transport::Tcp.has_handshake());
        assert!(!Transport::Udp.has_handshake());
    }
}
