//! Device records produced by protocol handlers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;

use crate::transport::Transport;

const TEMPORARY_PREFIX: &str = "temp-";

/// Identifier for a discovered device, taken from its hardware ID when known
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn from_hwid(hwid: &str) -> Self {
        Self(hwid.trim().to_string())
    }

    /// Placeholder for devices that answered but never reported a hardware ID
    pub fn temporary() -> Self {
        Self(format!("{}{}", TEMPORARY_PREFIX, Uuid::new_v4()))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMPORARY_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address and transport a device answered on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub ip: IpAddr,
    pub port: u16,
    pub transport: Transport,
}

impl Endpoint {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.socket_addr(), self.transport)
    }
}

/// What the device says about itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Raw OS description string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub board: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processor: Option<String>,
}

/// The firmware image a device is running
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareImage {
    pub slot: u32,
    pub version: String,
    /// Hex encoded image hash
    pub hash: String,
    pub confirmed: bool,
    pub pending: bool,
}

/// A device found by a discovery run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub endpoint: Endpoint,
    pub found_at: DateTime<Utc>,
    #[serde(default)]
    pub info: DeviceInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware: Option<FirmwareImage>,
}

impl Device {
    pub fn new(id: DeviceId, name: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            id,
            name: name.into(),
            endpoint,
            found_at: Utc::now(),
            info: DeviceInfo::default(),
            firmware: None,
        }
    }

    pub fn firmware_version(&self) -> Option<&str> {
        self.firmware.as_ref().map(|f| f.version.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn endpoint() -> Endpoint {
        Endpoint {
            ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 100)),
            port: 1337,
            transport: Transport::Udp,
        }
    }

    #[test]
    fn test_device_id_from_hwid() {
        let id = DeviceId::from_hwid(" 0x12345678\n");
        assert_eq!(id.as_str(), "0x12345678");
        assert!(!id.is_temporary());
    }

    #[test]
    fn test_temporary_ids_are_unique() {
        let a = DeviceId::temporary();
        let b = DeviceId::temporary();
        assert!(a.is_temporary());
        assert_ne!(a, b);
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(endpoint().to_string(), "192.168.1.100:1337/udp");
    }

    #[test]
    fn test_new_device_has_no_firmware() {
        let device = Device::new(DeviceId::from_hwid("test-001"), "flow", endpoint());
        assert_eq!(device.endpoint, endpoint());
        assert!(device.firmware_version().is_none());
        assert_eq!(device.info, DeviceInfo::default());
    }

    #[test]
    fn test_json_skips_unknown_fields() {
        let device = Device::new(DeviceId::from_hwid("abc"), "flow", endpoint());
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["id"], "abc");
        assert_eq!(json["endpoint"]["transport"], "udp");
        assert!(json.get("firmware").is_none());
        assert!(json["info"].get("board").is_none());
    }
}
