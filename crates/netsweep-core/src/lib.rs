//! netsweep Core - Shared types for subnet discovery
//!
//! This crate provides the types shared by the discovery engine, the
//! protocol handlers and the daemon:
//! - Transport selection for probe dials
//! - Device records produced by protocol handlers

pub mod device;
pub mod transport;

pub use device::{Device, DeviceId, DeviceInfo, Endpoint, FirmwareImage};
pub use transport::{ParseTransportError, Transport};
