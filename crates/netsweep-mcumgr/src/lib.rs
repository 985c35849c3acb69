//! netsweep MCUmgr - MCUmgr device discovery
//!
//! Plugs MCUmgr (SMP over UDP) devices into the netsweep discovery engine:
//! every dialed address gets an SMP echo, and devices that answer are
//! queried for their hardware ID, OS info and firmware images.

pub mod discovery;
pub mod query;
pub mod transport;

pub use discovery::{McumgrDiscovery, McumgrProbeResult};
pub use query::{query_device, query_result_to_device, DeviceQueryResult, QueryError, MCUMGR_PORT};
pub use transport::{SmpHeader, SmpTransport};
