//! netsweep Discovery - Subnet discovery engine
//!
//! Expands IPv4 subnets into host addresses, probes each host on a set of
//! ports with a bounded pool of workers, and hands every successful
//! connection to a pluggable protocol handler:
//! - `subnet`: CIDR parsing, probe estimates and host enumeration
//! - `probe`: per-host dialing and failure classification
//! - `worker`: the address-queue consumers
//! - `scanner`: orchestration and result aggregation

pub mod error;
pub mod params;
pub mod probe;
pub mod protocol;
pub mod scanner;
pub mod subnet;
mod worker;

pub use error::{DialError, HostAbort, SubnetError};
pub use params::ScanParams;
pub use protocol::{Connection, ProtocolDiscovery};
pub use scanner::{auto_discover, DiscoveryEvent, DiscoveryScanner, ScanEstimate};

pub use netsweep_core::Transport;
pub use tokio_util::sync::CancellationToken;
