//! Parameters for a single discovery run

use netsweep_core::Transport;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scan configuration, read-only for the duration of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanParams {
    /// Subnets to scan in CIDR notation (e.g., "192.168.1.0/24")
    #[serde(default)]
    pub subnets: Vec<String>,
    /// Ports to probe on every host, in probe order
    #[serde(default)]
    pub ports: Vec<String>,
    /// Timeout for each connection attempt in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum number of concurrent probe workers
    #[serde(default = "default_async_limit")]
    pub async_limit: usize,
    /// Dial timeouts after which a host is abandoned (0 disables)
    #[serde(default = "default_max_timeouts")]
    pub max_timeouts_per_host: usize,
    #[serde(default)]
    pub transport: Transport,
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_async_limit() -> usize {
    512
}

fn default_max_timeouts() -> usize {
    2
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            subnets: Vec::new(),
            ports: Vec::new(),
            timeout_ms: default_timeout_ms(),
            async_limit: default_async_limit(),
            max_timeouts_per_host: default_max_timeouts(),
            transport: Transport::default(),
        }
    }
}

impl ScanParams {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
