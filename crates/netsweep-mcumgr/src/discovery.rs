//! MCUmgr protocol handler for the discovery engine

use anyhow::Result;
use async_trait::async_trait;
use netsweep_core::Device;
use netsweep_discovery::{Connection, ProtocolDiscovery, ScanParams};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use tracing::info;

use crate::query::{query_device, query_result_to_device, DeviceQueryResult, QueryError};
use crate::transport::SmpTransport;

/// A device that answered SMP on `ip:port`
#[derive(Debug, Clone)]
pub struct McumgrProbeResult {
    pub ip: Ipv4Addr,
    pub port: u16,
    pub query: DeviceQueryResult,
}

/// Finds MCUmgr devices, skipping hosts that are already known
#[derive(Debug, Default)]
pub struct McumgrDiscovery {
    known_hosts: HashSet<Ipv4Addr>,
}

impl McumgrDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hosts that should not be probed again (e.g. already registered devices)
    pub fn with_known_hosts(hosts: impl IntoIterator<Item = Ipv4Addr>) -> Self {
        Self {
            known_hosts: hosts.into_iter().collect(),
        }
    }
}

#[async_trait]
impl ProtocolDiscovery for McumgrDiscovery {
    type ProbeResult = McumgrProbeResult;
    type Device = Device;

    fn probe_filter(&self, host: Ipv4Addr, ports: &[String]) -> Vec<String> {
        if self.known_hosts.contains(&host) {
            return Vec::new();
        }
        ports.to_vec()
    }

    async fn on_connection_dialed(
        &self,
        host: Ipv4Addr,
        port: &str,
        conn: &mut Connection,
        params: &ScanParams,
    ) -> Result<Vec<McumgrProbeResult>> {
        let socket = conn.as_udp().ok_or_else(|| {
            anyhow::anyhow!("MCUmgr needs a udp connection, got {}", conn.transport())
        })?;
        let port: u16 = port.parse()?;

        let mut transport = SmpTransport::new(socket, params.timeout());
        match query_device(&mut transport).await {
            Ok(query) => {
                info!(ip = %host, port, hwid = ?query.hwid, "Found MCUmgr device");
                Ok(vec![McumgrProbeResult {
                    ip: host,
                    port,
                    query,
                }])
            }
            Err(QueryError::NoResponse) => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn convert_probe_result(&self, result: McumgrProbeResult, _params: &ScanParams) -> Result<Device> {
        if result.query.hwid.as_deref().is_some_and(|h| h.trim().is_empty()) {
            anyhow::bail!("device at {}:{} reported an empty hardware ID", result.ip, result.port);
        }
        Ok(query_result_to_device(IpAddr::V4(result.ip), result.port, result.query))
    }
}
