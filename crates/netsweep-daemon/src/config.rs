//! Configuration loading

use anyhow::Result;
use netsweep_core::Transport;
use netsweep_discovery::ScanParams;
use netsweep_mcumgr::MCUMGR_PORT;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub mcumgr: McumgrConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Subnets to scan in CIDR notation
    #[serde(default)]
    pub subnets: Vec<String>,
    /// Per-connection timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum concurrent probe workers
    #[serde(default = "default_async_limit")]
    pub async_limit: usize,
    /// Dial timeouts before a host is abandoned (0 disables)
    #[serde(default = "default_max_timeouts")]
    pub max_timeouts_per_host: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            subnets: Vec::new(),
            timeout_ms: default_timeout_ms(),
            async_limit: default_async_limit(),
            max_timeouts_per_host: default_max_timeouts(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    ScanParams::default().timeout_ms
}

fn default_async_limit() -> usize {
    ScanParams::default().async_limit
}

fn default_max_timeouts() -> usize {
    ScanParams::default().max_timeouts_per_host
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McumgrConfig {
    /// Ports probed on every host
    #[serde(default = "default_mcumgr_ports")]
    pub ports: Vec<String>,
    #[serde(default = "default_mcumgr_transport")]
    pub transport: Transport,
    /// Addresses of devices that are already known and should be skipped
    #[serde(default)]
    pub known_hosts: Vec<Ipv4Addr>,
}

impl Default for McumgrConfig {
    fn default() -> Self {
        Self {
            ports: default_mcumgr_ports(),
            transport: default_mcumgr_transport(),
            known_hosts: Vec::new(),
        }
    }
}

fn default_mcumgr_ports() -> Vec<String> {
    vec![MCUMGR_PORT.to_string()]
}

fn default_mcumgr_transport() -> Transport {
    Transport::Udp
}

impl Config {
    /// Convert to ScanParams
    pub fn to_scan_params(&self) -> ScanParams {
        ScanParams {
            subnets: self.discovery.subnets.clone(),
            ports: self.mcumgr.ports.clone(),
            timeout_ms: self.discovery.timeout_ms,
            async_limit: self.discovery.async_limit,
            max_timeouts_per_host: self.discovery.max_timeouts_per_host,
            transport: self.mcumgr.transport,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let config = Config {
        discovery: DiscoveryConfig {
            subnets: vec!["192.168.1.0/24".to_string()],
            ..DiscoveryConfig::default()
        },
        mcumgr: McumgrConfig::default(),
    };

    let content = toml::to_string_pretty(&config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        let params = config.to_scan_params();
        assert!(params.subnets.is_empty());
        assert_eq!(params.ports, vec!["1337".to_string()]);
        assert_eq!(params.transport, Transport::Udp);
        assert_eq!(params.timeout_ms, 2000);
        assert_eq!(params.async_limit, 512);
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            [discovery]
            subnets = ["10.0.0.0/24", "10.0.1.0/30"]
            timeout_ms = 250
            async_limit = 64
            max_timeouts_per_host = 0

            [mcumgr]
            ports = ["1337", "1338"]
            known_hosts = ["10.0.0.7"]
            "#,
        )
        .unwrap();

        assert_eq!(config.mcumgr.known_hosts, vec![Ipv4Addr::new(10, 0, 0, 7)]);
        let params = config.to_scan_params();
        assert_eq!(params.subnets.len(), 2);
        assert_eq!(params.ports, vec!["1337".to_string(), "1338".to_string()]);
        assert_eq!(params.timeout_ms, 250);
        assert_eq!(params.async_limit, 64);
        assert_eq!(params.max_timeouts_per_host, 0);
        assert_eq!(params.transport, Transport::Udp);
    }

    #[test]
    fn test_default_config_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("netsweep.toml");

        save_default_config(&path).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.discovery.subnets, vec!["192.168.1.0/24".to_string()]);
        assert_eq!(config.mcumgr.ports, vec!["1337".to_string()]);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.toml")).unwrap();
        assert!(config.discovery.subnets.is_empty());
    }
}
