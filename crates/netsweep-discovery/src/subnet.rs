//! Subnet parsing and host address enumeration

use ipnetwork::{IpNetwork, Ipv4Network};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::SubnetError;

/// Parse a CIDR string into an IPv4 network
///
/// The prefix length is mandatory; a bare address is rejected.
pub fn parse_subnet(cidr: &str) -> Result<Ipv4Network, SubnetError> {
    let cidr = cidr.trim();
    if cidr.is_empty() {
        return Err(SubnetError::Empty);
    }
    if !cidr.contains('/') {
        return Err(SubnetError::Parse {
            cidr: cidr.to_string(),
            reason: "missing prefix length".to_string(),
        });
    }

    match cidr.parse::<IpNetwork>() {
        Ok(IpNetwork::V4(net)) => Ok(net),
        Ok(IpNetwork::V6(_)) => Err(SubnetError::NotIpv4(cidr.to_string())),
        Err(e) => Err(SubnetError::Parse {
            cidr: cidr.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Number of probes a subnet with this prefix length will generate
///
/// /0 and /1 are skipped entirely, /31 and /32 yield their base address,
/// everything else yields all hosts minus network and broadcast.
pub fn estimated_probes(prefix: u8) -> u64 {
    match prefix {
        0..=1 => 0,
        31.. => 1,
        p => (1u64 << (32 - u32::from(p))) - 2,
    }
}

/// Usable host addresses of `net`, ascending, as big-endian `u32`s
pub fn host_addresses(net: Ipv4Network) -> impl Iterator<Item = u32> {
    let prefix = net.prefix();
    let net_id = u32::from(net.network());
    let mask = u32::from(net.mask());

    let (start, end) = match prefix {
        0..=1 => (0u64, 0u64),
        31.. => (u64::from(net_id), u64::from(net_id) + 1),
        _ => {
            let broadcast = net_id ^ !mask;
            (u64::from(net_id) + 1, u64::from(broadcast))
        }
    };

    (start..end)
        .map(|ip| ip as u32)
        .filter(move |ip| prefix >= 31 || ip & mask == net_id & mask)
}

/// Feed every host address of `net` into the address queue
///
/// Stops early without error when `cancel` fires or every worker is gone.
pub async fn generate(net: Ipv4Network, cancel: &CancellationToken, tx: &mpsc::Sender<u32>) {
    let mut sent = 0u64;
    for ip in host_addresses(net) {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(subnet = %net, sent, "Address generation cancelled");
                return;
            }
            res = tx.send(ip) => {
                if res.is_err() {
                    debug!(subnet = %net, sent, "Address queue closed, stopping generation");
                    return;
                }
                sent += 1;
            }
        }
    }
    trace!(subnet = %net, sent, "Address generation finished");
}
