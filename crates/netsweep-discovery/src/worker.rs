//! Address-queue consumers

use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::params::ScanParams;
use crate::probe::probe_host;
use crate::protocol::ProtocolDiscovery;
use crate::scanner::DiscoveryEvent;

/// Receiving half of the address queue, shared by every worker
pub(crate) type AddressQueue = Arc<Mutex<mpsc::Receiver<u32>>>;

/// Everything a worker needs; cloned once per pool slot
pub(crate) struct WorkerContext<P: ProtocolDiscovery> {
    pub protocol: Arc<P>,
    pub params: Arc<ScanParams>,
    pub addresses: AddressQueue,
    pub results: mpsc::UnboundedSender<Vec<P::ProbeResult>>,
    pub events: broadcast::Sender<DiscoveryEvent>,
    pub cancel: CancellationToken,
}

impl<P: ProtocolDiscovery> Clone for WorkerContext<P> {
    fn clone(&self) -> Self {
        Self {
            protocol: self.protocol.clone(),
            params: self.params.clone(),
            addresses: self.addresses.clone(),
            results: self.results.clone(),
            events: self.events.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

async fn next_address(addresses: &AddressQueue) -> Option<u32> {
    addresses.lock().await.recv().await
}

/// Pull addresses until the queue closes or the scan is cancelled.
/// Returns how many addresses this worker took off the queue.
pub(crate) async fn run_worker<P: ProtocolDiscovery>(id: usize, ctx: WorkerContext<P>) -> usize {
    let mut handled = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                debug!(worker = id, handled, "Worker cancelled");
                break;
            }
            next = next_address(&ctx.addresses) => next,
        };
        let Some(raw) = next else {
            break;
        };
        handled += 1;

        let host = Ipv4Addr::from(raw);
        let ports = ctx.protocol.probe_filter(host, &ctx.params.ports);
        if ports.is_empty() {
            trace!(worker = id, host = %host, "Probe filter skipped host");
            continue;
        }

        let probe = probe_host(host, &ports, ctx.protocol.as_ref(), &ctx.params).await;
        if let Some(abort) = &probe.abort {
            debug!(worker = id, error = %abort, "Abandoning host");
        }
        if probe.results.is_empty() {
            continue;
        }

        let _ = ctx.events.send(DiscoveryEvent::HostResponded {
            ip: host,
            results: probe.results.len(),
        });
        if ctx.results.send(probe.results).is_err() {
            debug!(worker = id, "Result queue closed, stopping worker");
            break;
        }
    }

    trace!(worker = id, handled, "Worker finished");
    handled
}
