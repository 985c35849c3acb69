//! Discovery scanner: sizes the worker pool, fans subnets out to workers and
//! collects what they find

use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::error::SubnetError;
use crate::params::ScanParams;
use crate::protocol::ProtocolDiscovery;
use crate::subnet::{estimated_probes, generate, parse_subnet};
use crate::worker::{run_worker, WorkerContext};

/// Discovery event for progress reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// Workers are about to start
    ScanStarted { estimated_probes: u64, workers: usize },
    /// A host produced probe results
    HostResponded { ip: Ipv4Addr, results: usize },
    /// Every result has been aggregated
    ScanCompleted { found: usize },
}

/// Advisory duration bounds for a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanEstimate {
    pub probes: u64,
    pub workers: usize,
    /// Addresses each worker handles, rounded up
    pub rounds: u64,
    /// Every host times out on its first port
    pub min: Duration,
    /// Every host uses its full timeout budget. Zero when the budget is
    /// disabled (`max_timeouts_per_host = 0`); use `max` then.
    pub typical: Duration,
    /// Every port of every host times out
    pub max: Duration,
}

impl ScanEstimate {
    pub fn new(probes: u64, workers: usize, params: &ScanParams) -> Self {
        let rounds = if workers == 0 {
            0
        } else {
            probes.div_ceil(workers as u64)
        };
        let per_round = params
            .timeout()
            .saturating_mul(u32::try_from(rounds).unwrap_or(u32::MAX));
        let ports = params.ports.len();
        let budget = ports.min(params.max_timeouts_per_host);

        Self {
            probes,
            workers,
            rounds,
            min: per_round,
            typical: per_round.saturating_mul(u32::try_from(budget).unwrap_or(u32::MAX)),
            max: per_round.saturating_mul(u32::try_from(ports).unwrap_or(u32::MAX)),
        }
    }
}

/// Never start more workers than there are addresses to probe
pub fn pool_size(async_limit: usize, estimated_probes: u64) -> usize {
    usize::try_from(estimated_probes).map_or(async_limit, |probes| probes.min(async_limit))
}

/// Subnet discovery for one protocol
pub struct DiscoveryScanner<P: ProtocolDiscovery> {
    protocol: Arc<P>,
    params: Arc<ScanParams>,
    event_tx: broadcast::Sender<DiscoveryEvent>,
}

impl<P: ProtocolDiscovery> DiscoveryScanner<P> {
    pub fn new(protocol: Arc<P>, params: ScanParams) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            protocol,
            params: Arc::new(params),
            event_tx,
        }
    }

    pub fn params(&self) -> &ScanParams {
        &self.params
    }

    /// Subscribe to discovery events
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.event_tx.subscribe()
    }

    /// Run one discovery pass over every configured subnet
    ///
    /// Cancelling `cancel` stops new addresses from being generated or
    /// picked up; probes already running finish and their devices are
    /// still returned.
    pub async fn scan(&self, cancel: CancellationToken) -> Vec<P::Device> {
        let span = info_span!("discovery", transport = %self.params.transport);
        self.run(cancel).instrument(span).await
    }

    async fn run(&self, cancel: CancellationToken) -> Vec<P::Device> {
        let params = &self.params;
        if params.subnets.is_empty() {
            warn!("Discovery was called, but no subnets are configured");
            return Vec::new();
        }

        let (networks, estimated) = parse_subnets(&params.subnets);
        let workers = pool_size(params.async_limit, estimated);
        if workers == 0 {
            warn!(
                subnets = params.subnets.len(),
                async_limit = params.async_limit,
                "Nothing to scan"
            );
            return Vec::new();
        }

        let estimate = ScanEstimate::new(estimated, workers, params);
        debug!(
            estimated_probes = estimate.probes,
            async_limit = workers,
            timeout = ?params.timeout(),
            min = ?estimate.min,
            max = ?estimate.max,
            typical = ?estimate.typical,
            "Estimated scan duration"
        );
        let _ = self.event_tx.send(DiscoveryEvent::ScanStarted {
            estimated_probes: estimated,
            workers,
        });

        let (addr_tx, addr_rx) = mpsc::channel::<u32>(workers);
        let (result_tx, result_rx) = mpsc::unbounded_channel();

        // workers first, so they are waiting before the first address lands
        let ctx = WorkerContext {
            protocol: self.protocol.clone(),
            params: params.clone(),
            addresses: Arc::new(Mutex::new(addr_rx)),
            results: result_tx.clone(),
            events: self.event_tx.clone(),
            cancel: cancel.clone(),
        };
        let mut pool = JoinSet::new();
        for id in 0..workers {
            pool.spawn(run_worker(id, ctx.clone()));
        }
        drop(ctx);

        let supervisor = tokio::spawn(
            supervise(networks, addr_tx, pool, result_tx, cancel).in_current_span(),
        );

        let devices = collect_results(result_rx, self.protocol.as_ref(), params).await;
        if let Err(e) = supervisor.await {
            error!(error = %e, "Scan supervisor failed");
        }

        let _ = self.event_tx.send(DiscoveryEvent::ScanCompleted {
            found: devices.len(),
        });
        info!(found = devices.len(), "Discovery complete");
        devices
    }
}

/// Run one discovery pass; see [`DiscoveryScanner::scan`]
pub async fn auto_discover<P: ProtocolDiscovery>(
    cancel: CancellationToken,
    protocol: Arc<P>,
    params: ScanParams,
) -> Vec<P::Device> {
    DiscoveryScanner::new(protocol, params).scan(cancel).await
}

/// Parse the configured subnets, logging and dropping bad entries.
/// Returns the usable networks and their summed probe estimate.
fn parse_subnets(subnets: &[String]) -> (Vec<Ipv4Network>, u64) {
    let mut networks = Vec::with_capacity(subnets.len());
    let mut estimated = 0u64;

    for cidr in subnets {
        match parse_subnet(cidr) {
            Ok(net) => {
                estimated += estimated_probes(net.prefix());
                networks.push(net);
            }
            Err(SubnetError::Empty) => warn!("Empty CIDR provided, skipping"),
            Err(e) => error!(cidr = %cidr, error = %e, "Skipping subnet"),
        }
    }

    (networks, estimated)
}

/// Owns both queue closes: the address queue once every generator is done,
/// the result queue once every worker is done.
async fn supervise<T: Send + 'static>(
    networks: Vec<Ipv4Network>,
    addr_tx: mpsc::Sender<u32>,
    mut pool: JoinSet<usize>,
    result_tx: mpsc::UnboundedSender<T>,
    cancel: CancellationToken,
) {
    let mut generators = JoinSet::new();
    for net in networks {
        if cancel.is_cancelled() {
            debug!("Cancelled before every subnet was started");
            break;
        }
        let tx = addr_tx.clone();
        let cancel = cancel.clone();
        generators.spawn(
            async move { generate(net, &cancel, &tx).await }.in_current_span(),
        );
    }

    while let Some(res) = generators.join_next().await {
        if let Err(e) = res {
            error!(error = %e, "Address generator failed");
        }
    }
    drop(addr_tx);

    let mut busy = 0;
    while let Some(res) = pool.join_next().await {
        match res {
            Ok(handled) if handled > 0 => busy += 1,
            Ok(_) => {}
            Err(e) => error!(error = %e, "Probe worker failed"),
        }
    }
    debug!(busy_workers = busy, "Worker pool drained");
    drop(result_tx);
}

/// Drain result batches until every worker is gone and convert them to devices.
/// Ignores cancellation so finished probes are never thrown away.
async fn collect_results<P: ProtocolDiscovery>(
    mut results: mpsc::UnboundedReceiver<Vec<P::ProbeResult>>,
    protocol: &P,
    params: &ScanParams,
) -> Vec<P::Device> {
    let mut devices = Vec::new();
    while let Some(batch) = results.recv().await {
        for result in batch {
            match protocol.convert_probe_result(result, params) {
                Ok(device) => devices.push(device),
                Err(e) => warn!(error = %e, "Issue converting probe result to discovered device"),
            }
        }
    }
    devices
}
