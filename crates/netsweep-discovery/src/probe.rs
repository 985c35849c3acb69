//! Per-host probing: dial each selected port and hand successes to the protocol

use netsweep_core::Transport;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{DialError, HostAbort};
use crate::params::ScanParams;
use crate::protocol::{Connection, ProtocolDiscovery};

/// What probing one host produced
#[derive(Debug)]
pub struct HostProbe<R> {
    /// Results from every port that answered, in probe order; empty when abandoned
    pub results: Vec<R>,
    /// Set when probing stopped before the last selected port
    pub abort: Option<HostAbort>,
}

impl<R> HostProbe<R> {
    /// An abandoned host reports nothing, even for ports that already answered
    fn abandoned(abort: HostAbort) -> Self {
        Self {
            results: Vec::new(),
            abort: Some(abort),
        }
    }
}

/// Dial `host:port` over `transport`, giving up after `limit`
pub async fn dial(
    host: Ipv4Addr,
    port: &str,
    transport: Transport,
    limit: Duration,
) -> Result<Connection, DialError> {
    let port: u16 = port
        .trim()
        .parse()
        .map_err(|_| DialError::InvalidPort(port.to_string()))?;
    let addr = SocketAddr::from((host, port));

    let attempt = async {
        match transport {
            Transport::Tcp => TcpStream::connect(addr).await.map(Connection::Tcp),
            Transport::Udp => {
                let socket = UdpSocket::bind("0.0.0.0:0").await?;
                socket.connect(addr).await?;
                Ok(Connection::Udp(socket))
            }
        }
    };

    match timeout(limit, attempt).await {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(e)) => Err(DialError::classify(addr, e)),
        Err(_) => Err(DialError::Timeout(addr)),
    }
}

/// Dial-timeout accounting for a single host. Other outcomes never clear it.
#[derive(Debug)]
struct TimeoutBudget {
    max: usize,
    timeouts: usize,
}

impl TimeoutBudget {
    fn new(max: usize) -> Self {
        Self { max, timeouts: 0 }
    }

    /// Count a timeout; true once the host has used up its budget
    fn record(&mut self) -> bool {
        self.timeouts += 1;
        self.max != 0 && self.timeouts >= self.max
    }
}

/// Probe `ports` on `host` in order using the configured transport and timeout
pub async fn probe_host<P: ProtocolDiscovery>(
    host: Ipv4Addr,
    ports: &[String],
    protocol: &P,
    params: &ScanParams,
) -> HostProbe<P::ProbeResult> {
    let transport = params.transport;
    let limit = params.timeout();
    probe_ports(host, ports, protocol, params, |port| async move {
        dial(host, &port, transport, limit).await
    })
    .await
}

async fn probe_ports<P, F, Fut>(
    host: Ipv4Addr,
    ports: &[String],
    protocol: &P,
    params: &ScanParams,
    mut dial_port: F,
) -> HostProbe<P::ProbeResult>
where
    P: ProtocolDiscovery,
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Connection, DialError>>,
{
    let mut results = Vec::new();
    let mut budget = TimeoutBudget::new(params.max_timeouts_per_host);

    for port in ports {
        let mut conn = match dial_port(port.clone()).await {
            Ok(conn) => conn,
            Err(DialError::Refused(_)) => continue,
            Err(DialError::Timeout(_)) => {
                if budget.record() {
                    return HostProbe::abandoned(HostAbort::TooManyTimeouts {
                        host,
                        timeouts: budget.timeouts,
                    });
                }
                continue;
            }
            Err(source @ DialError::HostUnreachable { .. }) => {
                return HostProbe::abandoned(HostAbort::Unreachable { host, source });
            }
            Err(e) => {
                debug!(host = %host, port = %port, error = %e, "Probe dial failed");
                continue;
            }
        };

        if params.transport.has_handshake() {
            info!(
                transport = %params.transport,
                host = %host,
                port = %port,
                "Connection dialed"
            );
        }

        match protocol.on_connection_dialed(host, port, &mut conn, params).await {
            Ok(found) => results.extend(found),
            Err(e) => debug!(host = %host, port = %port, error = %e, "Protocol handler failed"),
        }
        drop(conn);
    }

    HostProbe { results, abort: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    /// Reports every port it is handed as a result, except `fail_port`
    #[derive(Default)]
    struct EchoPort {
        calls: AtomicUsize,
        fail_port: Option<String>,
    }

    #[async_trait]
    impl ProtocolDiscovery for EchoPort {
        type ProbeResult = String;
        type Device = String;

        fn probe_filter(&self, _host: Ipv4Addr, ports: &[String]) -> Vec<String> {
            ports.to_vec()
        }

        async fn on_connection_dialed(
            &self,
            _host: Ipv4Addr,
            port: &str,
            _conn: &mut Connection,
            _params: &ScanParams,
        ) -> anyhow::Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_port.as_deref() == Some(port) {
                anyhow::bail!("handler rejected port {}", port);
            }
            Ok(vec![port.to_string()])
        }

        fn convert_probe_result(&self, result: String, _params: &ScanParams) -> anyhow::Result<String> {
            Ok(result)
        }
    }

    enum Scripted {
        /// A real connected UDP socket, so the handler runs
        Open,
        Timeout,
        Refused,
        Unreachable,
        Other,
    }

    fn host() -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 1, 20)
    }

    fn ports(n: usize) -> Vec<String> {
        (1..=n).map(|p| p.to_string()).collect()
    }

    fn params(max_timeouts: usize) -> ScanParams {
        ScanParams {
            max_timeouts_per_host: max_timeouts,
            ..ScanParams::default()
        }
    }

    /// Run `probe_ports` against a scripted sequence of dial outcomes,
    /// returning the probe outcome and the number of dials attempted.
    async fn run_scripted(
        script: Vec<Scripted>,
        port_count: usize,
        max_timeouts: usize,
    ) -> (HostProbe<String>, usize) {
        let script = Arc::new(Mutex::new(VecDeque::from(script)));
        let dials = Arc::new(AtomicUsize::new(0));
        let protocol = EchoPort::default();
        let addr: SocketAddr = "192.168.1.20:1".parse().unwrap();

        let probe = probe_ports(host(), &ports(port_count), &protocol, &params(max_timeouts), |_port| {
            let script = script.clone();
            let dials = dials.clone();
            async move {
                dials.fetch_add(1, Ordering::SeqCst);
                let next = script.lock().unwrap().pop_front().unwrap_or(Scripted::Refused);
                Err(match next {
                    Scripted::Open => {
                        return dial(Ipv4Addr::LOCALHOST, "9", Transport::Udp, Duration::from_secs(1)).await;
                    }
                    Scripted::Timeout => DialError::Timeout(addr),
                    Scripted::Refused => DialError::Refused(addr),
                    Scripted::Unreachable => DialError::HostUnreachable {
                        addr,
                        source: io::Error::from(io::ErrorKind::HostUnreachable),
                    },
                    Scripted::Other => DialError::Io {
                        addr,
                        source: io::Error::from(io::ErrorKind::PermissionDenied),
                    },
                })
            }
        })
        .await;

        (probe, dials.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_timeout_budget_abandons_host() {
        let script = (0..6).map(|_| Scripted::Timeout).collect();
        let (probe, dials) = run_scripted(script, 6, 2).await;
        assert_eq!(dials, 2);
        assert!(matches!(
            probe.abort,
            Some(HostAbort::TooManyTimeouts { timeouts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_refusals_do_not_clear_timeouts() {
        let script = vec![Scripted::Timeout, Scripted::Refused, Scripted::Timeout, Scripted::Refused];
        let (probe, dials) = run_scripted(script, 4, 2).await;
        assert_eq!(dials, 3);
        assert!(matches!(
            probe.abort,
            Some(HostAbort::TooManyTimeouts { timeouts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_generic_errors_do_not_clear_timeouts() {
        let script = vec![Scripted::Timeout, Scripted::Other, Scripted::Other, Scripted::Timeout];
        let (probe, dials) = run_scripted(script, 6, 2).await;
        assert_eq!(dials, 4);
        assert!(matches!(probe.abort, Some(HostAbort::TooManyTimeouts { .. })));
    }

    #[tokio::test]
    async fn test_abandoned_host_drops_earlier_results() {
        let script = vec![Scripted::Open, Scripted::Timeout];
        let (probe, dials) = run_scripted(script, 3, 1).await;
        assert_eq!(dials, 2);
        assert!(probe.results.is_empty());
        assert!(matches!(probe.abort, Some(HostAbort::TooManyTimeouts { .. })));
    }

    #[tokio::test]
    async fn test_unreachable_drops_earlier_results() {
        let script = vec![Scripted::Open, Scripted::Unreachable];
        let (probe, _) = run_scripted(script, 3, 0).await;
        assert!(probe.results.is_empty());
        assert!(matches!(probe.abort, Some(HostAbort::Unreachable { .. })));
    }

    #[tokio::test]
    async fn test_completed_host_keeps_results() {
        let script = vec![Scripted::Timeout, Scripted::Open, Scripted::Refused];
        let (probe, dials) = run_scripted(script, 3, 2).await;
        assert_eq!(dials, 3);
        assert_eq!(probe.results, vec!["2".to_string()]);
        assert!(probe.abort.is_none());
    }

    #[tokio::test]
    async fn test_zero_budget_never_abandons() {
        let script = (0..5).map(|_| Scripted::Timeout).collect();
        let (probe, dials) = run_scripted(script, 5, 0).await;
        assert_eq!(dials, 5);
        assert!(probe.abort.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_stops_immediately() {
        let script = vec![Scripted::Refused, Scripted::Unreachable];
        let (probe, dials) = run_scripted(script, 5, 3).await;
        assert_eq!(dials, 2);
        assert!(matches!(probe.abort, Some(HostAbort::Unreachable { .. })));
        assert!(probe.results.is_empty());
    }

    #[tokio::test]
    async fn test_generic_errors_continue() {
        let script = vec![Scripted::Other, Scripted::Other, Scripted::Other];
        let (probe, dials) = run_scripted(script, 3, 1).await;
        assert_eq!(dials, 3);
        assert!(probe.abort.is_none());
    }

    #[tokio::test]
    async fn test_dial_rejects_symbolic_port() {
        let err = dial(Ipv4Addr::LOCALHOST, "http", Transport::Tcp, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, DialError::InvalidPort(_)));
    }

    #[tokio::test]
    async fn test_dial_refused_on_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = dial(Ipv4Addr::LOCALHOST, &port.to_string(), Transport::Tcp, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DialError::Refused(_)));
    }

    #[tokio::test]
    async fn test_probe_host_collects_open_ports() {
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let second = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let first_port = first.local_addr().unwrap().port().to_string();
        let second_port = second.local_addr().unwrap().port().to_string();
        let closed = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port().to_string()
        };
        let protocol = EchoPort {
            fail_port: Some(first_port.clone()),
            ..EchoPort::default()
        };
        let params = ScanParams {
            timeout_ms: 1000,
            ..ScanParams::default()
        };

        let probe = probe_host(
            Ipv4Addr::LOCALHOST,
            &[closed, first_port, second_port.clone()],
            &protocol,
            &params,
        )
        .await;

        // the handler error on the first open port does not stop the second
        assert_eq!(protocol.calls.load(Ordering::SeqCst), 2);
        assert_eq!(probe.results, vec![second_port]);
        assert!(probe.abort.is_none());
    }

    #[tokio::test]
    async fn test_udp_dial_hands_connected_socket() {
        let conn = dial(Ipv4Addr::LOCALHOST, "9", Transport::Udp, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(conn.transport(), Transport::Udp);
        assert_eq!(conn.peer_addr().unwrap().port(), 9);
    }
}
