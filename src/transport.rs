//! Best-effort UDP transport towards the statsd collector.
//!
//! One [`UdpTransport`] belongs to one configuration scope. Its socket is opened on first use,
//! shared by every worker of that scope afterwards, and never torn down while the scope lives.
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;

use parking_lot::RwLock;
use portable_atomic::{AtomicU64, Ordering};
use tracing::{debug, error, trace, warn};

use crate::common::TransportError;

/// Something that can put one datagram on the wire.
///
/// Implemented for [`UdpSocket`]; the seam exists so the short-write policy in [`deliver`] can
/// be exercised without a real network.
pub trait MetricSink {
    /// Writes `payload` as a single datagram, returning the number of bytes written.
    fn send(&self, payload: &[u8]) -> io::Result<usize>;
}

impl MetricSink for UdpSocket {
    fn send(&self, payload: &[u8]) -> io::Result<usize> {
        UdpSocket::send(self, payload)
    }
}

/// Result of a single send attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Delivery {
    /// The whole payload was written.
    Complete(usize),
    /// Fewer bytes than the payload length were written. Not retried.
    Partial { sent: usize, expected: usize },
    /// The write failed outright. Not retried.
    Failed,
}

impl Delivery {
    /// Number of bytes handed to the network.
    pub fn bytes_sent(&self) -> usize {
        match *self {
            Delivery::Complete(sent) | Delivery::Partial { sent, .. } => sent,
            Delivery::Failed => 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Delivery::Complete(_))
    }
}

/// Counters describing what the transport has done so far.
#[derive(Debug, Default)]
pub struct TransportTelemetry {
    sockets_opened: AtomicU64,
    connect_failures: AtomicU64,
    payloads_sent: AtomicU64,
    bytes_sent: AtomicU64,
    partial_writes: AtomicU64,
    failed_writes: AtomicU64,
}

/// Point-in-time copy of [`TransportTelemetry`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TelemetrySnapshot {
    pub sockets_opened: u64,
    pub connect_failures: u64,
    pub payloads_sent: u64,
    pub bytes_sent: u64,
    pub partial_writes: u64,
    pub failed_writes: u64,
}

impl TransportTelemetry {
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            sockets_opened: self.sockets_opened.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            payloads_sent: self.payloads_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            partial_writes: self.partial_writes.load(Ordering::Relaxed),
            failed_writes: self.failed_writes.load(Ordering::Relaxed),
        }
    }

    fn record(&self, delivery: &Delivery) {
        match *delivery {
            Delivery::Complete(sent) => {
                self.payloads_sent.fetch_add(1, Ordering::Relaxed);
                self.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
            }
            Delivery::Partial { sent, .. } => {
                self.partial_writes.fetch_add(1, Ordering::Relaxed);
                self.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
            }
            Delivery::Failed => {
                self.failed_writes.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Performs one write of `payload` on `sink`.
///
/// Short and failed writes are logged and reported through the returned [`Delivery`], never as
/// an error, and are never retried.
pub fn deliver<S>(sink: &S, payload: &[u8]) -> Delivery
where
    S: MetricSink + ?Sized,
{
    match sink.send(payload) {
        Ok(sent) if sent == payload.len() => Delivery::Complete(sent),
        Ok(sent) => {
            warn!(
                "statsd socket sent less bytes ({}) than it was asked ({})",
                sent,
                payload.len()
            );
            Delivery::Partial {
                sent,
                expected: payload.len(),
            }
        }
        Err(e) => {
            error!("error encountered while sending to statsd: {:?}", e);
            Delivery::Failed
        }
    }
}

/// Lazily connected UDP socket for one `host:port` destination.
#[derive(Debug)]
pub struct UdpTransport {
    host: String,
    port: u16,
    socket: RwLock<Option<Arc<UdpSocket>>>,
    telemetry: TransportTelemetry,
}

impl UdpTransport {
    pub fn new<H>(host: H, port: u16) -> Self
    where
        H: Into<String>,
    {
        UdpTransport {
            host: host.into(),
            port,
            socket: RwLock::new(None),
            telemetry: TransportTelemetry::default(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn telemetry(&self) -> &TransportTelemetry {
        &self.telemetry
    }

    pub fn is_connected(&self) -> bool {
        self.socket.read().is_some()
    }

    /// Returns the shared socket, opening it first if this is the first use.
    ///
    /// Opening happens under the write lock, so concurrent first callers end up sharing a
    /// single socket. A failure is not cached: the next call tries again.
    pub fn ensure_connected(&self) -> Result<Arc<UdpSocket>, TransportError> {
        if let Some(socket) = self.socket.read().as_ref() {
            return Ok(Arc::clone(socket));
        }

        let mut slot = self.socket.write();
        if let Some(socket) = slot.as_ref() {
            return Ok(Arc::clone(socket));
        }

        match connect(&self.host, self.port) {
            Ok(socket) => {
                self.telemetry.sockets_opened.fetch_add(1, Ordering::Relaxed);
                let socket = Arc::new(socket);
                *slot = Some(Arc::clone(&socket));
                Ok(socket)
            }
            Err(e) => {
                self.telemetry.connect_failures.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Sends `payload` as one datagram over `socket`, updating telemetry.
    pub fn send<S>(&self, socket: &S, payload: &str) -> Delivery
    where
        S: MetricSink + ?Sized,
    {
        trace!(payload, "sending to statsd");
        let delivery = deliver(socket, payload.as_bytes());
        self.telemetry.record(&delivery);
        delivery
    }
}

/// Picks the destination among resolved addresses: the first IPv4 one, or the first address
/// of any family when there is none.
///
/// statsd listens on IPv4 unless told otherwise, while resolvers commonly list `::1` first
/// for `localhost`.
fn select_address<I>(addrs: I) -> Option<SocketAddr>
where
    I: IntoIterator<Item = SocketAddr>,
{
    let mut fallback = None;
    for addr in addrs {
        if addr.is_ipv4() {
            return Some(addr);
        }
        fallback.get_or_insert(addr);
    }
    fallback
}

fn connect(host: &str, port: u16) -> Result<UdpSocket, TransportError> {
    let endpoint = format!("{}:{}", host, port);

    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            endpoint: endpoint.clone(),
            source,
        })?;
    let addr = select_address(addrs).ok_or_else(|| TransportError::NoAddress(endpoint.clone()))?;

    let local: SocketAddr = match addr {
        SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(local)?;
    socket.connect(addr)?;

    debug!(%endpoint, %addr, "opened statsd socket");
    Ok(socket)
}
