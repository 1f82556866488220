//! Liveness probing for trunk endpoints.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace};
use uuid::Uuid;

use super::uri::{SipUri, Transport};
use crate::config::{HealthProbeConfig, ProbeKind};
use crate::telemetry::counters;

/// Probe result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Liveness {
    Online,
    /// Endpoint is unreachable with reason
    Offline(String),
}

impl Liveness {
    pub fn is_online(&self) -> bool {
        matches!(self, Liveness::Online)
    }
}

/// Reachability check for one SIP endpoint.
///
/// Implementations must bound their own running time.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn probe(&self, uri: &SipUri) -> Liveness;
}

/// Reports every endpoint as online.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

#[async_trait]
impl LivenessProbe for AlwaysOnline {
    async fn probe(&self, _uri: &SipUri) -> Liveness {
        Liveness::Online
    }
}

/// Sends a SIP OPTIONS request over UDP and waits for any final response.
///
/// TCP and TLS endpoints are checked with a plain TCP connect.
#[derive(Debug, Clone)]
pub struct SipOptionsProbe {
    timeout: Duration,
}

impl SipOptionsProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn probe_udp(&self, uri: &SipUri, target: SocketAddr, deadline: Instant) -> Result<u16, String> {
        let bind: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind).await.map_err(|e| e.to_string())?;
        socket.connect(target).await.map_err(|e| e.to_string())?;
        let local = socket.local_addr().map_err(|e| e.to_string())?;

        let call_id = Uuid::new_v4().simple().to_string();
        let request = options_request(uri, local, &call_id);
        socket.send(request.as_bytes()).await.map_err(|e| e.to_string())?;

        let mut buf = vec![0u8; 4096];
        loop {
            let len = match timeout_at(deadline, socket.recv(&mut buf)).await {
                Ok(Ok(len)) => len,
                Ok(Err(e)) => return Err(e.to_string()),
                Err(_) => return Err("timeout".to_string()),
            };
            let Ok(text) = std::str::from_utf8(&buf[..len]) else {
                continue;
            };
            if !text.contains(call_id.as_str()) {
                trace!(uri = %uri, "ignoring unrelated datagram");
                continue;
            }
            match parse_status(text) {
                Some(code) if code >= 200 => return Ok(code),
                Some(_) => continue,
                None => trace!(uri = %uri, "ignoring malformed response"),
            }
        }
    }
}

#[async_trait]
impl LivenessProbe for SipOptionsProbe {
    async fn probe(&self, uri: &SipUri) -> Liveness {
        let deadline = Instant::now() + self.timeout;
        let target = uri.socket_target();

        let addr = match timeout_at(deadline, lookup_host(target.as_str())).await {
            Ok(Ok(mut addrs)) => addrs.next(),
            Ok(Err(e)) => {
                debug!(uri = %uri, error = %e, "failed to resolve endpoint");
                None
            }
            Err(_) => None,
        };
        let Some(addr) = addr else {
            counters::trunk_probe(false);
            return Liveness::Offline(format!("cannot resolve {}", target));
        };

        let result = match uri.transport() {
            Transport::Udp => self.probe_udp(uri, addr, deadline).await,
            Transport::Tcp | Transport::Tls => match timeout_at(deadline, TcpStream::connect(addr)).await {
                Ok(Ok(_)) => Ok(0),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err("timeout".to_string()),
            },
        };

        match result {
            Ok(status) => {
                trace!(uri = %uri, status, "endpoint online");
                counters::trunk_probe(true);
                Liveness::Online
            }
            Err(reason) => {
                debug!(uri = %uri, reason = %reason, "endpoint offline");
                counters::trunk_probe(false);
                Liveness::Offline(reason)
            }
        }
    }
}

/// Probe selected by configuration.
pub fn probe_from_config(config: &HealthProbeConfig) -> Arc<dyn LivenessProbe> {
    match config.kind {
        ProbeKind::SipOptions => Arc::new(SipOptionsProbe::new(config.timeout)),
        ProbeKind::AlwaysOnline => Arc::new(AlwaysOnline),
    }
}

fn options_request(uri: &SipUri, local: SocketAddr, call_id: &str) -> String {
    let branch = Uuid::new_v4().simple().to_string();
    let tag = call_id.get(..8).unwrap_or(call_id);
    format!(
        "OPTIONS {uri} SIP/2.0\r\n\
         Via: SIP/2.0/UDP {local};branch=z9hG4bK{branch};rport\r\n\
         Max-Forwards: 70\r\n\
         From: <sip:siprouted@{host}>;tag={tag}\r\n\
         To: <{uri}>\r\n\
         Call-ID: {call_id}\r\n\
         CSeq: 1 OPTIONS\r\n\
         User-Agent: siprouted/{version}\r\n\
         Accept: application/sdp\r\n\
         Content-Length: 0\r\n\r\n",
        host = local.ip(),
        version = env!("CARGO_PKG_VERSION"),
    )
}

/// Status code of a `SIP/2.0 NNN reason` status line.
fn parse_status(response: &str) -> Option<u16> {
    let line = response.lines().next()?;
    let mut parts = line.split_whitespace();
    if parts.next()? != "SIP/2.0" {
        return None;
    }
    parts.next()?.parse().ok()
}
