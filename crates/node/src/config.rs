//! Node configuration.
//!
//! [`NodeConfig`] is what `Node::start` consumes. The security and
//! transport parts are opaque quinn values but must be present; the listen
//! address must be a syntactically valid `host:port` with a non-zero port.

use crate::tls::SecurityConfig;
use corelib::classify::{ACCEPT_BACKOFF, STREAM_BACKOFF};
use corelib::{Error, FrameLimits, Result};
use quinn::{IdleTimeout, TransportConfig};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

/// Timeouts, backoffs and frame caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Bound on establishing an outbound connection.
    pub dial_timeout: Duration,
    /// Bound on opening an outbound stream.
    pub stream_timeout: Duration,
    /// Pause after a transient accept failure.
    pub accept_backoff: Duration,
    /// Pause after a transient stream-accept failure.
    pub stream_backoff: Duration,
    pub frame: FrameLimits,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(10),
            stream_timeout: Duration::from_secs(5),
            accept_backoff: ACCEPT_BACKOFF,
            stream_backoff: STREAM_BACKOFF,
            frame: FrameLimits::default(),
        }
    }
}

/// Everything needed to start a listening node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// `host:port` to bind. An empty host binds every interface.
    pub listen_addr: String,
    pub security: Option<SecurityConfig>,
    pub transport: Option<Arc<TransportConfig>>,
    pub limits: Limits,
}

impl NodeConfig {
    pub fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            security: None,
            transport: None,
            limits: Limits::default(),
        }
    }

    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = Some(security);
        self
    }

    pub fn with_transport(mut self, transport: Arc<TransportConfig>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Check the configuration and resolve the bind address.
    ///
    /// # Errors
    /// [`Error::Config`] for a malformed address, a port outside
    /// `1..=65535`, an unresolvable host, or missing security/transport
    /// configuration.
    pub fn validate(&self) -> Result<SocketAddr> {
        self.validated().map(|valid| valid.addr)
    }

    pub(crate) fn validated(&self) -> Result<Validated<'_>> {
        let addr = resolve_listen_addr(&self.listen_addr)?;
        let security = self
            .security
            .as_ref()
            .ok_or_else(|| Error::Config("security configuration is required".into()))?;
        let transport = self
            .transport
            .clone()
            .ok_or_else(|| Error::Config("transport configuration is required".into()))?;
        Ok(Validated {
            addr,
            security,
            transport,
        })
    }
}

pub(crate) struct Validated<'a> {
    pub addr: SocketAddr,
    pub security: &'a SecurityConfig,
    pub transport: Arc<TransportConfig>,
}

/// Transport settings suitable for long-lived pooled connections.
///
/// Keep-alives hold idle pooled connections open; a peer that disappears is
/// detected by the idle timeout and evicted from the pool.
pub fn default_transport() -> Arc<TransportConfig> {
    let mut transport = TransportConfig::default();
    transport
        .max_idle_timeout(IdleTimeout::try_from(Duration::from_secs(30)).ok())
        .keep_alive_interval(Some(Duration::from_secs(10)));
    Arc::new(transport)
}

/// Split `host:port`, rejecting a missing, non-numeric, or zero port.
///
/// IPv6 hosts must be bracketed. The host may be empty.
pub fn split_host_port(addr: &str) -> Result<(&str, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| Error::Config(format!("address {addr:?} is missing a port")))?;

    let host = match host.strip_prefix('[') {
        Some(inner) => inner
            .strip_suffix(']')
            .ok_or_else(|| Error::Config(format!("address {addr:?} has an unclosed bracket")))?,
        None if host.contains(':') => {
            return Err(Error::Config(format!("address {addr:?} has too many colons")));
        }
        None => host,
    };

    match port.parse::<u16>() {
        Ok(port) if port > 0 => Ok((host, port)),
        _ => Err(Error::Config(format!("invalid port {port:?}"))),
    }
}

/// Resolve a validated listen address. Hostnames resolve to their first address.
pub fn resolve_listen_addr(addr: &str) -> Result<SocketAddr> {
    let (host, port) = split_host_port(addr)?;
    if host.is_empty() {
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    (host, port)
        .to_socket_addrs()
        .map_err(|err| Error::Config(format!("cannot resolve {host:?}: {err}")))?
        .next()
        .ok_or_else(|| Error::Config(format!("{host:?} resolved to no addresses")))
}
