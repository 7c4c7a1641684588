use crate::config::{ConfigError, parse_number};
use crate::environment::EnvSnapshot;
use std::fmt::{Display, Formatter};
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::str::FromStr;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 9090;
pub const DEFAULT_THREADS: usize = 4;
pub const DEFAULT_TRUSTED_PROXY: &str = "127.0.0.1";

/// Forwarded headers honored when the peer is a trusted proxy.
pub const TRUSTED_PROXY_HEADERS: [&str; 4] = [
    "x-forwarded-for",
    "x-forwarded-host",
    "x-forwarded-proto",
    "x-forwarded-port",
];

/// Listener and worker settings of the HTTP server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
    /// Number of runtime worker threads.
    pub threads: usize,
    pub trusted_proxy: TrustedProxy,
    pub trusted_proxy_headers: Vec<&'static str>,
}

impl ServerOptions {
    pub fn resolve(env: &EnvSnapshot) -> Result<ServerOptions, ConfigError> {
        let host = env.get_or("LD_HOST", DEFAULT_HOST).to_owned();
        let port = parse_number(env, "LD_PORT", DEFAULT_PORT)?;
        let threads = parse_number(env, "LD_THREADS", DEFAULT_THREADS)?;
        if threads == 0 {
            return Err(ConfigError::InvalidValue {
                key: "LD_THREADS",
                value: "0".to_owned(),
                reason: "at least one worker thread is required".to_owned(),
            });
        }

        let raw_proxy = env.get_or("WAITRESS_TRUSTED_PROXY", DEFAULT_TRUSTED_PROXY);
        let trusted_proxy =
            TrustedProxy::from_str(raw_proxy).map_err(|reason| ConfigError::InvalidValue {
                key: "WAITRESS_TRUSTED_PROXY",
                value: raw_proxy.to_owned(),
                reason,
            })?;

        Ok(ServerOptions {
            host,
            port,
            threads,
            trusted_proxy,
            trusted_proxy_headers: TRUSTED_PROXY_HEADERS.to_vec(),
        })
    }

    /// Resolves `host:port` into the address to bind.
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                anyhow::anyhow!("{}:{} did not resolve to any address", self.host, self.port)
            })
    }
}

/// The upstream allowed to set forwarded headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrustedProxy {
    /// `*`: every peer is trusted.
    Any,
    /// A single address (full prefix) or a CIDR network.
    Network { addr: IpAddr, prefix: u8 },
}

impl TrustedProxy {
    pub fn contains(&self, peer: IpAddr) -> bool {
        match *self {
            TrustedProxy::Any => true,
            TrustedProxy::Network { addr, prefix } => match (addr, peer.to_canonical()) {
                (IpAddr::V4(net), IpAddr::V4(peer)) => {
                    masked(u32::from(net) as u128, prefix, 32)
                        == masked(u32::from(peer) as u128, prefix, 32)
                }
                (IpAddr::V6(net), IpAddr::V6(peer)) => {
                    masked(u128::from(net), prefix, 128) == masked(u128::from(peer), prefix, 128)
                }
                _ => false,
            },
        }
    }
}

fn masked(value: u128, prefix: u8, width: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        value >> (width - prefix)
    }
}

impl FromStr for TrustedProxy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value == "*" {
            return Ok(TrustedProxy::Any);
        }

        let (addr, prefix) = match value.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (value, None),
        };

        let addr = IpAddr::from_str(addr).map_err(|err| format!("not an IP address: {}", err))?;
        let width = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(prefix) => prefix
                .parse::<u8>()
                .ok()
                .filter(|prefix| *prefix <= width)
                .ok_or_else(|| format!("prefix length must be between 0 and {}", width))?,
            None => width,
        };

        Ok(TrustedProxy::Network { addr, prefix })
    }
}

impl Display for TrustedProxy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TrustedProxy::Any => write!(f, "*"),
            TrustedProxy::Network { addr, prefix } => write!(f, "{}/{}", addr, prefix),
        }
    }
}
