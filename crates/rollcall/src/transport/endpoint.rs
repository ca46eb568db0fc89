// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Endpoint locators (`tcp://host:port`).

use super::TransportError;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

const TCP_SCHEME: &str = "tcp://";

/// Address of a poll or publish endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Same host, different port (used to report the port a `:0` bind got).
    pub fn with_port(&self, port: u16) -> Self {
        Self {
            host: self.host.clone(),
            port,
        }
    }

    /// `host:port`, as accepted by tokio's bind and connect.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| TransportError::InvalidEndpoint {
            endpoint: s.to_string(),
            reason: reason.to_string(),
        };

        let rest = s
            .strip_prefix(TCP_SCHEME)
            .ok_or_else(|| invalid("only tcp:// endpoints are supported"))?;

        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing port"))?;

        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        let port = port.parse::<u16>().map_err(|_| invalid("invalid port"))?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", TCP_SCHEME, self.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4() {
        let ep: Endpoint = "tcp://127.0.0.1:40001".parse().unwrap();
        assert_eq!(ep.host(), "127.0.0.1");
        assert_eq!(ep.port(), 40001);
        assert_eq!(ep.address(), "127.0.0.1:40001");
        assert_eq!(ep.to_string(), "tcp://127.0.0.1:40001");
    }

    #[test]
    fn test_parse_hostname_and_port_zero() {
        let ep: Endpoint = "tcp://localhost:0".parse().unwrap();
        assert_eq!(ep.host(), "localhost");
        assert_eq!(ep.port(), 0);
    }

    #[test]
    fn test_parse_ipv6() {
        let ep: Endpoint = "tcp://[::1]:5000".parse().unwrap();
        assert_eq!(ep.host(), "::1");
        assert_eq!(ep.address(), "[::1]:5000");
    }

    #[test]
    fn test_missing_port() {
        let err = "tcp://xxx".parse::<Endpoint>().unwrap_err();
        assert!(err.to_string().contains("missing port"));
    }

    #[test]
    fn test_invalid_inputs() {
        for bad in ["ipc:///tmp/x", "127.0.0.1:40001", "tcp://:40001", "tcp://host:port", "tcp://host:70000"] {
            assert!(bad.parse::<Endpoint>().is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_from_socket_addr() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(Endpoint::from(addr).to_string(), "tcp://127.0.0.1:9000");
    }
}
