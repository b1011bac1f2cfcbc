//! Data structures shared by the refresh loop and the request path.
//!
//! A [`WorkloadRecord`] is the raw shape handed over by a container
//! runtime for a single refresh cycle.  An [`Endpoint`] is what the
//! routing table stores once a record has been resolved: a fixed
//! forwarding scheme, an IP address and a non-zero port.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// One running workload as reported by the container runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadRecord {
    /// Every name the runtime knows the workload by, as reported
    /// (Docker prefixes them with `/`).
    pub names: Vec<String>,
    /// Network label → assigned address.  An empty string means the
    /// runtime attached the network but reported no address.
    pub networks: HashMap<String, String>,
    /// Declared private ports in enumeration order.
    pub ports: Vec<u16>,
}

/// Forwarding protocol of an [`Endpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved forwarding target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    scheme: Scheme,
    address: IpAddr,
    port: u16,
}

impl Endpoint {
    pub fn http(address: IpAddr, port: u16) -> Self {
        Self {
            scheme: Scheme::Http,
            address,
            port,
        }
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// `host:port` form used for the request URI and the `Host` header.
    pub fn authority(&self) -> String {
        self.socket_addr().to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.socket_addr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_display_v4() {
        let ep = Endpoint::http("172.17.0.2".parse().unwrap(), 8080);
        assert_eq!(ep.to_string(), "http://172.17.0.2:8080");
        assert_eq!(ep.authority(), "172.17.0.2:8080");
        assert_eq!(ep.scheme(), Scheme::Http);
    }

    #[test]
    fn test_endpoint_display_v6_is_bracketed() {
        let ep = Endpoint::http("fd00::2".parse().unwrap(), 80);
        assert_eq!(ep.to_string(), "http://[fd00::2]:80");
        assert_eq!(ep.authority(), "[fd00::2]:80");
    }
}
