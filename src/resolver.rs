//! Turns raw workload records into routable endpoints.

use std::net::IpAddr;

use crate::error::Rejection;
use crate::types::{Endpoint, WorkloadRecord};

/// Network label selected when none is configured.
pub const DEFAULT_NETWORK: &str = "bridge";

#[derive(Debug, Clone)]
pub struct TargetResolver {
    network: String,
}

impl Default for TargetResolver {
    fn default() -> Self {
        Self::new(DEFAULT_NETWORK)
    }
}

impl TargetResolver {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    /// Resolves one record to its routing name and endpoint.
    ///
    /// Checks run in order and the first failure is returned:
    /// exactly one non-empty name, an address on the configured network,
    /// then a non-zero port.  When several ports are declared the last
    /// one enumerated is used.
    pub fn resolve(&self, record: &WorkloadRecord) -> Result<(String, Endpoint), Rejection> {
        let name = match record.names.as_slice() {
            [only] => only.strip_prefix('/').unwrap_or(only.as_str()),
            names => return Err(Rejection::AmbiguousIdentity(names.to_vec())),
        };
        if name.is_empty() {
            return Err(Rejection::AmbiguousIdentity(record.names.clone()));
        }

        let raw_address = record
            .networks
            .get(&self.network)
            .map(String::as_str)
            .unwrap_or_default();
        if raw_address.is_empty() {
            return Err(Rejection::NoAddress {
                name: name.to_string(),
                network: self.network.clone(),
            });
        }
        let address: IpAddr = raw_address.parse().map_err(|_| Rejection::InvalidAddress {
            name: name.to_string(),
            address: raw_address.to_string(),
        })?;

        let port = record.ports.last().copied().unwrap_or(0);
        if port == 0 {
            return Err(Rejection::NoExposedPort {
                name: name.to_string(),
            });
        }

        Ok((name.to_string(), Endpoint::http(address, port)))
    }
}
