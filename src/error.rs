//! Typed errors for configuration and target resolution.
//!
//! Discovery failures cross the [`WorkloadLister`](crate::runtime::WorkloadLister)
//! boundary as `anyhow::Error`; everything the daemon needs to match on
//! lives here.

use thiserror::Error;

/// Fatal startup errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),
    #[error("domain suffix should look like .test.com, got {0:?}")]
    InvalidDomainSuffix(String),
    #[error("refresh interval must be at least one second")]
    ZeroRefreshInterval,
    #[error("network label must not be empty")]
    EmptyNetwork,
}

/// Why a workload record could not be turned into an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("ambiguous identity: expected exactly one name, got {0:?}")]
    AmbiguousIdentity(Vec<String>),
    #[error("no address on network {network} for {name}")]
    NoAddress { name: String, network: String },
    #[error("address {address:?} of {name} is not an IP address")]
    InvalidAddress { name: String, address: String },
    #[error("no exposed port for {name}")]
    NoExposedPort { name: String },
}
