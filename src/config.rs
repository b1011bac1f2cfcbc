use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::proxy_server::Fallback;
use crate::resolver::DEFAULT_NETWORK;

pub const DEFAULT_PORT: u16 = 60600;

/// What to answer when a request's host has no route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    Index,
    NotFound,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub listen: SocketAddr,
    /// Appended to names on the discovery page, e.g. `.test.com`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_suffix: Option<String>,
    pub fallback: FallbackPolicy,
    /// Network label whose address is used for forwarding.
    pub network: String,
    pub refresh_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            domain_suffix: None,
            fallback: FallbackPolicy::Index,
            network: DEFAULT_NETWORK.into(),
            refresh_interval_secs: 5,
        }
    }
}

impl Config {
    /// Defaults, then `dockgate.toml`, `dockgate.json`, the bare
    /// `DOMAIN_SUFFIX` variable and finally `DOCKGATE_*` variables.
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("dockgate.toml"))
            .merge(Json::file("dockgate.json"))
            .merge(Env::raw().only(&["DOMAIN_SUFFIX"]))
            .merge(Env::prefixed("DOCKGATE_"))
    }

    pub fn load() -> Result<Self, ConfigError> {
        let config: Config = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(suffix) = &self.domain_suffix {
            if suffix.len() < 2 || !suffix.starts_with('.') {
                return Err(ConfigError::InvalidDomainSuffix(suffix.clone()));
            }
        }
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::ZeroRefreshInterval);
        }
        if self.network.is_empty() {
            return Err(ConfigError::EmptyNetwork);
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn fallback(&self) -> Fallback {
        match self.fallback {
            FallbackPolicy::Index => Fallback::Index {
                domain_suffix: self.domain_suffix.clone().unwrap_or_default(),
            },
            FallbackPolicy::NotFound => Fallback::NotFound,
        }
    }
}
