use super::WorkloadLister;
use crate::types::WorkloadRecord;
use anyhow::Result;
use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::models::{ContainerSummary, EndpointSettings};
use bollard::Docker;
use log::debug;
use std::collections::HashMap;

/// Lists running containers from the local Docker daemon.
#[derive(Debug, Default)]
pub struct DockerLister;

impl DockerLister {
    pub fn new() -> Self {
        Self
    }

    fn connect() -> Result<Docker> {
        // Unix socket on Linux, honouring DOCKER_HOST.  No I/O happens here,
        // so connecting per cycle lets a restarted daemon be picked up.
        Docker::connect_with_local_defaults().map_err(Into::into)
    }
}

#[async_trait]
impl WorkloadLister for DockerLister {
    async fn list(&self) -> Result<Vec<WorkloadRecord>> {
        let docker = Self::connect()?;
        let opts = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };
        let containers = docker.list_containers(Some(opts)).await?;
        debug!("Docker reported {} running containers", containers.len());

        Ok(containers.into_iter().map(to_record).collect())
    }
}

fn to_record(container: ContainerSummary) -> WorkloadRecord {
    let networks: HashMap<String, String> = container
        .network_settings
        .and_then(|s| s.networks)
        .unwrap_or_default()
        .into_iter()
        .map(|(label, settings)| (label, address_of(&settings)))
        .collect();

    WorkloadRecord {
        names: container.names.unwrap_or_default(),
        networks,
        ports: container
            .ports
            .unwrap_or_default()
            .iter()
            .map(|p| p.private_port)
            .collect(),
    }
}

fn address_of(settings: &EndpointSettings) -> String {
    if let Some(ipv4) = &settings.ip_address {
        if !ipv4.is_empty() {
            return ipv4.clone();
        }
    }
    if let Some(ipv6) = &settings.global_ipv6_address {
        if !ipv6.is_empty() {
            return ipv6.clone();
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{ContainerSummaryNetworkSettings, Port};

    fn summary(
        names: &[&str],
        networks: Vec<(&str, EndpointSettings)>,
        ports: &[u16],
    ) -> ContainerSummary {
        ContainerSummary {
            names: Some(names.iter().map(|s| s.to_string()).collect()),
            network_settings: Some(ContainerSummaryNetworkSettings {
                networks: Some(
                    networks
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v))
                        .collect(),
                ),
                ..Default::default()
            }),
            ports: Some(
                ports
                    .iter()
                    .map(|p| Port {
                        private_port: *p,
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }
    }

    fn ipv4(addr: &str) -> EndpointSettings {
        EndpointSettings {
            ip_address: Some(addr.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_to_record_keeps_raw_names_and_port_order() {
        let record = to_record(summary(
            &["/web"],
            vec![("bridge", ipv4("172.17.0.2")), ("other", ipv4("10.0.0.2"))],
            &[80, 8080],
        ));

        assert_eq!(record.names, vec!["/web"]);
        assert_eq!(record.networks.get("bridge").map(String::as_str), Some("172.17.0.2"));
        assert_eq!(record.networks.get("other").map(String::as_str), Some("10.0.0.2"));
        assert_eq!(record.ports, vec![80, 8080]);
    }

    #[test]
    fn test_to_record_falls_back_to_ipv6() {
        let settings = EndpointSettings {
            ip_address: Some(String::new()),
            global_ipv6_address: Some("fd00::2".to_string()),
            ..Default::default()
        };
        let record = to_record(summary(&["/web"], vec![("bridge", settings)], &[80]));
        assert_eq!(record.networks.get("bridge").map(String::as_str), Some("fd00::2"));
    }

    #[test]
    fn test_to_record_missing_fields() {
        let record = to_record(ContainerSummary::default());
        assert!(record.names.is_empty());
        assert!(record.networks.is_empty());
        assert!(record.ports.is_empty());

        let record = to_record(summary(
            &["/web"],
            vec![("bridge", EndpointSettings::default())],
            &[],
        ));
        assert_eq!(record.networks.get("bridge").map(String::as_str), Some(""));
    }
}
