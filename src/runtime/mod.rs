use crate::types::WorkloadRecord;
use anyhow::Result;
use async_trait::async_trait;

pub mod docker;
pub use docker::DockerLister;

#[async_trait]
pub trait WorkloadLister: Send + Sync {
    /// Returns the current inventory of running workloads.
    /// A failure means the whole inventory is unknown for this cycle.
    async fn list(&self) -> Result<Vec<WorkloadRecord>>;
}
