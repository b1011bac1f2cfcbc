//! Periodic reconciliation of the routing table with the workload inventory.
//!
//! Each cycle lists, resolves and reconciles, then goes idle until the next
//! tick.  A failed list call skips the cycle and leaves the table serving the
//! last known good state; a rejected record only drops that record.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use log::{debug, error, info, warn};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::resolver::TargetResolver;
use crate::runtime::WorkloadLister;
use crate::table::{RoutingTable, Upsert};
use crate::types::{Endpoint, WorkloadRecord};

/// Changes applied by one completed cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: usize,
    pub rejected: usize,
}

impl ReconcileReport {
    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty())
    }
}

pub struct Refresher<L> {
    lister: L,
    table: Arc<RoutingTable>,
    resolver: TargetResolver,
    interval: Duration,
}

impl<L: WorkloadLister> Refresher<L> {
    pub fn new(
        lister: L,
        table: Arc<RoutingTable>,
        resolver: TargetResolver,
        interval: Duration,
    ) -> Self {
        Self {
            lister,
            table,
            resolver,
            interval,
        }
    }

    /// Runs cycles until `cancel` fires.
    ///
    /// The first cycle starts immediately.  Cancellation is only observed
    /// between cycles, so a running cycle always completes.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Refreshing routes from network {:?} every {:?}",
            self.resolver.network(),
            self.interval
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Refresh loop stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            match self.run_cycle().await {
                Ok(report) if report.has_changes() => info!(
                    "Routes refreshed: {} added, {} updated, {} removed, {} unchanged, {} skipped",
                    report.added.len(),
                    report.updated.len(),
                    report.removed.len(),
                    report.unchanged,
                    report.rejected
                ),
                Ok(_) if self.table.is_empty() => debug!("No routable workloads"),
                Ok(_) => debug!("Routes unchanged ({} entries)", self.table.len()),
                Err(e) => error!("Skipping refresh cycle: {:#}", e),
            }
        }
    }

    /// One list → resolve → reconcile pass.
    pub async fn run_cycle(&self) -> anyhow::Result<ReconcileReport> {
        let records = self
            .lister
            .list()
            .await
            .context("failed to fetch workload list")?;

        let (targets, rejected) = resolve_all(&self.resolver, &records);
        let mut report = reconcile(&self.table, targets);
        report.rejected = rejected;
        Ok(report)
    }
}

/// Resolves every record independently, returning the resolved targets and
/// the number of rejected records.
fn resolve_all(
    resolver: &TargetResolver,
    records: &[WorkloadRecord],
) -> (HashMap<String, Endpoint>, usize) {
    let mut targets = HashMap::with_capacity(records.len());
    let mut rejected = 0;

    for record in records {
        match resolver.resolve(record) {
            Ok((name, endpoint)) => {
                if let Some(previous) = targets.insert(name.clone(), endpoint) {
                    warn!(
                        "Duplicate workload name {}: {} replaces {}",
                        name, endpoint, previous
                    );
                }
            }
            Err(rejection) => {
                warn!("Skipping workload: {}", rejection);
                rejected += 1;
            }
        }
    }

    (targets, rejected)
}

/// Brings `table` in line with `targets`: drops names that are gone, then
/// upserts every resolved pair.
pub fn reconcile(table: &RoutingTable, targets: HashMap<String, Endpoint>) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    let current: HashSet<String> = targets.keys().cloned().collect();
    for (name, endpoint) in table.remove_if_absent(&current) {
        info!("Remove rule {}=>{}", name, endpoint);
        report.removed.push(name);
    }

    let mut targets: Vec<(String, Endpoint)> = targets.into_iter().collect();
    targets.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, endpoint) in targets {
        match table.upsert(&name, endpoint) {
            Upsert::Inserted => {
                info!("Update rule {}=>{}", name, endpoint);
                report.added.push(name);
            }
            Upsert::Updated(old) => {
                info!("Update rule {}=>{} (was {})", name, endpoint, old);
                report.updated.push(name);
            }
            Upsert::Unchanged => {
                debug!("Keep rule {}=>{}", name, endpoint);
                report.unchanged += 1;
            }
        }
    }

    report
}
