//! Lock-free routing table shared by the refresher and request handlers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::types::Endpoint;

type Entries = HashMap<String, Endpoint>;

/// Outcome of [`RoutingTable::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated(Endpoint),
    Unchanged,
}

/// Name → endpoint map.
///
/// Readers load the current immutable snapshot through `ArcSwap` and never
/// wait on writers.  Writers publish a modified copy, so every entry moves
/// from one complete state to the next.  Two lookups of different names may
/// still straddle a reconciliation.
#[derive(Debug, Default)]
pub struct RoutingTable {
    entries: ArcSwap<Entries>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<Endpoint> {
        self.entries.load().get(name).copied()
    }

    /// Inserts or replaces the endpoint for `name`.
    ///
    /// An identical endpoint leaves the published snapshot untouched.
    pub fn upsert(&self, name: &str, endpoint: Endpoint) -> Upsert {
        if self.lookup(name) == Some(endpoint) {
            return Upsert::Unchanged;
        }

        let previous = self.entries.rcu(|current| {
            let mut next = Entries::clone(current);
            next.insert(name.to_string(), endpoint);
            next
        });

        match previous.get(name) {
            None => Upsert::Inserted,
            Some(old) if *old == endpoint => Upsert::Unchanged,
            Some(old) => Upsert::Updated(*old),
        }
    }

    /// Deletes every entry whose name is not in `current`, returning the
    /// removed entries.
    pub fn remove_if_absent(&self, current: &HashSet<String>) -> Vec<(String, Endpoint)> {
        let stale = self.stale_names(current);
        if stale.is_empty() {
            return Vec::new();
        }

        let previous = self.entries.rcu(|entries| {
            let mut next = Entries::clone(entries);
            for name in &stale {
                next.remove(name);
            }
            next
        });

        let mut removed: Vec<(String, Endpoint)> = stale
            .into_iter()
            .filter_map(|name| previous.get(&name).map(|ep| (name, *ep)))
            .collect();
        removed.sort_by(|a, b| a.0.cmp(&b.0));
        removed
    }

    fn stale_names(&self, current: &HashSet<String>) -> HashSet<String> {
        let present: HashSet<String> = self.entries.load().keys().cloned().collect();
        present.difference(current).cloned().collect()
    }

    /// All routable names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.snapshot().keys().cloned().collect();
        names.sort();
        names
    }

    /// The current snapshot.  It never changes after being returned.
    pub fn snapshot(&self) -> Arc<HashMap<String, Endpoint>> {
        self.entries.load_full()
    }

    pub fn len(&self) -> usize {
        self.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.load().is_empty()
    }
}
