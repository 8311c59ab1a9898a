use std::collections::{HashMap, HashSet};

use super::connection::ConnId;

/// Mirrored host <-> watcher adjacency sets.
///
/// Both directions are always mutated together, so the invariant
/// "edge (h, w) exists in listeners_of(h) iff it exists in watching(w)"
/// cannot drift. Empty sets are pruned so `watching.contains_key` doubles
/// as "is this connection inside any room".
#[derive(Debug, Default)]
pub struct ListenerGraph {
    listeners_of: HashMap<ConnId, HashSet<ConnId>>,
    watching: HashMap<ConnId, HashSet<ConnId>>,
}

impl ListenerGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the edge (host, watcher). Returns false if it already existed.
    pub fn watch(&mut self, host: &ConnId, watcher: &ConnId) -> bool {
        let added = self
            .listeners_of
            .entry(host.clone())
            .or_default()
            .insert(watcher.clone());
        if added {
            self.watching
                .entry(watcher.clone())
                .or_default()
                .insert(host.clone());
        }
        added
    }

    /// Remove the edge (host, watcher). Returns false if it did not exist.
    pub fn unwatch(&mut self, host: &ConnId, watcher: &ConnId) -> bool {
        let Some(set) = self.listeners_of.get_mut(host) else {
            return false;
        };
        if !set.remove(watcher) {
            return false;
        }
        if set.is_empty() {
            self.listeners_of.remove(host);
        }
        if let Some(hosts) = self.watching.get_mut(watcher) {
            hosts.remove(host);
            if hosts.is_empty() {
                self.watching.remove(watcher);
            }
        }
        true
    }

    /// Current listener count for a host.
    pub fn listener_count(&self, host: &ConnId) -> usize {
        self.listeners_of.get(host).map_or(0, HashSet::len)
    }

    /// Snapshot of a host's current listeners.
    pub fn listeners(&self, host: &ConnId) -> Vec<ConnId> {
        self.listeners_of
            .get(host)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// True if the connection is currently watching any host.
    pub fn is_watching_any(&self, watcher: &ConnId) -> bool {
        self.watching.contains_key(watcher)
    }

    /// Drop every edge where the host side is `host`. Returns true if any
    /// edge was removed (the host's count should then be republished).
    pub fn remove_host(&mut self, host: &ConnId) -> bool {
        let Some(watchers) = self.listeners_of.remove(host) else {
            return false;
        };
        for watcher in &watchers {
            if let Some(hosts) = self.watching.get_mut(watcher) {
                hosts.remove(host);
                if hosts.is_empty() {
                    self.watching.remove(watcher);
                }
            }
        }
        true
    }

    /// Drop every edge where the watcher side is `watcher`. Returns the
    /// hosts whose listener counts changed.
    pub fn remove_watcher(&mut self, watcher: &ConnId) -> Vec<ConnId> {
        let Some(hosts) = self.watching.remove(watcher) else {
            return Vec::new();
        };
        let mut affected = Vec::with_capacity(hosts.len());
        for host in hosts {
            if let Some(set) = self.listeners_of.get_mut(&host) {
                set.remove(watcher);
                if set.is_empty() {
                    self.listeners_of.remove(&host);
                }
            }
            affected.push(host);
        }
        affected
    }
}
