//! Route registry with copy-on-write publication
//!
//! The live routing table is an immutable `Arc<HashMap>`; mutations clone
//! the map, apply the change, and swap the `Arc` under a short write lock.
//! Readers take a snapshot (an `Arc` clone) and are never exposed to a
//! partially-updated table. Every mutation bumps a watch channel so
//! request-matching state can be refreshed without locking readers.

use crate::error::{GatewayError, Result};
use crate::route::RouteDefinition;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::debug;

type RouteTable = HashMap<String, Arc<RouteDefinition>>;

pub struct RouteRegistry {
    table: RwLock<Arc<RouteTable>>,
    version_tx: watch::Sender<u64>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        let (version_tx, _) = watch::channel(0);
        Self {
            table: RwLock::new(Arc::new(HashMap::new())),
            version_tx,
        }
    }

    /// Build a registry pre-populated with seed routes (startup config).
    pub fn with_routes(routes: Vec<RouteDefinition>) -> Self {
        let registry = Self::new();
        let mut table = HashMap::new();
        for route in routes {
            table.insert(route.id.clone(), Arc::new(route));
        }
        *registry.table.try_write().expect("unshared at construction") = Arc::new(table);
        registry
    }

    /// Snapshot of the live routing table. Cheap; holds the read lock only
    /// long enough to clone the `Arc`.
    pub async fn snapshot(&self) -> Arc<RouteTable> {
        self.table.read().await.clone()
    }

    /// Subscribe to table-change notifications. The value is a monotonic
    /// version counter.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }

    /// Find the first route matching the given path and method.
    pub async fn resolve(&self, path: &str, method: &str) -> Option<Arc<RouteDefinition>> {
        let table = self.snapshot().await;
        // Prefer the longest pattern so nested routes win over catch-alls.
        let mut candidates: Vec<&Arc<RouteDefinition>> = table
            .values()
            .filter(|r| r.matches(path, method))
            .collect();
        candidates.sort_by_key(|r| std::cmp::Reverse(r.predicate.path.len()));
        candidates.first().map(|r| Arc::clone(r))
    }

    pub async fn list(&self) -> Vec<Arc<RouteDefinition>> {
        let table = self.snapshot().await;
        let mut routes: Vec<_> = table.values().cloned().collect();
        routes.sort_by(|a, b| a.id.cmp(&b.id));
        routes
    }

    pub async fn get(&self, id: &str) -> Result<Arc<RouteDefinition>> {
        let table = self.snapshot().await;
        table
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::RouteNotFound(id.to_string()))
    }

    /// Add a new route. Fails if the id is already taken.
    pub async fn add(&self, route: RouteDefinition) -> Result<()> {
        let mut guard = self.table.write().await;
        if guard.contains_key(&route.id) {
            return Err(GatewayError::Validation(format!(
                "route already exists: {}",
                route.id
            )));
        }
        let mut next = (**guard).clone();
        let id = route.id.clone();
        next.insert(id.clone(), Arc::new(route));
        *guard = Arc::new(next);
        drop(guard);

        debug!(route = %id, "route added");
        self.publish();
        Ok(())
    }

    /// Replace an existing route with a full new definition. Defined as
    /// delete followed by add, not a field merge.
    pub async fn update(&self, route: RouteDefinition) -> Result<()> {
        self.delete(&route.id).await?;
        self.add(route).await
    }

    /// Remove a route by id.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut guard = self.table.write().await;
        if !guard.contains_key(id) {
            return Err(GatewayError::RouteNotFound(id.to_string()));
        }
        let mut next = (**guard).clone();
        next.remove(id);
        *guard = Arc::new(next);
        drop(guard);

        debug!(route = %id, "route deleted");
        self.publish();
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.snapshot().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn publish(&self) {
        self.version_tx.send_modify(|v| *v += 1);
    }
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self::new()
    }
}
