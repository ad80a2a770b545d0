//! Router context.
//!
//! # Responsibilities
//! - Own the endpoint registry, the round-robin cursor and the strategy
//! - Apply the current strategy on every selection
//! - Persist strategy changes through the preference store

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::config::preference::StrategyStore;
use crate::load_balancer::{
    LoadBalancer, Strategy,
    endpoint::Endpoint,
    least_conn::LeastConnections,
    registry::EndpointRegistry,
    round_robin::RoundRobin,
};

/// Point-in-time view of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointHealth {
    pub address: String,
    pub healthy: bool,
    pub in_flight: usize,
}

/// Shared routing state: registry, cursor and strategy.
#[derive(Debug)]
pub struct RouterContext {
    registry: Arc<EndpointRegistry>,
    strategy: AtomicU8,
    round_robin: RoundRobin,
    least_conn: LeastConnections,
    store: StrategyStore,
}

impl RouterContext {
    /// Create a context whose initial strategy is read from `store`.
    pub fn new(registry: Arc<EndpointRegistry>, store: StrategyStore) -> Self {
        let strategy = store.load();
        tracing::debug!(strategy = %strategy, endpoints = registry.len(), "Router context created");
        Self {
            registry,
            strategy: AtomicU8::new(strategy as u8),
            round_robin: RoundRobin::new(),
            least_conn: LeastConnections::new(),
            store,
        }
    }

    pub fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    pub fn strategy(&self) -> Strategy {
        Strategy::from(self.strategy.load(Ordering::Relaxed))
    }

    /// Change the strategy and persist it.
    pub fn set_strategy(&self, strategy: Strategy) -> io::Result<()> {
        self.apply_strategy(strategy);
        self.store.save(strategy)
    }

    /// Change the strategy without persisting (value already on disk).
    pub fn apply_strategy(&self, strategy: Strategy) {
        let previous = Strategy::from(self.strategy.swap(strategy as u8, Ordering::Relaxed));
        if previous != strategy {
            tracing::info!(from = %previous, to = %strategy, "Load balancing strategy changed");
        }
    }

    /// Select an endpoint using the current strategy.
    pub fn select(&self) -> Arc<Endpoint> {
        self.select_with(self.strategy())
    }

    /// Select an endpoint using an explicit strategy.
    pub fn select_with(&self, strategy: Strategy) -> Arc<Endpoint> {
        let lb: &dyn LoadBalancer = match strategy {
            Strategy::RoundRobin => &self.round_robin,
            Strategy::LeastConnections => &self.least_conn,
        };
        lb.next_server(&self.registry)
    }

    /// Round-robin cursor position.
    pub fn cursor(&self) -> usize {
        self.round_robin.cursor()
    }

    /// Health of every endpoint in configuration order.
    pub fn health_snapshot(&self) -> Vec<EndpointHealth> {
        self.registry
            .list_all()
            .iter()
            .map(|e| EndpointHealth {
                address: e.address.clone(),
                healthy: e.is_healthy(),
                in_flight: e.in_flight(),
            })
            .collect()
    }

    /// Addresses currently believed healthy.
    pub fn available_endpoints(&self) -> Vec<String> {
        self.registry
            .list_healthy()
            .iter()
            .map(|e| e.address.clone())
            .collect()
    }

    /// Apply strategy updates (from the preference watcher) until the sender closes.
    pub async fn follow_preference(self: Arc<Self>, mut updates: mpsc::UnboundedReceiver<Strategy>) {
        while let Some(strategy) = updates.recv().await {
            self.apply_strategy(strategy);
        }
        tracing::debug!("Preference updates closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RouterContext {
        let registry = EndpointRegistry::new(&["http://e1:1", "http://e2:2", "http://e3:3"]).unwrap();
        RouterContext::new(Arc::new(registry), StrategyStore::in_memory())
    }

    #[test]
    fn test_isolated_contexts_do_not_share_cursor() {
        let a = context();
        let b = context();
        a.select();
        a.select();
        assert_eq!(a.cursor(), 2);
        assert_eq!(b.cursor(), 0);
        assert_eq!(b.select().address, "http://e1:1");
    }

    #[test]
    fn test_strategy_switch_applies_to_next_selection() {
        let ctx = context();
        let e1 = ctx.registry().list_all()[0].clone();
        let _busy = e1.acquire();

        assert_eq!(ctx.select().address, "http://e1:1");
        ctx.set_strategy(Strategy::LeastConnections).unwrap();
        assert_eq!(ctx.strategy(), Strategy::LeastConnections);
        assert_eq!(ctx.select().address, "http://e2:2");
    }

    #[test]
    fn test_snapshot_and_available() {
        let ctx = context();
        let e2 = ctx.registry().list_all()[1].clone();
        ctx.registry().mark_unhealthy(&e2);

        let snapshot = ctx.health_snapshot();
        assert_eq!(snapshot.len(), 3);
        assert!(!snapshot[1].healthy);
        assert_eq!(ctx.available_endpoints(), vec!["http://e1:1", "http://e3:3"]);
    }

    #[tokio::test]
    async fn test_follow_preference_applies_updates() {
        let ctx = Arc::new(context());
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Strategy::LeastConnections).unwrap();
        drop(tx);

        ctx.clone().follow_preference(rx).await;
        assert_eq!(ctx.strategy(), Strategy::LeastConnections);
    }
}
