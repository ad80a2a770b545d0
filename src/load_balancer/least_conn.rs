//! Least Connections load balancing strategy.

use std::sync::Arc;
use crate::load_balancer::{LoadBalancer, endpoint::Endpoint, registry::EndpointRegistry};

/// Least connections selector.
/// Selects the healthy endpoint with the fewest in-flight requests.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for LeastConnections {
    fn next_server(&self, registry: &EndpointRegistry) -> Arc<Endpoint> {
        // In case of tie, the first one in configuration order is selected
        registry
            .list_all()
            .iter()
            .filter(|e| e.is_healthy())
            .min_by_key(|e| e.in_flight())
            .cloned()
            .unwrap_or_else(|| registry.first().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_least_conn() {
        let lb = LeastConnections::new();
        let reg = EndpointRegistry::new(&["http://127.0.0.1:8080", "http://127.0.0.1:8081"]).unwrap();
        let b1 = reg.list_all()[0].clone();
        let b2 = reg.list_all()[1].clone();

        // artificially increase in-flight on b1
        let _g1 = b1.acquire();

        // Should pick b2 (0 in flight)
        assert_eq!(lb.next_server(&reg).address, b2.address);

        let _g2 = b2.acquire();
        let _g3 = b2.acquire(); // now b2 has 2, b1 has 1

        assert_eq!(lb.next_server(&reg).address, b1.address);
    }

    #[test]
    fn test_tie_breaks_by_configuration_order() {
        let lb = LeastConnections::new();
        let reg = EndpointRegistry::new(&["http://a:1", "http://b:2", "http://c:3"]).unwrap();
        assert_eq!(lb.next_server(&reg).address, "http://a:1");
    }

    #[test]
    fn test_ignores_unhealthy_and_falls_back() {
        let lb = LeastConnections::new();
        let reg = EndpointRegistry::new(&["http://a:1", "http://b:2"]).unwrap();
        let a = reg.list_all()[0].clone();
        let b = reg.list_all()[1].clone();
        let _busy = b.acquire();

        reg.mark_unhealthy(&a);
        assert_eq!(lb.next_server(&reg).address, "http://b:2");

        reg.mark_unhealthy(&b);
        assert_eq!(lb.next_server(&reg).address, "http://a:1");
    }
}
