//! Active health probing.
//!
//! # Responsibilities
//! - Periodically probe every endpoint, independently of each other
//! - Update the registry with the observed result

use std::sync::Arc;
use std::time::Duration;
use futures_util::future::join_all;
use tokio::time;
use tokio::sync::broadcast;

use crate::config::HealthCheckConfig;
use crate::load_balancer::{Endpoint, EndpointRegistry};
use crate::resilience::timeouts::deadline;

pub struct HealthProber {
    registry: Arc<EndpointRegistry>,
    config: HealthCheckConfig,
    client: reqwest::Client,
}

impl HealthProber {
    pub fn new(registry: Arc<EndpointRegistry>, config: HealthCheckConfig, client: reqwest::Client) -> Self {
        Self {
            registry,
            config,
            client,
        }
    }

    /// Probe on every interval until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(
            interval = self.config.interval_secs,
            path = %self.config.path,
            "Health prober starting"
        );

        let interval = Duration::from_secs(self.config.interval_secs);
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health prober received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every endpoint once, concurrently, and record the results.
    pub async fn probe_all(&self) {
        let probes = self
            .registry
            .list_all()
            .iter()
            .map(|endpoint| self.probe_and_record(endpoint));
        join_all(probes).await;
    }

    async fn probe_and_record(&self, endpoint: &Arc<Endpoint>) {
        if self.probe(endpoint).await {
            self.registry.mark_healthy(endpoint);
        } else {
            self.registry.mark_unhealthy(endpoint);
        }
    }

    /// Issue one liveness probe. Never errors: failures yield `false`.
    pub async fn probe(&self, endpoint: &Endpoint) -> bool {
        let url = format!("{}{}", endpoint.address, self.config.path);
        let timeout = Duration::from_secs(self.config.timeout_secs);

        let response_future = self
            .client
            .get(&url)
            .header("user-agent", "replica-client-health-check")
            .send();

        match deadline(timeout, response_future).await {
            Ok(Ok(response)) => {
                let success = response.status().is_success();
                if !success {
                    tracing::warn!(endpoint = %endpoint.address, status = %response.status(), "Health probe failed: non-success status");
                }
                success
            }
            Ok(Err(e)) => {
                tracing::warn!(endpoint = %endpoint.address, error = %e, "Health probe failed: connection error");
                false
            }
            Err(_) => {
                tracing::warn!(endpoint = %endpoint.address, "Health probe failed: timeout");
                false
            }
        }
    }
}
