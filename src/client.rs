//! Cluster client facade.
//!
//! # Responsibilities
//! - Assemble registry, router, pipeline and session from a `ClientConfig`
//! - Start background work (health prober, preference watcher)
//! - Offer one entry point for callers
//!
//! # Data Flow
//! ```text
//! ClientConfig
//!     → EndpointRegistry ─┬─▶ RouterContext ─▶ RequestPipeline
//!                         └─▶ HealthProber (spawned by start)
//!     → StrategyStore ─▶ PreferenceWatcher ─▶ RouterContext::follow_preference
//!     → SessionManager (independent of the HTTP side)
//! ```

use std::fmt;
use std::sync::Arc;

use notify::RecommendedWatcher;
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::validation::{validate_config, ValidationError};
use crate::config::watcher::PreferenceWatcher;
use crate::config::{ClientConfig, StrategyStore};
use crate::health::HealthProber;
use crate::http::{ApiRequest, RequestError, RequestPipeline};
use crate::lifecycle::Shutdown;
use crate::load_balancer::context::EndpointHealth;
use crate::load_balancer::registry::RegistryError;
use crate::load_balancer::{EndpointRegistry, RouterContext, Strategy};
use crate::realtime::SessionManager;
use crate::resilience::timeouts::http_client;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid configuration: {}", format_errors(.0))]
    Invalid(Vec<ValidationError>),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("failed to watch strategy preference: {0}")]
    Watch(#[from] notify::Error),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Entry point bundling the HTTP and realtime sides of the client.
pub struct ClusterClient {
    config: ClientConfig,
    router: Arc<RouterContext>,
    pipeline: RequestPipeline,
    http: reqwest::Client,
    session: SessionManager,
    watcher: Option<RecommendedWatcher>,
    tasks: Vec<JoinHandle<()>>,
}

impl fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterClient")
            .field("router", &self.router)
            .field("session", &self.session)
            .field("watching", &self.watcher.is_some())
            .finish()
    }
}

impl ClusterClient {
    /// Build a client. Must be called inside a Tokio runtime because the
    /// session task is spawned here; no connection is opened yet.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        validate_config(&config).map_err(ClientError::Invalid)?;

        let registry = Arc::new(EndpointRegistry::new(&config.http.endpoints)?);
        let store = match &config.http.preference_path {
            Some(path) => StrategyStore::new(path),
            None => StrategyStore::in_memory(),
        };
        let router = Arc::new(RouterContext::new(registry, store));

        let http = http_client(&config.timeouts).map_err(ClientError::HttpClient)?;
        let pipeline = RequestPipeline::new(
            Arc::clone(&router),
            http.clone(),
            &config.http,
            config.retries.clone(),
        )?;
        let session = SessionManager::spawn(config.realtime.clone());

        tracing::info!(
            endpoints = config.http.endpoints.len(),
            realtime_endpoints = config.realtime.endpoints.len(),
            strategy = %router.strategy(),
            "Cluster client initialized"
        );

        Ok(Self {
            config,
            router,
            pipeline,
            http,
            session,
            watcher: None,
            tasks: Vec::new(),
        })
    }

    /// Spawn the health prober and the preference watcher. Both stop when
    /// `shutdown` fires or the client is dropped.
    pub fn start(&mut self, shutdown: &Shutdown) -> Result<(), ClientError> {
        let prober = self.prober();
        self.tasks.push(tokio::spawn(prober.run(shutdown.subscribe())));

        if let Some(path) = &self.config.http.preference_path {
            let (watcher, updates) = PreferenceWatcher::new(StrategyStore::new(path));
            self.watcher = watcher.run()?;
            self.tasks
                .push(tokio::spawn(Arc::clone(&self.router).follow_preference(updates)));
        }
        Ok(())
    }

    /// A prober over this client's registry, for one-off or scheduled probing.
    pub fn prober(&self) -> HealthProber {
        HealthProber::new(
            Arc::clone(self.router.registry()),
            self.config.health_check.clone(),
            self.http.clone(),
        )
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<RouterContext> {
        &self.router
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub async fn execute(&self, request: ApiRequest) -> Result<Response, RequestError> {
        self.pipeline.execute(request).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        self.pipeline.get_json(path).await
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RequestError> {
        self.pipeline.post_json(path, body).await
    }

    pub fn strategy(&self) -> Strategy {
        self.router.strategy()
    }

    pub fn set_strategy(&self, strategy: Strategy) -> std::io::Result<()> {
        self.router.set_strategy(strategy)
    }

    pub fn health_snapshot(&self) -> Vec<EndpointHealth> {
        self.router.health_snapshot()
    }

    pub fn available_endpoints(&self) -> Vec<String> {
        self.router.available_endpoints()
    }
}

impl Drop for ClusterClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let mut config = ClientConfig::default();
        config.http.endpoints.clear();
        let err = ClusterClient::new(config).unwrap_err();
        assert!(matches!(err, ClientError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_builds_from_defaults() {
        let client = ClusterClient::new(ClientConfig::default()).unwrap();
        assert_eq!(client.strategy(), Strategy::RoundRobin);
        assert_eq!(client.available_endpoints().len(), 3);
        assert!(!client.session().is_connected());
    }
}
