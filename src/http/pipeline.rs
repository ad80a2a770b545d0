//! Request pipeline.
//!
//! # Responsibilities
//! - Select an endpoint for each attempt and rewrite the target onto it
//! - On transport failure: flag the endpoint unhealthy and retry on an
//!   endpoint not yet tried by this request
//! - Return responses (any status) unmodified
//! - Tag every logical request with an `x-request-id`
//!
//! # Design Decisions
//! - A plain bounded loop; no re-entry into the pipeline per retry
//! - Application error statuses are not health evidence and are not retried
//! - A success through an endpoint restores its health flag

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use reqwest::header::HeaderValue;
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::config::{HttpConfig, RetryConfig};
use crate::http::request::{classify, rewrite, ApiRequest, Route};
use crate::load_balancer::RouterContext;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::retries::{attempt_budget, is_transport_failure};

/// Errors surfaced by the pipeline.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Every attempt failed at the transport level.
    #[error("transport failure after {attempts} attempt(s): {source}")]
    Transport {
        attempts: usize,
        #[source]
        source: reqwest::Error,
    },

    /// Path outside the API prefix and no pass-through base configured.
    #[error("no route for '{0}'")]
    Unroutable(String),

    #[error("invalid target URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Non-transport client error (building the request, decoding a body).
    #[error("http error: {0}")]
    Http(#[source] reqwest::Error),

    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    /// Application-level error status returned by a typed helper.
    #[error("server returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Load-balanced request executor.
#[derive(Debug, Clone)]
pub struct RequestPipeline {
    router: Arc<RouterContext>,
    client: reqwest::Client,
    retry: RetryConfig,
    api_prefix: String,
    passthrough_base: Option<Url>,
}

impl RequestPipeline {
    pub fn new(
        router: Arc<RouterContext>,
        client: reqwest::Client,
        http: &HttpConfig,
        retry: RetryConfig,
    ) -> Result<Self, RequestError> {
        let passthrough_base = http
            .passthrough_base
            .as_deref()
            .map(Url::parse)
            .transpose()?;

        Ok(Self {
            router,
            client,
            retry,
            api_prefix: http.api_prefix.clone(),
            passthrough_base,
        })
    }

    pub fn router(&self) -> &Arc<RouterContext> {
        &self.router
    }

    /// Execute a logical request.
    pub async fn execute(&self, request: ApiRequest) -> Result<Response, RequestError> {
        let request_id = uuid::Uuid::new_v4().to_string();

        match classify(&request.path, &self.api_prefix, self.passthrough_base.as_ref()) {
            Route::Balanced => self.execute_balanced(&request, &request_id).await,
            Route::PassThrough(url) => self.execute_passthrough(&request, url, &request_id).await,
            Route::Unroutable => Err(RequestError::Unroutable(request.path)),
        }
    }

    async fn execute_balanced(
        &self,
        request: &ApiRequest,
        request_id: &str,
    ) -> Result<Response, RequestError> {
        let registry = self.router.registry();
        let max_attempts = attempt_budget(registry.len(), &self.retry);
        let method = request.method.as_str();
        let mut attempt = 0;
        let mut tried: HashSet<String> = HashSet::new();

        loop {
            attempt += 1;
            let start = Instant::now();

            // 1. Select and rewrite
            let mut endpoint = self.router.select();
            if tried.contains(&endpoint.address) {
                // The selector repeats itself when nothing is healthy; walk
                // the remaining endpoints in configuration order instead.
                if let Some(untried) = registry.list_all().iter().find(|e| !tried.contains(&e.address)) {
                    endpoint = Arc::clone(untried);
                }
            }
            tried.insert(endpoint.address.clone());
            let url = rewrite(&endpoint, &request.path)?;

            tracing::debug!(
                request_id = %request_id,
                attempt,
                endpoint = %endpoint.address,
                url = %url,
                "Routing request"
            );

            // 2. Send while holding an in-flight slot
            let result = {
                let _guard = endpoint.acquire();
                self.send(request, url, request_id).await
            };

            match result {
                Ok(response) => {
                    metrics::record_request(method, response.status().as_u16(), &endpoint.address, start);
                    registry.mark_healthy(&endpoint);
                    return Ok(response);
                }
                Err(e) if is_transport_failure(&e) => {
                    tracing::warn!(
                        request_id = %request_id,
                        attempt,
                        max_attempts,
                        endpoint = %endpoint.address,
                        error = %e,
                        "Transport failure"
                    );
                    metrics::record_transport_failure(&endpoint.address);
                    registry.mark_unhealthy(&endpoint);

                    if attempt >= max_attempts {
                        tracing::error!(request_id = %request_id, attempts = attempt, "All endpoints failed");
                        return Err(RequestError::Transport {
                            attempts: attempt,
                            source: e,
                        });
                    }

                    let delay = calculate_backoff(attempt as u32, self.retry.base_delay_ms, self.retry.max_delay_ms);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(RequestError::Http(e)),
            }
        }
    }

    async fn execute_passthrough(
        &self,
        request: &ApiRequest,
        url: Url,
        request_id: &str,
    ) -> Result<Response, RequestError> {
        tracing::debug!(request_id = %request_id, url = %url, "Passing request through");

        self.send(request, url, request_id).await.map_err(|e| {
            if is_transport_failure(&e) {
                RequestError::Transport { attempts: 1, source: e }
            } else {
                RequestError::Http(e)
            }
        })
    }

    async fn send(&self, request: &ApiRequest, url: Url, request_id: &str) -> reqwest::Result<Response> {
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(request.headers.clone());

        if let Ok(value) = HeaderValue::from_str(request_id) {
            builder = builder.header("x-request-id", value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        builder.send().await
    }

    /// GET a path and decode a JSON success body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        let response = self.execute(ApiRequest::get(path)).await?;
        decode(response).await
    }

    /// POST a JSON body and decode a JSON success body.
    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RequestError> {
        let value = serde_json::to_value(body)?;
        let response = self.execute(ApiRequest::post(path).json(value)).await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RequestError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RequestError::Status { status, body });
    }
    response.json::<T>().await.map_err(RequestError::Http)
}
