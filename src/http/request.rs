//! Logical requests and target rewriting.
//!
//! # Responsibilities
//! - Describe a request independent of the endpoint it will hit
//! - Decide whether a path is load balanced or passed through
//! - Rewrite the target onto a selected endpoint
//!
//! # Design Decisions
//! - Only paths under the API prefix are routed; everything else bypasses
//!   the router entirely
//! - The body is kept as JSON so every attempt can resend it

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use url::Url;

use crate::load_balancer::Endpoint;

/// A request described by method and path, not by endpoint.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path and query (e.g. "/api/auctions/active"), or an absolute URL.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Where a request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Under the API prefix: load balanced with retries.
    Balanced,
    /// Outside the prefix: sent once to this URL.
    PassThrough(Url),
    /// Outside the prefix with nowhere to send it.
    Unroutable,
}

/// Classify a request path.
pub fn classify(path: &str, api_prefix: &str, passthrough_base: Option<&Url>) -> Route {
    if let Ok(absolute) = Url::parse(path) {
        return Route::PassThrough(absolute);
    }
    if path.starts_with(api_prefix) {
        return Route::Balanced;
    }
    match passthrough_base.and_then(|base| base.join(path).ok()) {
        Some(url) => Route::PassThrough(url),
        None => Route::Unroutable,
    }
}

/// Rewrite a logical path to `{endpoint}{path}`.
pub fn rewrite(endpoint: &Endpoint, path: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!("{}{}", endpoint.address, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrite_keeps_path_and_query() {
        let endpoint = Endpoint::new("http://localhost:8082/").unwrap();
        let url = rewrite(&endpoint, "/api/auctions/42/bids?limit=5").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8082/api/auctions/42/bids?limit=5");
    }

    #[test]
    fn test_classify() {
        let base = Url::parse("http://gateway.local").unwrap();

        assert_eq!(classify("/api/auctions", "/api/", Some(&base)), Route::Balanced);
        assert_eq!(
            classify("/files/upload", "/api/", Some(&base)),
            Route::PassThrough(Url::parse("http://gateway.local/files/upload").unwrap())
        );
        assert_eq!(classify("/files/upload", "/api/", None), Route::Unroutable);
        assert_eq!(
            classify("http://other:9000/api/x", "/api/", None),
            Route::PassThrough(Url::parse("http://other:9000/api/x").unwrap())
        );
        // "/apix" is not under "/api/".
        assert_eq!(classify("/apix", "/api/", None), Route::Unroutable);
    }

    #[test]
    fn test_builder() {
        let req = ApiRequest::post("/api/auctions").json(serde_json::json!({"title": "lamp"}));
        assert_eq!(req.method, Method::POST);
        assert!(req.body.is_some());
    }
}
