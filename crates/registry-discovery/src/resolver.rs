//! Memoized Remote Service Discovery: resolves a host's
//! `.well-known/terraform.json` document once per process lifetime.

use async_trait::async_trait;
use dashmap::DashMap;
use registry_core::model::DiscoveredRemoteService;
use registry_core::{Error, Result};
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

/// Resolves a host's Remote Service Discovery record. The seam the Mirror
/// Pull Coordinator depends on, so tests can substitute a fake resolver
/// instead of driving real HTTPS traffic.
#[async_trait]
pub trait DiscoverHost: Send + Sync {
    /// Resolves `host`'s discovery document.
    async fn resolve(&self, host: &str) -> Result<DiscoveredRemoteService>;
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    #[serde(rename = "modules.v1")]
    modules_v1: Option<String>,
    #[serde(rename = "providers.v1")]
    providers_v1: Option<String>,
}

/// Resolves and memoizes Remote Service Discovery documents.
///
/// The memoization map is process-wide and never invalidated at runtime;
/// an operator restart is required to pick up upstream topology changes.
pub struct ServiceDiscovery {
    client: Client,
    scheme: &'static str,
    cache: DashMap<String, DiscoveredRemoteService>,
}

impl Default for ServiceDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceDiscovery {
    /// Builds a resolver over a fresh HTTP client.
    ///
    /// # Panics
    ///
    /// Panics if the TLS backend fails to initialize, which cannot happen
    /// with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .user_agent(concat!("registry-discovery/", env!("CARGO_PKG_VERSION")))
                .build()
                .expect("reqwest client with default TLS backend"),
            scheme: "https",
            cache: DashMap::new(),
        }
    }

    /// Builds a resolver that issues plain-HTTP discovery requests. Only
    /// meant for tests driven against a local mock server; production
    /// callers always go through [`Self::new`].
    #[cfg(test)]
    #[must_use]
    fn insecure_for_tests() -> Self {
        let mut discovery = Self::new();
        discovery.scheme = "http";
        discovery
    }

}

#[async_trait]
impl DiscoverHost for ServiceDiscovery {
    /// Resolves `host`'s service discovery document, consulting the
    /// memoization map first. Concurrent first-time resolves for the same
    /// host may each issue the HTTP request; the last writer wins and all
    /// callers observe a consistent record afterward.
    async fn resolve(&self, host: &str) -> Result<DiscoveredRemoteService> {
        if let Some(cached) = self.cache.get(host) {
            return Ok(cached.clone());
        }

        let url = format!("{}://{host}/.well-known/terraform.json", self.scheme);
        debug!(%host, %url, "resolving service discovery document");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::backend_failure_with_source("discovery", format!("fetching {url}"), e))?;

        if !response.status().is_success() {
            return Err(Error::backend_failure(
                "discovery",
                format!("{host} returned HTTP {}", response.status()),
            ));
        }

        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("json"));
        if !is_json {
            return Err(Error::backend_failure(
                "discovery",
                format!("{host} did not respond with a JSON content type"),
            ));
        }

        let final_url = response.url().clone();
        let doc: DiscoveryDocument = response
            .json()
            .await
            .map_err(|e| Error::backend_failure_with_source("discovery", format!("decoding {url}"), e))?;

        let record = normalize(&final_url, doc);
        self.cache.insert(host.to_string(), record.clone());
        Ok(record)
    }
}

/// Applies the redirect-normalization step: when `providers.v1` is an
/// absolute URL, the host and path it names replace `base_url`/
/// `providers_v1_path` rather than being recorded verbatim alongside the
/// host the client actually reached.
fn normalize(final_url: &Url, doc: DiscoveryDocument) -> DiscoveredRemoteService {
    let mut base_url = scheme_and_host(final_url);
    let mut providers_v1_path = doc.providers_v1;

    if let Some(path) = &providers_v1_path {
        if let Ok(parsed) = Url::parse(path) {
            base_url = scheme_and_host(&parsed);
            providers_v1_path = Some(parsed.path().to_string());
        }
    }

    DiscoveredRemoteService {
        base_url,
        modules_v1_path: doc.modules_v1,
        providers_v1_path,
    }
}

fn scheme_and_host(url: &Url) -> String {
    format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn resolves_and_memoizes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/terraform.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_json(serde_json::json!({
                        "modules.v1": "/v1/modules/",
                        "providers.v1": "/v1/providers/",
                    })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let resolver = ServiceDiscovery::insecure_for_tests();
        let host = server.address().to_string();
        let first = resolver.resolve(&host).await.unwrap();
        assert_eq!(first.modules_v1_path.as_deref(), Some("/v1/modules/"));
        assert_eq!(first.providers_v1_path.as_deref(), Some("/v1/providers/"));

        // Memoized: the mock's expect(1) would fail the test if this issued
        // a second request.
        let second = resolver.resolve(&host).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn absolute_providers_v1_rewrites_base_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/terraform.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json; charset=utf-8")
                    .set_body_json(serde_json::json!({
                        "providers.v1": "https://providers.example.com/v1/providers/",
                    })),
            )
            .mount(&server)
            .await;

        let resolver = ServiceDiscovery::insecure_for_tests();
        let record = resolver.resolve(&server.address().to_string()).await.unwrap();
        assert_eq!(record.base_url, "https://providers.example.com");
        assert_eq!(record.providers_v1_path.as_deref(), Some("/v1/providers/"));
    }

    #[tokio::test]
    async fn non_success_status_is_backend_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/terraform.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let resolver = ServiceDiscovery::insecure_for_tests();
        let err = resolver.resolve(&server.address().to_string()).await.unwrap_err();
        assert!(matches!(err, Error::BackendFailure { .. }));
    }

    #[tokio::test]
    async fn non_json_content_type_is_backend_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/terraform.json"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "text/plain").set_body_string("nope"))
            .mount(&server)
            .await;

        let resolver = ServiceDiscovery::insecure_for_tests();
        let err = resolver.resolve(&server.address().to_string()).await.unwrap_err();
        assert!(matches!(err, Error::BackendFailure { .. }));
    }
}
