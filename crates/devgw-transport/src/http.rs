//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "HTTP client for device web services."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::error::TransportError;

/// Base address and per-request timeout applied to every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpEndpoint {
    pub base: Url,
    pub timeout: Duration,
}

impl HttpEndpoint {
    pub fn new(base: Url, timeout: Duration) -> Self {
        Self { base, timeout }
    }
}

/// One HTTP round trip per call.
///
/// A non-success HTTP status is reported as an empty body; only I/O level failures
/// (connect, timeout, invalid path) are returned as errors.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, path: &str) -> Result<String, TransportError>;

    /// Form-encoded POST.
    async fn post(&self, path: &str, form: &[(&str, &str)]) -> Result<String, TransportError>;

    /// Re-apply base address and timeout.
    fn update(&self, endpoint: HttpEndpoint);
}

/// `reqwest` backed client with a cookie store, so session cookies set during a login
/// survive until the next data request.
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    endpoint: RwLock<HttpEndpoint>,
}

impl HttpClient {
    pub fn new(endpoint: HttpEndpoint) -> Result<Self, TransportError> {
        let client = Client::builder().cookie_store(true).build()?;
        Ok(Self {
            client,
            endpoint: RwLock::new(endpoint),
        })
    }

    pub fn endpoint(&self) -> HttpEndpoint {
        self.endpoint.read().clone()
    }

    fn resolve(&self, path: &str) -> Result<(Url, Duration), TransportError> {
        let endpoint = self.endpoint.read();
        let url = endpoint
            .base
            .join(path)
            .map_err(|source| TransportError::InvalidPath {
                path: path.to_owned(),
                source,
            })?;
        Ok((url, endpoint.timeout))
    }

    async fn body_of(response: reqwest::Response) -> Result<String, TransportError> {
        let status = response.status();
        if !status.is_success() {
            warn!(
                url = %response.url(),
                status = status.as_u16(),
                "device returned non-success status"
            );
            return Ok(String::new());
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl HttpTransport for HttpClient {
    async fn get(&self, path: &str) -> Result<String, TransportError> {
        let (url, timeout) = self.resolve(path)?;
        debug!(%url, "GET");
        let response = self.client.get(url).timeout(timeout).send().await?;
        Self::body_of(response).await
    }

    async fn post(&self, path: &str, form: &[(&str, &str)]) -> Result<String, TransportError> {
        let (url, timeout) = self.resolve(path)?;
        debug!(%url, "POST");
        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .form(form)
            .send()
            .await?;
        Self::body_of(response).await
    }

    fn update(&self, endpoint: HttpEndpoint) {
        debug!(
            base = %endpoint.base,
            timeout_ms = endpoint.timeout.as_millis() as u64,
            "http endpoint updated"
        );
        *self.endpoint.write() = endpoint;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Form, Router};
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn spawn_device() -> SocketAddr {
        let router = Router::new()
            .route("/status.json", get(|| async { "{\"ok\":true}" }))
            .route(
                "/login",
                get(|| async { StatusCode::SERVICE_UNAVAILABLE }).post(
                    |Form(form): Form<HashMap<String, String>>| async move {
                        format!("user={}", form.get("login").cloned().unwrap_or_default())
                    },
                ),
            )
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    "late"
                }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn client_for(addr: SocketAddr, timeout: Duration) -> HttpClient {
        let base = Url::parse(&format!("http://{addr}/")).unwrap();
        HttpClient::new(HttpEndpoint::new(base, timeout)).unwrap()
    }

    #[tokio::test]
    async fn get_and_post_return_bodies() {
        let addr = spawn_device().await;
        let client = client_for(addr, Duration::from_secs(2));

        assert_eq!(client.get("status.json").await.unwrap(), "{\"ok\":true}");
        assert_eq!(
            client.post("login", &[("login", "7213")]).await.unwrap(),
            "user=7213"
        );
    }

    #[tokio::test]
    async fn non_success_status_yields_empty_body() {
        let addr = spawn_device().await;
        let client = client_for(addr, Duration::from_secs(2));
        assert_eq!(client.get("login").await.unwrap(), "");
        assert_eq!(client.get("missing").await.unwrap(), "");
    }

    #[tokio::test]
    async fn timeout_is_an_error_and_update_reapplies_it() {
        let addr = spawn_device().await;
        let client = client_for(addr, Duration::from_millis(50));
        assert!(matches!(client.get("slow").await, Err(TransportError::Http(_))));

        let mut endpoint = client.endpoint();
        endpoint.timeout = Duration::from_secs(2);
        client.update(endpoint);
        assert_eq!(client.get("slow").await.unwrap(), "late");
    }

    #[tokio::test]
    async fn unreachable_device_is_an_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = client_for(addr, Duration::from_millis(200));
        assert!(client.get("status.json").await.is_err());
    }
}
