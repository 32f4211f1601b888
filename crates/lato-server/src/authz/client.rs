// ============================================
// File: crates/lato-server/src/authz/client.rs
// ============================================
//! # Management API Authorization Client
//!
//! ## Request
//! ```text
//! GET {api_url}/checkPermission?userId=<user>&resourceId=<resource>
//! 200 { "hasPermission": true | false }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Non-2xx, timeouts and undecodable bodies all mean "denied"
//! - The API is reached directly; proxy environment variables are ignored
//!
//! ## Last Modified
//! v0.1.0 - Permission check client

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::models::{PermissionQuery, PermissionResponse};
use super::Authorizer;
use crate::config::AuthorizationConfig;
use crate::error::{Result, ServerError};

/// Authorizer backed by the management API.
pub struct HttpAuthorizer {
    endpoint: String,
    http: Client,
}

impl HttpAuthorizer {
    /// Creates a client for the API configured in `config`.
    ///
    /// # Errors
    /// Returns `Authorization` if the HTTP client cannot be built.
    pub fn new(config: &AuthorizationConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .no_proxy()
            .build()
            .map_err(|e| ServerError::authorization(format!("building HTTP client: {e}")))?;

        Ok(Self {
            endpoint: format!("{}/checkPermission", config.api_url.trim_end_matches('/')),
            http,
        })
    }

    async fn query(&self, user_id: &str, resource_id: &str) -> Result<bool> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&PermissionQuery {
                user_id,
                resource_id,
            })
            .send()
            .await
            .map_err(|e| ServerError::authorization(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServerError::authorization(format!("status {status}")));
        }

        let body: PermissionResponse = response
            .json()
            .await
            .map_err(|e| ServerError::authorization(format!("parse failed: {e}")))?;

        Ok(body.has_permission)
    }
}

#[async_trait]
impl Authorizer for HttpAuthorizer {
    async fn check_permission(&self, user_id: &str, resource_id: &str) -> Result<bool> {
        match self.query(user_id, resource_id).await {
            Ok(allowed) => {
                debug!(user_id, resource_id, allowed, "Permission checked");
                Ok(allowed)
            }
            Err(e) => {
                warn!(user_id, resource_id, error = %e, "Permission check failed, denying");
                Ok(false)
            }
        }
    }
}

impl std::fmt::Debug for HttpAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAuthorizer")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serves one canned HTTP response and returns the request line.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = stream.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();

            request.lines().next().unwrap_or_default().to_string()
        });

        (url, handle)
    }

    fn authorizer(api_url: String) -> HttpAuthorizer {
        HttpAuthorizer::new(&AuthorizationConfig {
            api_url,
            request_timeout_secs: 2,
            ..AuthorizationConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_granted() {
        let (url, server) = serve_once("200 OK", r#"{"hasPermission":true}"#).await;
        let allowed = authorizer(url).check_permission("10.0.0.9", "tunnel").await.unwrap();

        assert!(allowed);
        let request_line = server.await.unwrap();
        assert!(request_line.starts_with("GET /checkPermission?"));
        assert!(request_line.contains("userId=10.0.0.9"));
        assert!(request_line.contains("resourceId=tunnel"));
    }

    #[tokio::test]
    async fn test_denied() {
        let (url, _server) = serve_once("200 OK", r#"{"hasPermission":false}"#).await;
        assert!(!authorizer(url).check_permission("u", "r").await.unwrap());
    }

    #[tokio::test]
    async fn test_server_error_is_denial() {
        let (url, _server) = serve_once("500 Internal Server Error", "{}").await;
        assert!(!authorizer(url).check_permission("u", "r").await.unwrap());
    }

    #[tokio::test]
    async fn test_garbage_body_is_denial() {
        let (url, _server) = serve_once("200 OK", "not json").await;
        assert!(!authorizer(url).check_permission("u", "r").await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_is_denial() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        assert!(!authorizer(url).check_permission("u", "r").await.unwrap());
    }
}
