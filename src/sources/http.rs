//! Shared HTTP plumbing for the protocol adapters
//!
//! One reqwest client per adapter with a bounded per-call timeout, optional
//! basic auth, and protocol-tagged error mapping.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::config::{Credentials, GeoServerConfig};
use crate::error::{SourceError, SourceErrorKind, SourceResult};
use crate::sources::Protocol;

/// Bytes of an error body kept in [`SourceErrorKind::Status`]
const ERROR_BODY_LIMIT: usize = 200;

/// HTTP client bound to one protocol and one GeoServer instance
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: Client,
    protocol: Protocol,
    root: String,
    credentials: Option<Credentials>,
    timeout: Duration,
}

impl ServiceClient {
    pub fn new(
        protocol: Protocol,
        config: &GeoServerConfig,
        default_timeout: Duration,
    ) -> SourceResult<Self> {
        let timeout = config.timeout.unwrap_or(default_timeout);
        let http = Client::builder().timeout(timeout).build().map_err(|e| {
            SourceError::new(
                protocol,
                SourceErrorKind::Transport(format!("failed to create HTTP client: {}", e)),
            )
        })?;

        Ok(Self {
            http,
            protocol,
            root: config.root().to_string(),
            credentials: config.credentials.clone(),
            timeout,
        })
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Service root without trailing slash
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Absolute URL for a path below the service root
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.root, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.credentials {
            Some(creds) => builder.basic_auth(&creds.username, Some(&creds.password)),
            None => builder,
        }
    }

    /// GET with query parameters, returning the body as text
    pub async fn get_text(&self, url: &str, query: &[(&str, String)]) -> SourceResult<String> {
        let response = self
            .request(Method::GET, url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let response = self.check_status(response).await?;
        response.text().await.map_err(|e| self.transport_error(e))
    }

    /// GET with query parameters, decoding a JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> SourceResult<T> {
        let body = self.get_text(url, query).await?;
        serde_json::from_str(&body).map_err(|e| {
            let preview: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            SourceError::malformed(
                self.protocol,
                format!("invalid JSON ({}): {}", e, preview.trim()),
            )
        })
    }

    /// HEAD probe, returning the status without reading a body
    pub async fn head(&self, url: &str) -> SourceResult<StatusCode> {
        let response = self
            .request(Method::HEAD, url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        Ok(response.status())
    }

    async fn check_status(&self, response: reqwest::Response) -> SourceResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(SourceError::new(
            self.protocol,
            SourceErrorKind::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            },
        ))
    }

    fn transport_error(&self, err: reqwest::Error) -> SourceError {
        let kind = if err.is_timeout() {
            SourceErrorKind::Timeout(self.timeout)
        } else {
            SourceErrorKind::Transport(err.to_string())
        };
        SourceError::new(self.protocol, kind)
    }
}
