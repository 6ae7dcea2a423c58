//! HTTP transport for the queue service.
//!
//! Requests are signed with [`RequestSigner`] and sent as
//! `application/x-www-form-urlencoded` POST bodies. Connection pooling is
//! handled by the shared `reqwest::Client`.

use super::{RawResponse, Transport};
use crate::config::ClientConfig;
use crate::error::{CmqError, ConfigurationError};
use crate::request::Request;
use crate::signing::RequestSigner;
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client as HttpClient;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Path used when the endpoint URL does not specify one
pub const DEFAULT_PATH: &str = "/v2/index.php";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Signed HTTP transport
pub struct HttpTransport {
    http_client: HttpClient,
    url: String,
    host: String,
    path: String,
    signer: RequestSigner,
    timeout: Duration,
    debug: bool,
}

impl HttpTransport {
    /// Create a transport for the configured endpoint
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the endpoint is not an absolute
    /// http(s) URL or the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, CmqError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| ConfigurationError::Invalid {
            message: format!("endpoint {} is not a valid URL: {}", config.endpoint, e),
        })?;

        let host_name = endpoint
            .host_str()
            .ok_or_else(|| ConfigurationError::Invalid {
                message: format!("endpoint {} has no host", config.endpoint),
            })?;

        // Url drops the port when it is the scheme default
        let host = match endpoint.port() {
            Some(port) => format!("{}:{}", host_name, port),
            None => host_name.to_string(),
        };

        let path = match endpoint.path() {
            "" | "/" => DEFAULT_PATH.to_string(),
            other => other.to_string(),
        };

        let url = format!("{}://{}{}", endpoint.scheme(), host, path);

        let http_client = HttpClient::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigurationError::Invalid {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        let signer = RequestSigner::new(
            config.secret_id.clone(),
            config.secret_key.clone(),
            config.signature_method,
        );

        Ok(Self {
            http_client,
            url,
            host,
            path,
            signer,
            timeout: config.timeout(),
            debug: config.debug,
        })
    }

    /// Full URL requests are posted to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Build the signed form body for a request
    fn signed_body(&self, request: &Request) -> String {
        let mut params = request.to_wire_params();
        let nonce: u32 = rand::thread_rng().gen();
        self.signer.sign(
            &self.host,
            &self.path,
            &mut params,
            nonce,
            Utc::now().timestamp(),
        );
        form_encode(&params)
    }
}

/// Encode parameters as `k=v&...` with percent-encoding
fn form_encode(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, request: &Request) -> Result<RawResponse, CmqError> {
        let body = self.signed_body(request);

        if self.debug {
            // Operation parameters only; the signed body carries credentials
            debug!(
                action = %request.action(),
                url = %self.url,
                params = ?request.to_wire_params(),
                "Sending request"
            );
        }

        let response = self
            .http_client
            .post(&self.url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CmqError::Timeout {
                        duration: self.timeout,
                    }
                } else if e.is_connect() {
                    CmqError::transport(format!("Connection failed: {}", e))
                } else {
                    CmqError::transport(format!("HTTP request failed: {}", e))
                }
            })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                CmqError::Timeout {
                    duration: self.timeout,
                }
            } else {
                CmqError::transport(format!("Failed to read response body: {}", e))
            }
        })?;

        if self.debug {
            debug!(
                action = %request.action(),
                status,
                body = %text,
                "Received response"
            );
        }

        Ok(RawResponse::new(status, text))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
