//! Transport abstraction for reaching the submission endpoint.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use tracing::trace;

use crate::error::TransportError;

/// Sends one POST request and reports the status the endpoint answered with.
///
/// Implementations do not judge the status; the caller decides which codes
/// count as success.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` to `url` with the given headers.
    async fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        headers: HeaderMap,
    ) -> Result<StatusCode, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        headers: HeaderMap,
    ) -> Result<StatusCode, TransportError> {
        (**self).post(url, body, headers).await
    }
}

/// HTTP(S) transport backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post(
        &self,
        url: &str,
        body: Vec<u8>,
        headers: HeaderMap,
    ) -> Result<StatusCode, TransportError> {
        trace!(url = %url, bytes = body.len(), "Sending POST request");

        let response = self
            .client
            .post(url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        Ok(response.status())
    }
}
