//! Rate-gated submission of documents to the endpoint.

use std::future::Future;
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::serializer::{JsonSerializer, Serializer};
use super::transport::{HttpTransport, Transport};
use crate::config::ClientConfig;
use crate::document::Document;
use crate::error::{SubmitError, TransportError};
use crate::gate::RateGate;

/// Sends submissions to one endpoint, each under a permit of a shared gate.
///
/// The permit is held for the whole request and released on every way out of
/// a submission: success, a failed or rejected request, a serialization
/// failure, or the caller dropping the future.
pub struct SubmissionClient<T = HttpTransport, S = JsonSerializer> {
    /// Endpoint URL every submission is posted to
    endpoint: String,
    /// Gate shared with every other client for the same endpoint
    gate: Arc<RateGate>,
    transport: T,
    serializer: S,
}

impl SubmissionClient {
    /// Create an HTTP client from configuration.
    pub fn from_config(config: &ClientConfig, gate: Arc<RateGate>) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(config.request_timeout())?;
        let serializer = if config.pretty_json {
            JsonSerializer::pretty()
        } else {
            JsonSerializer::compact()
        };
        Ok(Self::new(config.api_url.clone(), gate, transport, serializer))
    }
}

impl<T: Transport, S: Serializer> SubmissionClient<T, S> {
    /// Create a client posting to `endpoint` under `gate`.
    pub fn new(endpoint: impl Into<String>, gate: Arc<RateGate>, transport: T, serializer: S) -> Self {
        Self {
            endpoint: endpoint.into(),
            gate,
            transport,
            serializer,
        }
    }

    /// Get the endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Get the gate this client submits under.
    pub fn gate(&self) -> &Arc<RateGate> {
        &self.gate
    }

    /// Submit an already encoded payload.
    pub async fn submit(&self, payload: Vec<u8>, credential: &str) -> Result<(), SubmitError> {
        self.submit_until(payload, credential, std::future::pending()).await
    }

    /// Submit an already encoded payload, giving up the wait for a permit
    /// when `cancel` resolves.
    #[instrument(
        skip_all,
        fields(submission_id = %Uuid::new_v4(), bytes = payload.len())
    )]
    pub async fn submit_until<F>(
        &self,
        payload: Vec<u8>,
        credential: &str,
        cancel: F,
    ) -> Result<(), SubmitError>
    where
        F: Future<Output = ()>,
    {
        let _permit = self.gate.acquire_until(cancel).await?;
        self.send(payload, credential).await
    }

    /// Encode and submit a document.
    pub async fn submit_document(&self, document: &Document, credential: &str) -> Result<(), SubmitError> {
        self.submit_document_until(document, credential, std::future::pending())
            .await
    }

    /// Encode and submit a document, giving up the wait for a permit when
    /// `cancel` resolves.
    ///
    /// The document is encoded after the permit is granted.
    #[instrument(
        skip_all,
        fields(submission_id = %Uuid::new_v4(), doc_id = %document.doc_id)
    )]
    pub async fn submit_document_until<F>(
        &self,
        document: &Document,
        credential: &str,
        cancel: F,
    ) -> Result<(), SubmitError>
    where
        F: Future<Output = ()>,
    {
        let _permit = self.gate.acquire_until(cancel).await?;
        let body = self.serializer.serialize(document).map_err(|e| {
            warn!(error = %e, "Failed to encode document");
            e
        })?;
        self.send(body, credential).await
    }

    async fn send(&self, body: Vec<u8>, credential: &str) -> Result<(), SubmitError> {
        let mut authorization = HeaderValue::from_str(credential).map_err(TransportError::from)?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, authorization);

        let status = self
            .transport
            .post(&self.endpoint, body, headers)
            .await
            .map_err(|e| {
                warn!(endpoint = %self.endpoint, error = %e, "Submission request failed");
                e
            })?;

        if !status.is_success() {
            warn!(
                endpoint = %self.endpoint,
                status = status.as_u16(),
                "Endpoint rejected submission"
            );
            return Err(TransportError::Status(status).into());
        }

        info!(endpoint = %self.endpoint, status = status.as_u16(), "Submission accepted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Product;
    use crate::error::SerializationError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::StatusCode;
    use std::num::NonZeroUsize;
    use std::time::Duration;

    const ENDPOINT: &str = "http://docs.test/api/v3/lk/documents/create";

    #[derive(Debug)]
    struct Recorded {
        url: String,
        body: Vec<u8>,
        headers: HeaderMap,
    }

    /// Answers every request the same way and records what it was sent.
    struct MockTransport {
        outcome: fn() -> Result<StatusCode, TransportError>,
        requests: Mutex<Vec<Recorded>>,
    }

    impl MockTransport {
        fn answering(outcome: fn() -> Result<StatusCode, TransportError>) -> Self {
            Self {
                outcome,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn ok() -> Self {
            Self::answering(|| Ok(StatusCode::OK))
        }

        fn request_count(&self) -> usize {
            self.requests.lock().len()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn post(
            &self,
            url: &str,
            body: Vec<u8>,
            headers: HeaderMap,
        ) -> Result<StatusCode, TransportError> {
            self.requests.lock().push(Recorded {
                url: url.to_string(),
                body,
                headers,
            });
            (self.outcome)()
        }
    }

    struct FailingSerializer;

    impl Serializer for FailingSerializer {
        fn serialize(&self, _document: &Document) -> Result<Vec<u8>, SerializationError> {
            Err(SerializationError::Unrepresentable("no encoder".to_string()))
        }
    }

    fn connection_error() -> TransportError {
        let err = reqwest::Client::new()
            .post("not a url")
            .build()
            .unwrap_err();
        TransportError::Request(err)
    }

    fn gate(limit: usize) -> Arc<RateGate> {
        Arc::new(RateGate::new(
            NonZeroUsize::new(limit).unwrap(),
            Duration::from_secs(60),
        ))
    }

    fn client<S: Serializer>(
        gate: Arc<RateGate>,
        transport: MockTransport,
        serializer: S,
    ) -> SubmissionClient<MockTransport, S> {
        SubmissionClient::new(ENDPOINT, gate, transport, serializer)
    }

    #[tokio::test]
    async fn test_submit_posts_payload_with_headers() {
        let gate = gate(2);
        let client = client(gate.clone(), MockTransport::ok(), JsonSerializer::default());

        client.submit(b"{}".to_vec(), "signature").await.unwrap();

        let requests = client.transport.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, ENDPOINT);
        assert_eq!(requests[0].body, b"{}");
        assert_eq!(requests[0].headers[CONTENT_TYPE], "application/json");
        assert_eq!(requests[0].headers[AUTHORIZATION], "signature");
        assert!(requests[0].headers[AUTHORIZATION].is_sensitive());
        assert_eq!(gate.count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_status_is_transport_error_and_releases() {
        let gate = gate(1);
        let transport = MockTransport::answering(|| Ok(StatusCode::UNAUTHORIZED));
        let client = client(gate.clone(), transport, JsonSerializer::default());

        let err = client.submit(b"{}".to_vec(), "signature").await.unwrap_err();

        assert!(matches!(
            err,
            SubmitError::Transport(TransportError::Status(StatusCode::UNAUTHORIZED))
        ));
        assert_eq!(gate.count(), 0);
    }

    #[tokio::test]
    async fn test_failed_request_is_transport_error_and_releases() {
        let gate = gate(1);
        let client = client(
            gate.clone(),
            MockTransport::answering(|| Err(connection_error())),
            JsonSerializer::default(),
        );

        let err = client.submit(b"{}".to_vec(), "signature").await.unwrap_err();

        assert!(matches!(err, SubmitError::Transport(TransportError::Request(_))));
        assert_eq!(gate.count(), 0);
    }

    #[tokio::test]
    async fn test_serialization_failure_releases_and_skips_transport() {
        let gate = gate(1);
        let client = client(gate.clone(), MockTransport::ok(), FailingSerializer);

        let err = client
            .submit_document(&Document::default(), "signature")
            .await
            .unwrap_err();

        assert!(matches!(err, SubmitError::Serialization(_)));
        assert_eq!(client.transport.request_count(), 0);
        assert_eq!(gate.count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_credential_releases() {
        let gate = gate(1);
        let client = client(gate.clone(), MockTransport::ok(), JsonSerializer::default());

        let err = client.submit(b"{}".to_vec(), "bad\ncredential").await.unwrap_err();

        assert!(matches!(
            err,
            SubmitError::Transport(TransportError::InvalidCredential(_))
        ));
        assert_eq!(client.transport.request_count(), 0);
        assert_eq!(gate.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_never_reaches_transport() {
        let gate = gate(1);
        let client = client(gate.clone(), MockTransport::ok(), JsonSerializer::default());
        let held = gate.acquire().await;

        let err = client
            .submit_until(
                b"{}".to_vec(),
                "signature",
                tokio::time::sleep(Duration::from_millis(10)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, SubmitError::Cancelled(_)));
        assert_eq!(client.transport.request_count(), 0);
        assert_eq!(gate.count(), 1);
        drop(held);
        assert_eq!(gate.count(), 0);
    }

    #[tokio::test]
    async fn test_submit_document_encodes_json() {
        let gate = gate(1);
        let client = client(gate, MockTransport::ok(), JsonSerializer::compact());
        let document = Document {
            doc_id: "doc-42".to_string(),
            products: vec![Product {
                uit_code: "010463003407001221".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };

        client.submit_document(&document, "signature").await.unwrap();

        let requests = client.transport.requests.lock();
        let sent: Document = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(sent, document);
    }

    #[tokio::test]
    async fn test_no_drift_over_mixed_outcomes() {
        let gate = gate(1);
        let ok = client(gate.clone(), MockTransport::ok(), JsonSerializer::default());
        let failing = client(
            gate.clone(),
            MockTransport::answering(|| Ok(StatusCode::INTERNAL_SERVER_ERROR)),
            JsonSerializer::default(),
        );

        for i in 0..100 {
            let result = if i % 2 == 0 {
                ok.submit(b"{}".to_vec(), "signature").await
            } else {
                failing.submit(b"{}".to_vec(), "signature").await
            };
            assert_eq!(result.is_ok(), i % 2 == 0);
            assert_eq!(gate.count(), 0);
        }
    }

    #[tokio::test]
    async fn test_http_client_end_to_end() {
        let (addr, server) = crate::client::transport::tests::serve_once("200 OK").await;
        let config = ClientConfig {
            api_url: format!("http://{}/api/v3/lk/documents/create", addr),
            ..Default::default()
        };
        let gate = gate(1);
        let client = SubmissionClient::from_config(&config, gate.clone()).unwrap();

        client
            .submit_document(&Document::default(), "signature")
            .await
            .unwrap();

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("post /api/v3/lk/documents/create"));
        assert!(request.contains("content-type: application/json"));
        assert!(request.contains("\"importrequest\": false"));
        assert_eq!(gate.count(), 0);
    }
}
