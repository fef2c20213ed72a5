//! HTTP implementation of the ingestion wire contract.
//!
//! [`HttpConnector`] builds a pooled reqwest client per connection and
//! derives the bearer token at connect time; [`HttpLink`] posts batches and
//! job statuses with that token attached to every call.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use crate::config::Config;
use crate::envelope::{BatchRequest, Envelope};
use crate::job::JobStatus;
use crate::transport::{Connector, IngestAck, Link, TransportError};

/// Path of the batch ingestion endpoint, relative to the API URL.
pub const INGEST_PATH: &str = "/api/v1/ingest/resources";

/// Path of the job status endpoint, relative to the API URL.
pub const STATUS_PATH: &str = "/api/v1/jobs/status";

/// Supplies the bearer token attached to each call.
///
/// Called on every connect, so a reconnect picks up a refreshed token.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> Result<Option<String>, TransportError>;
}

/// A fixed token, or none.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

impl TokenSource for StaticToken {
    fn token(&self) -> Result<Option<String>, TransportError> {
        Ok(self.0.clone())
    }
}

impl<F> TokenSource for F
where
    F: Fn() -> Result<Option<String>, TransportError> + Send + Sync,
{
    fn token(&self) -> Result<Option<String>, TransportError> {
        self()
    }
}

/// Creates HTTP links to the ingestion service.
///
/// # Example
///
/// ```no_run
/// use resource_sender::client::HttpConnector;
/// use resource_sender::config::Config;
///
/// let config = Config::default();
/// let connector = HttpConnector::new(&config);
/// assert!(connector.ingest_url().ends_with("/api/v1/ingest/resources"));
/// ```
pub struct HttpConnector {
    ingest_url: String,
    status_url: String,
    timeout: Duration,
    tokens: Arc<dyn TokenSource>,
}

impl HttpConnector {
    /// Create a connector from the loaded configuration.
    pub fn new(config: &Config) -> Self {
        Self::with_settings(
            &config.api_url,
            config.request_timeout,
            StaticToken(config.token.clone()),
        )
    }

    /// Create a connector with custom settings.
    pub fn with_settings(
        api_url: &str,
        timeout: Duration,
        tokens: impl TokenSource + 'static,
    ) -> Self {
        let api_url = api_url.trim_end_matches('/');
        Self {
            ingest_url: format!("{}{}", api_url, INGEST_PATH),
            status_url: format!("{}{}", api_url, STATUS_PATH),
            timeout,
            tokens: Arc::new(tokens),
        }
    }

    pub fn ingest_url(&self) -> &str {
        &self.ingest_url
    }

    pub fn status_url(&self) -> &str {
        &self.status_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Connector for HttpConnector {
    type Link = HttpLink;

    async fn connect(&mut self) -> Result<HttpLink, TransportError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;
        let token = self.tokens.token()?;

        debug!(url = %self.ingest_url, authenticated = token.is_some(), "HTTP link created");

        Ok(HttpLink {
            client,
            ingest_url: self.ingest_url.clone(),
            status_url: self.status_url.clone(),
            token,
        })
    }
}

/// One pooled HTTP client bound to a token.
pub struct HttpLink {
    client: Client,
    ingest_url: String,
    status_url: String,
    token: Option<String>,
}

impl HttpLink {
    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl Link for HttpLink {
    async fn transmit(&mut self, envelopes: &[Envelope]) -> Result<IngestAck, TransportError> {
        let request = BatchRequest::new(envelopes);
        debug!(
            batch_size = request.len(),
            batch_id = %request.batch_id,
            url = %self.ingest_url,
            "Sending resource batch"
        );

        let response = self.post(&self.ingest_url).json(&request).send().await?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            // The status code is authoritative; the body is informational.
            let ack = if body.trim().is_empty() {
                IngestAck::accepted(envelopes.len())
            } else {
                match serde_json::from_str::<IngestAck>(&body) {
                    Ok(ack) => ack,
                    Err(e) => {
                        warn!(
                            error = %e,
                            status = %status,
                            "Unreadable acknowledgement, counting batch as accepted"
                        );
                        IngestAck::accepted(envelopes.len())
                    }
                }
            };
            if ack.rejected > 0 {
                warn!(
                    accepted = ack.accepted,
                    rejected = ack.rejected,
                    error = ?ack.error,
                    "Ingestion service rejected part of a batch"
                );
            }
            Ok(ack)
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            Err(TransportError::Status {
                code: status,
                message,
            })
        }
    }

    async fn report(&mut self, status: &JobStatus) -> Result<(), TransportError> {
        let response = self.post(&self.status_url).json(status).send().await?;
        let code = response.status();
        if code.is_success() {
            Ok(())
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(TransportError::Status { code, message })
        }
    }
}
