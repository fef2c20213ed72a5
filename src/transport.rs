//! Wire contract between the delivery worker and the ingestion service.
//!
//! A [`Connector`] creates [`Link`]s; a link is one live client handle that
//! transmits ordered batches of envelopes and returns an acknowledgement.
//! The HTTP implementation lives in [`crate::client`].

use std::future::Future;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;
use crate::job::JobStatus;

/// Acknowledgement returned by the ingestion service for one batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestAck {
    /// Status message from the API
    pub status: String,

    /// Number of envelopes accepted
    #[serde(default)]
    pub accepted: u64,

    /// Number of envelopes rejected (if any)
    #[serde(default)]
    pub rejected: u64,

    /// Optional batch ID echoed by the server
    #[serde(default)]
    pub batch_id: Option<String>,

    /// Optional error message
    #[serde(default)]
    pub error: Option<String>,
}

impl IngestAck {
    pub fn accepted(count: usize) -> Self {
        Self {
            status: "accepted".to_string(),
            accepted: count as u64,
            ..Default::default()
        }
    }
}

/// Errors that can occur while talking to the ingestion service.
#[derive(Debug)]
pub enum TransportError {
    /// The connection was closed or refused by the remote end
    Closed(String),

    /// HTTP request failed
    Request(reqwest::Error),

    /// Server returned an error status code
    Status { code: StatusCode, message: String },

    /// Request timeout
    Timeout,

    /// Client or credential configuration error
    Config(String),
}

impl TransportError {
    /// Whether this failure means the link must be re-established.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, TransportError::Closed(_))
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Closed(e) => write!(f, "Connection closed: {}", e),
            TransportError::Request(e) => write!(f, "HTTP request failed: {}", e),
            TransportError::Status { code, message } => {
                write!(f, "Server error ({}): {}", code, message)
            }
            TransportError::Timeout => write!(f, "Request timed out"),
            TransportError::Config(e) => write!(f, "Transport configuration error: {}", e),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Request(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() || has_closed_source(&err) {
            TransportError::Closed(err.to_string())
        } else {
            TransportError::Request(err)
        }
    }
}

/// hyper's `IncompleteMessage`: the peer hung up mid-exchange, with no I/O error attached.
const INCOMPLETE_MESSAGE: &str = "connection closed before message completed";

/// Looks for an error in the source chain that means the peer is gone.
fn has_closed_source(err: &(dyn std::error::Error + 'static)) -> bool {
    use std::io::ErrorKind;

    let mut current = err.source();
    while let Some(source) = current {
        if source.to_string().contains(INCOMPLETE_MESSAGE) {
            return true;
        }
        if let Some(io) = source.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::NotConnected
            ) {
                return true;
            }
        }
        current = source.source();
    }
    false
}

/// A live client handle to the ingestion service.
pub trait Link: Send {
    /// Sends one batch, preserving envelope order.
    fn transmit(
        &mut self,
        envelopes: &[Envelope],
    ) -> impl Future<Output = Result<IngestAck, TransportError>> + Send;

    /// Sends a job-level status report.
    fn report(
        &mut self,
        status: &JobStatus,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Releases the handle.
    fn close(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Creates links, attaching credentials as it does.
pub trait Connector: Send + 'static {
    type Link: Link + 'static;

    fn connect(&mut self) -> impl Future<Output = Result<Self::Link, TransportError>> + Send;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory transport.

    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use tokio::sync::Semaphore;

    use super::*;

    #[derive(Debug, Default)]
    pub(crate) struct Script {
        /// Envelope ids of every transmit attempt, successful or not
        pub(crate) attempts: Vec<Vec<String>>,
        /// Envelope ids of successful transmissions
        pub(crate) batches: Vec<Vec<String>>,
        pub(crate) statuses: Vec<JobStatus>,
        pub(crate) connects: usize,
        pub(crate) closes: usize,
        transmit_failures: VecDeque<TransportError>,
        connect_failures: VecDeque<TransportError>,
    }

    /// Shared view of what the mock transport saw.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct Recorder {
        inner: Arc<Mutex<Script>>,
        gate: Option<Arc<Semaphore>>,
    }

    impl Recorder {
        /// Transmissions wait for a permit from the returned semaphore.
        pub(crate) fn gated() -> (Self, Arc<Semaphore>) {
            let gate = Arc::new(Semaphore::new(0));
            let recorder = Self {
                inner: Arc::default(),
                gate: Some(gate.clone()),
            };
            (recorder, gate)
        }

        pub(crate) fn fail_next_transmit(&self, err: TransportError) {
            self.lock().transmit_failures.push_back(err);
        }

        pub(crate) fn fail_next_connect(&self, err: TransportError) {
            self.lock().connect_failures.push_back(err);
        }

        pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
            self.inner.lock().unwrap()
        }

        pub(crate) fn attempts(&self) -> Vec<Vec<String>> {
            self.lock().attempts.clone()
        }

        pub(crate) fn batches(&self) -> Vec<Vec<String>> {
            self.lock().batches.clone()
        }

        pub(crate) fn connects(&self) -> usize {
            self.lock().connects
        }

        pub(crate) fn connector(&self) -> MockConnector {
            MockConnector {
                recorder: self.clone(),
            }
        }
    }

    pub(crate) struct MockConnector {
        recorder: Recorder,
    }

    impl Connector for MockConnector {
        type Link = MockLink;

        async fn connect(&mut self) -> Result<MockLink, TransportError> {
            let mut script = self.recorder.lock();
            script.connects += 1;
            if let Some(err) = script.connect_failures.pop_front() {
                return Err(err);
            }
            Ok(MockLink {
                recorder: self.recorder.clone(),
            })
        }
    }

    pub(crate) struct MockLink {
        recorder: Recorder,
    }

    impl Link for MockLink {
        async fn transmit(&mut self, envelopes: &[Envelope]) -> Result<IngestAck, TransportError> {
            if let Some(gate) = &self.recorder.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }

            let ids: Vec<String> = envelopes.iter().map(|e| e.id.clone()).collect();
            let mut script = self.recorder.lock();
            script.attempts.push(ids.clone());
            if let Some(err) = script.transmit_failures.pop_front() {
                return Err(err);
            }
            script.batches.push(ids);
            Ok(IngestAck::accepted(envelopes.len()))
        }

        async fn report(&mut self, status: &JobStatus) -> Result<(), TransportError> {
            self.recorder.lock().statuses.push(status.clone());
            Ok(())
        }

        async fn close(&mut self) {
            self.recorder.lock().closes += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Timeout;
        assert_eq!(format!("{}", err), "Request timed out");

        let err = TransportError::Status {
            code: StatusCode::BAD_REQUEST,
            message: "Invalid JSON".to_string(),
        };
        assert!(format!("{}", err).contains("400"));
        assert!(format!("{}", err).contains("Invalid JSON"));

        let err = TransportError::Closed("connection reset".to_string());
        assert_eq!(format!("{}", err), "Connection closed: connection reset");
    }

    #[test]
    fn test_only_closed_errors_need_reconnect() {
        assert!(TransportError::Closed("eof".into()).is_connection_closed());
        assert!(!TransportError::Timeout.is_connection_closed());
        assert!(!TransportError::Status {
            code: StatusCode::SERVICE_UNAVAILABLE,
            message: String::new(),
        }
        .is_connection_closed());
        assert!(!TransportError::Config("bad".into()).is_connection_closed());
    }

    #[derive(Debug)]
    struct Wrapper(Box<dyn std::error::Error + Send + Sync>);

    impl std::fmt::Display for Wrapper {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "wrapped")
        }
    }

    impl std::error::Error for Wrapper {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&*self.0)
        }
    }

    /// Stand-in for hyper's message-level error, which carries no I/O source.
    #[derive(Debug)]
    struct HyperLike(&'static str);

    impl std::fmt::Display for HyperLike {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    impl std::error::Error for HyperLike {}

    #[test]
    fn test_closed_io_source_detection() {
        let reset = Wrapper(Box::new(std::io::Error::from(
            std::io::ErrorKind::ConnectionReset,
        )));
        assert!(has_closed_source(&reset));

        let denied = Wrapper(Box::new(std::io::Error::from(
            std::io::ErrorKind::PermissionDenied,
        )));
        assert!(!has_closed_source(&denied));
    }

    #[test]
    fn test_incomplete_message_is_closed() {
        let nested = Wrapper(Box::new(Wrapper(Box::new(HyperLike(
            "connection closed before message completed",
        )))));
        assert!(has_closed_source(&nested));

        let other = Wrapper(Box::new(HyperLike("invalid HTTP header parsed")));
        assert!(!has_closed_source(&other));
    }

    #[test]
    fn test_ingest_ack_deserialization() {
        let json = r#"{
            "status": "accepted",
            "accepted": 100,
            "rejected": 0,
            "batch_id": "abc-123"
        }"#;

        let ack: IngestAck = serde_json::from_str(json).unwrap();
        assert_eq!(ack.status, "accepted");
        assert_eq!(ack.accepted, 100);
        assert_eq!(ack.rejected, 0);
        assert_eq!(ack.batch_id, Some("abc-123".to_string()));
        assert!(ack.error.is_none());
    }

    #[test]
    fn test_ingest_ack_partial_deserialization() {
        let ack: IngestAck = serde_json::from_str(r#"{"status": "accepted"}"#).unwrap();
        assert_eq!(ack.accepted, 0);
        assert!(ack.batch_id.is_none());
    }
}
