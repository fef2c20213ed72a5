//! Integration tests for the HTTP link using wiremock
//!
//! These tests verify the wire format, bearer authentication, and the
//! mapping of HTTP failures onto transport errors.

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{bearer_token, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use resource_sender::client::{HttpConnector, StaticToken, INGEST_PATH, STATUS_PATH};
use resource_sender::envelope::{Envelope, JobContext, ResourceMeta};
use resource_sender::job::JobStatus;
use resource_sender::transport::{Connector, Link, TransportError};

fn job() -> JobContext {
    JobContext {
        job_id: "job-9".into(),
        resource_type: "AWS::EC2::Instance".into(),
        source_id: "conn-1".into(),
        account_id: "111122223333".into(),
        trigger_type: "scheduled".into(),
        retry_count: 0,
    }
}

fn envelopes(n: usize) -> Vec<Envelope> {
    (0..n)
        .map(|i| {
            Envelope::new(
                ResourceMeta::new(format!("i-{}", i), format!("web-{}", i), "AWS::EC2::Instance")
                    .with_location("eu-west-1")
                    .with_tag("env", "prod"),
                format!(r#"{{"InstanceId":"i-{}"}}"#, i),
                &job(),
            )
        })
        .collect()
}

fn connector(uri: &str, token: Option<&str>) -> HttpConnector {
    HttpConnector::with_settings(
        uri,
        Duration::from_secs(5),
        StaticToken(token.map(str::to_string)),
    )
}

mod ingest_tests {
    use super::*;

    /// Batches are posted with the bearer token and envelopes in order
    #[tokio::test]
    async fn test_transmit_posts_ordered_batch_with_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(INGEST_PATH))
            .and(bearer_token("secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "accepted",
                "accepted": 3,
                "rejected": 0
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut link = connector(&server.uri(), Some("secret-token"))
            .connect()
            .await
            .expect("connect should succeed");
        let ack = link
            .transmit(&envelopes(3))
            .await
            .expect("transmit should succeed");
        assert_eq!(ack.accepted, 3);

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body["batch_id"].is_string());

        let ids: Vec<&str> = body["envelopes"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["i-0", "i-1", "i-2"]);

        let first = &body["envelopes"][0];
        assert_eq!(first["description"], r#"{"InstanceId":"i-0"}"#);
        assert_eq!(first["location"], "eu-west-1");
        assert_eq!(first["tags"]["env"], "prod");
        assert_eq!(first["job"]["job_id"], "job-9");
        assert_eq!(first["job"]["trigger_type"], "scheduled");
        assert!(first["job"]["described_at"].is_string());
    }

    /// Server errors map to a status error that does not require reconnect
    #[tokio::test]
    async fn test_server_error_is_not_closed_connection() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(INGEST_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let mut link = connector(&server.uri(), None).connect().await.unwrap();
        let err = link.transmit(&envelopes(1)).await.unwrap_err();

        match &err {
            TransportError::Status { code, message } => {
                assert_eq!(code.as_u16(), 503);
                assert_eq!(message, "overloaded");
            }
            other => panic!("expected status error, got {:?}", other),
        }
        assert!(!err.is_connection_closed());
    }

    /// A success status with an unreadable body still accepts the batch
    #[tokio::test]
    async fn test_malformed_ack_counts_as_accepted() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(INGEST_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let mut link = connector(&server.uri(), None).connect().await.unwrap();
        let ack = link
            .transmit(&envelopes(2))
            .await
            .expect("2xx must not fail the batch");
        assert_eq!(ack.accepted, 2);
        assert_eq!(ack.rejected, 0);
    }

    /// An empty success body is an acknowledgement of the whole batch
    #[tokio::test]
    async fn test_empty_ack_counts_as_accepted() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(INGEST_PATH))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let mut link = connector(&server.uri(), None).connect().await.unwrap();
        let ack = link.transmit(&envelopes(3)).await.unwrap();
        assert_eq!(ack.accepted, 3);
    }

    /// A refused connection is a closed-connection condition
    #[tokio::test]
    async fn test_refused_connection_is_closed() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut link = connector(&format!("http://127.0.0.1:{}", port), None)
            .connect()
            .await
            .unwrap();
        let err = link.transmit(&envelopes(1)).await.unwrap_err();
        assert!(err.is_connection_closed(), "got {:?}", err);
    }
}

mod status_tests {
    use super::*;

    /// Job statuses are posted to the status endpoint
    #[tokio::test]
    async fn test_report_posts_job_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(STATUS_PATH))
            .and(bearer_token("secret-token"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut link = connector(&server.uri(), Some("secret-token"))
            .connect()
            .await
            .unwrap();
        link.report(&JobStatus::succeeded(&job(), 42)).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["job_id"], "job-9");
        assert_eq!(body["state"], "succeeded");
        assert_eq!(body["resource_count"], 42);
    }

    /// A rejected status surfaces as a status error
    #[tokio::test]
    async fn test_report_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(STATUS_PATH))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .mount(&server)
            .await;

        let mut link = connector(&server.uri(), None).connect().await.unwrap();
        let err = link
            .report(&JobStatus::succeeded(&job(), 0))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Status { .. }));
    }
}
