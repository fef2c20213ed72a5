//! Resource Sender Library
//!
//! This library provides the output pipeline of a cloud resource
//! enumerator: resource values are encoded into canonical JSON documents,
//! wrapped in envelopes, and streamed in batches to an ingestion service.
//!
//! - **codec**: Universal value codec with omit-empty tags and an exclusion registry
//! - **envelope**: Envelope, correlation block, and batch request records
//! - **buffer**: Batch thresholds, pending batch, and flush decisions
//! - **transport**: Wire contract between the delivery worker and the service
//! - **client**: HTTP implementation of the wire contract
//! - **connection**: Connection state, reconnect policy, and backoff
//! - **sender**: Producer handles and the single delivery worker
//! - **job**: Job-level status reports
//! - **config**: Environment-based configuration
//! - **logging**: Tracing subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use resource_sender::codec::FieldTag;
//! use resource_sender::config::Config;
//! use resource_sender::envelope::{JobContext, ResourceMeta};
//! use resource_sender::job::JobStatus;
//! use resource_sender::sender::ResourceSender;
//!
//! #[derive(Default)]
//! struct Bucket {
//!     name: String,
//!     region: String,
//!     versioning: bool,
//! }
//!
//! resource_sender::reflect_record!(Bucket {
//!     name => FieldTag::named("Name"),
//!     region => FieldTag::named("Region"),
//!     versioning => FieldTag::named("Versioning").omit_empty(),
//! });
//!
//! #[tokio::main]
//! async fn main() {
//!     resource_sender::logging::init_tracing();
//!
//!     // Load configuration from environment
//!     let config = Config::from_env().expect("Failed to load config");
//!     let job = JobContext::new("job-1", "AWS::S3::Bucket");
//!     let sender = ResourceSender::from_config(&config, job.clone());
//!
//!     let bucket = Bucket {
//!         name: "logs".into(),
//!         region: "eu-west-1".into(),
//!         versioning: true,
//!     };
//!     let meta = ResourceMeta::new("arn:aws:s3:::logs", "logs", "AWS::S3::Bucket")
//!         .with_location("eu-west-1");
//!     sender.send_resource(meta, &bucket).await.expect("encode failed");
//!
//!     sender
//!         .report_status(JobStatus::succeeded(&job, 1))
//!         .await
//!         .ok();
//!     let ids = sender.finish().await;
//!     println!("produced {} resources", ids.len());
//! }
//! ```

// Module declarations
pub mod buffer;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod envelope;
pub mod job;
pub mod logging;
pub mod sender;
pub mod transport;

// Re-export commonly used types at crate root for convenience
pub use buffer::{DeliveryStats, SenderConfig};
pub use client::{HttpConnector, HttpLink, StaticToken, TokenSource};
pub use codec::{Codec, CodecError, ExclusionRegistry, FieldTag, Reflect};
pub use config::{Config, ConfigError};
pub use connection::ReconnectPolicy;
pub use envelope::{Envelope, JobContext, ResourceMeta};
pub use job::{JobState, JobStatus};
pub use sender::{DeliveryReport, ResourceSender, SenderError, SenderHandle};
pub use transport::{Connector, IngestAck, Link, TransportError};
