//! Transport records.
//!
//! An [`Envelope`] wraps one resource's canonical document together with the
//! identifying metadata the ingestion service indexes on, plus a correlation
//! block tying it back to the enumeration job that produced it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::codec::{Codec, CodecError, Reflect};

/// Identifying metadata for one resource, supplied by enumeration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMeta {
    /// Unique resource identifier (ARN, resource ID, self link)
    pub id: String,

    /// Display name
    pub name: String,

    /// Resource type tag, e.g. `AWS::EC2::Instance`
    pub resource_type: String,

    /// Cloud location (region or zone)
    #[serde(default)]
    pub location: String,

    /// Owning group (resource group, project)
    #[serde(default)]
    pub resource_group: String,

    /// Parent subscription or account
    #[serde(default)]
    pub subscription_id: String,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl ResourceMeta {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_resource_group(mut self, group: impl Into<String>) -> Self {
        self.resource_group = group.into();
        self
    }

    pub fn with_subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.subscription_id = subscription_id.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Per-job correlation data, fixed for the lifetime of a sender.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobContext {
    pub job_id: String,

    /// Resource type the job enumerates
    pub resource_type: String,

    /// Identifier of the source (connection, integration) being scanned
    pub source_id: String,

    pub account_id: String,

    /// What started the job, e.g. `scheduled` or `manual`
    pub trigger_type: String,

    pub retry_count: u32,
}

impl JobContext {
    pub fn new(job_id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    /// Correlation block stamped with the current time.
    pub fn correlate(&self) -> Correlation {
        Correlation {
            job_id: self.job_id.clone(),
            resource_type: self.resource_type.clone(),
            source_id: self.source_id.clone(),
            account_id: self.account_id.clone(),
            described_at: Utc::now(),
            trigger_type: self.trigger_type.clone(),
            retry_count: self.retry_count,
        }
    }
}

/// Correlation block carried on every envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub job_id: String,
    pub resource_type: String,
    pub source_id: String,
    pub account_id: String,

    /// When the resource was described
    pub described_at: DateTime<Utc>,

    pub trigger_type: String,
    pub retry_count: u32,
}

/// One resource ready for transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,
    pub name: String,
    pub resource_type: String,
    pub location: String,
    pub resource_group: String,
    pub subscription_id: String,

    /// Canonical document, already serialized to a JSON string
    pub description: String,

    pub metadata: HashMap<String, String>,
    pub tags: HashMap<String, String>,
    pub job: Correlation,
}

impl Envelope {
    /// Wraps an already encoded description.
    pub fn new(meta: ResourceMeta, description: String, job: &JobContext) -> Self {
        Self {
            id: meta.id,
            name: meta.name,
            resource_type: meta.resource_type,
            location: meta.location,
            resource_group: meta.resource_group,
            subscription_id: meta.subscription_id,
            description,
            metadata: meta.metadata,
            tags: meta.tags,
            job: job.correlate(),
        }
    }

    /// Encodes `resource` with `codec` and wraps the result.
    ///
    /// # Errors
    ///
    /// Returns the codec error unchanged; a description that cannot be
    /// encoded completely is never shipped.
    pub fn describe(
        codec: &Codec,
        meta: ResourceMeta,
        job: &JobContext,
        resource: &dyn Reflect,
    ) -> Result<Self, CodecError> {
        let description = codec.encode_to_string(resource)?;
        Ok(Self::new(meta, description, job))
    }
}

/// Batch request body sent to the ingestion endpoint.
#[derive(Debug, Serialize)]
pub struct BatchRequest<'a> {
    /// Client-generated batch ID, fresh per attempt
    pub batch_id: Uuid,

    /// Envelopes in enqueue order
    pub envelopes: &'a [Envelope],
}

impl<'a> BatchRequest<'a> {
    pub fn new(envelopes: &'a [Envelope]) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            envelopes,
        }
    }

    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FieldTag;

    #[derive(Default)]
    struct Queue {
        url: String,
        fifo: bool,
    }

    crate::reflect_record!(Queue {
        url => FieldTag::named("QueueUrl"),
        fifo => FieldTag::named("Fifo").omit_empty(),
    });

    struct Secret;

    impl Default for Secret {
        fn default() -> Self {
            Secret
        }
    }

    crate::reflect_opaque!(Secret);

    fn job() -> JobContext {
        JobContext {
            job_id: "job-42".into(),
            resource_type: "AWS::SQS::Queue".into(),
            source_id: "src-1".into(),
            account_id: "111122223333".into(),
            trigger_type: "scheduled".into(),
            retry_count: 1,
        }
    }

    #[test]
    fn test_meta_builder() {
        let meta = ResourceMeta::new("arn:q", "orders", "AWS::SQS::Queue")
            .with_location("eu-west-1")
            .with_resource_group("rg")
            .with_subscription("111122223333")
            .with_metadata("partition", "aws")
            .with_tag("team", "payments");

        assert_eq!(meta.location, "eu-west-1");
        assert_eq!(meta.resource_group, "rg");
        assert_eq!(meta.subscription_id, "111122223333");
        assert_eq!(meta.metadata.get("partition").map(String::as_str), Some("aws"));
        assert_eq!(meta.tags.get("team").map(String::as_str), Some("payments"));
    }

    #[test]
    fn test_describe_embeds_canonical_document() {
        let queue = Queue {
            url: "https://sqs/orders".into(),
            fifo: false,
        };
        let meta = ResourceMeta::new("arn:q", "orders", "AWS::SQS::Queue");
        let envelope = Envelope::describe(&Codec::default(), meta, &job(), &queue).unwrap();

        assert_eq!(envelope.id, "arn:q");
        assert_eq!(envelope.description, r#"{"QueueUrl":"https://sqs/orders"}"#);
        assert_eq!(envelope.job.job_id, "job-42");
        assert_eq!(envelope.job.retry_count, 1);
        assert_eq!(envelope.job.trigger_type, "scheduled");
    }

    #[test]
    fn test_describe_surfaces_codec_error() {
        let meta = ResourceMeta::new("id", "secret", "Vendor::Secret");
        let result = Envelope::describe(&Codec::default(), meta, &job(), &Secret);
        assert!(matches!(result, Err(CodecError::Opaque { .. })));
    }

    #[test]
    fn test_batch_request_serialization() {
        let envelope = Envelope::new(
            ResourceMeta::new("a", "A", "T").with_tag("k", "v"),
            "{}".into(),
            &job(),
        );
        let envelopes = vec![envelope];
        let request = BatchRequest::new(&envelopes);
        assert_eq!(request.len(), 1);
        assert!(!request.is_empty());

        let json = serde_json::to_value(&request).unwrap();
        assert!(json["batch_id"].is_string());
        assert_eq!(json["envelopes"][0]["id"], "a");
        assert_eq!(json["envelopes"][0]["description"], "{}");
        assert_eq!(json["envelopes"][0]["tags"]["k"], "v");
        assert_eq!(json["envelopes"][0]["job"]["account_id"], "111122223333");
    }
}
