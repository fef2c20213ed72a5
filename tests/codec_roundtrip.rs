//! Property-based tests for the value codec using proptest
//!
//! These tests verify that decoding an encoded value reproduces it, and
//! that omit-empty members appear in the document exactly when non-zero.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use resource_sender::codec::{Codec, FieldTag};
use resource_sender::reflect_record;

#[derive(Debug, Clone, Default, PartialEq)]
struct Attachment {
    device: String,
    size_gib: u32,
    encrypted: bool,
}

reflect_record!(Attachment {
    device => FieldTag::named("Device"),
    size_gib => FieldTag::named("SizeGiB"),
    encrypted => FieldTag::named("Encrypted").omit_empty(),
});

#[derive(Debug, Clone, Default, PartialEq)]
struct Instance {
    id: Uuid,
    name: String,
    launched_at: DateTime<Utc>,
    cpu_credits: i64,
    utilisation: f64,
    owner: Option<String>,
    root: Option<Box<Attachment>>,
    attachments: Vec<Attachment>,
    labels: BTreeMap<String, String>,
    notes: Vec<String>,
}

reflect_record!(Instance {
    id => FieldTag::named("InstanceId"),
    name => FieldTag::named("Name"),
    launched_at => FieldTag::named("LaunchTime"),
    cpu_credits => FieldTag::named("CpuCredits"),
    utilisation => FieldTag::named("Utilisation").omit_empty(),
    owner => FieldTag::named("Owner"),
    root => FieldTag::named("RootDevice").omit_empty(),
    attachments => FieldTag::named("Attachments"),
    labels => FieldTag::named("Labels").omit_empty(),
    notes => FieldTag::named("Notes").omit_empty(),
});

prop_compose! {
    fn arb_attachment()(
        device in "/dev/[a-z]{3,5}",
        size_gib in any::<u32>(),
        encrypted in any::<bool>(),
    ) -> Attachment {
        Attachment { device, size_gib, encrypted }
    }
}

prop_compose! {
    fn arb_timestamp()(secs in 0i64..4_102_444_800, nanos in 0u32..1_000_000_000) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, nanos).unwrap_or_default()
    }
}

prop_compose! {
    fn arb_instance()(
        id in any::<u128>(),
        name in ".{0,24}",
        launched_at in arb_timestamp(),
        cpu_credits in any::<i64>(),
        utilisation in -1.0e9f64..1.0e9,
        owner in proptest::option::of("[a-z]{1,12}"),
        root in proptest::option::of(arb_attachment()),
        attachments in proptest::collection::vec(arb_attachment(), 0..5),
        labels in proptest::collection::btree_map("[a-z]{1,8}", ".{0,12}", 0..6),
        notes in proptest::collection::vec(".{0,16}", 0..4),
    ) -> Instance {
        Instance {
            id: Uuid::from_u128(id),
            name,
            launched_at,
            cpu_credits,
            utilisation,
            owner,
            root: root.map(Box::new),
            attachments,
            labels,
            notes,
        }
    }
}

proptest! {
    #[test]
    fn decode_of_encode_is_identity(instance in arb_instance()) {
        let codec = Codec::default();
        let bytes = codec.encode(&instance).unwrap();
        let decoded: Instance = codec.decode_new(&bytes).unwrap();
        prop_assert_eq!(decoded, instance);
    }

    #[test]
    fn omit_empty_members_present_only_when_non_zero(instance in arb_instance()) {
        let doc = Codec::default().to_document(&instance).unwrap();
        let object = doc.as_object().unwrap();

        prop_assert_eq!(object.contains_key("Utilisation"), instance.utilisation != 0.0);
        prop_assert_eq!(object.contains_key("RootDevice"), instance.root.is_some());
        prop_assert_eq!(object.contains_key("Labels"), !instance.labels.is_empty());
        prop_assert_eq!(object.contains_key("Notes"), !instance.notes.is_empty());

        // Untagged-for-omission members are always present
        prop_assert!(object.contains_key("Owner"));
        prop_assert!(object.contains_key("Attachments"));

        for (attachment, encoded) in instance.attachments.iter().zip(object["Attachments"].as_array().unwrap()) {
            prop_assert_eq!(encoded.get("Encrypted").is_some(), attachment.encrypted);
        }
    }

    #[test]
    fn excluded_types_use_native_encoding(instance in arb_instance()) {
        let doc = Codec::default().to_document(&instance).unwrap();

        prop_assert_eq!(&doc["InstanceId"], &serde_json::to_value(instance.id).unwrap());
        prop_assert_eq!(&doc["LaunchTime"], &serde_json::to_value(instance.launched_at).unwrap());
        prop_assert!(matches!(doc["InstanceId"], Value::String(_)));
    }
}
