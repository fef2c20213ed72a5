//! Exclusion registry.
//!
//! Types listed here are treated as serialization leaves: the codec hands
//! them to their own serde implementation instead of walking their members.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

type EncodeFn = fn(&dyn Any) -> Result<serde_json::Value, String>;
type DecodeFn = fn(&serde_json::Value, &mut dyn Any) -> Result<(), String>;

/// Native encode/decode pair for one excluded type.
#[derive(Clone, Copy)]
pub(crate) struct NativeCodec {
    pub(crate) type_name: &'static str,
    pub(crate) encode: EncodeFn,
    pub(crate) decode: DecodeFn,
}

fn encode_native<T: Serialize + 'static>(value: &dyn Any) -> Result<serde_json::Value, String> {
    let value = value
        .downcast_ref::<T>()
        .ok_or_else(|| format!("value is not a {}", std::any::type_name::<T>()))?;
    serde_json::to_value(value).map_err(|e| e.to_string())
}

fn decode_native<T: DeserializeOwned + 'static>(
    doc: &serde_json::Value,
    target: &mut dyn Any,
) -> Result<(), String> {
    let target = target
        .downcast_mut::<T>()
        .ok_or_else(|| format!("target is not a {}", std::any::type_name::<T>()))?;
    *target = T::deserialize(doc).map_err(|e| e.to_string())?;
    Ok(())
}

/// Registry of types that bypass structural walking.
#[derive(Clone, Default)]
pub struct ExclusionRegistry {
    entries: HashMap<TypeId, NativeCodec>,
}

impl ExclusionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the identifier and timestamp types used by resource
    /// descriptions: [`Uuid`] and [`DateTime<Utc>`].
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new().exclude::<Uuid>().exclude::<DateTime<Utc>>()
    }

    /// Adds `T`, returning the registry for chaining.
    #[must_use]
    pub fn exclude<T>(mut self) -> Self
    where
        T: Serialize + DeserializeOwned + Any,
    {
        self.insert::<T>();
        self
    }

    /// Adds `T`. Returns `false` if it was already registered.
    pub fn insert<T>(&mut self) -> bool
    where
        T: Serialize + DeserializeOwned + Any,
    {
        let codec = NativeCodec {
            type_name: std::any::type_name::<T>(),
            encode: encode_native::<T>,
            decode: decode_native::<T>,
        };
        self.entries.insert(TypeId::of::<T>(), codec).is_none()
    }

    /// Whether `T` is excluded.
    pub fn contains<T: Any>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    pub fn is_excluded(&self, type_id: TypeId) -> bool {
        self.entries.contains_key(&type_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of the registered types, sorted.
    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.entries.values().map(|c| c.type_name).collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn get(&self, type_id: TypeId) -> Option<&NativeCodec> {
        self.entries.get(&type_id)
    }
}

impl fmt::Debug for ExclusionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusionRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_uuid_and_timestamp() {
        let registry = ExclusionRegistry::with_defaults();
        assert_eq!(registry.len(), 2);
        assert!(registry.contains::<Uuid>());
        assert!(registry.contains::<DateTime<Utc>>());
        assert!(!registry.contains::<String>());
    }

    #[test]
    fn test_insert_reports_duplicates() {
        let mut registry = ExclusionRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.insert::<Uuid>());
        assert!(!registry.insert::<Uuid>());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_native_encode_uses_canonical_form() {
        let registry = ExclusionRegistry::with_defaults();
        let id = Uuid::parse_str("6f1c1b7e-58a4-4a8f-9d0c-2a4f0f4e9b11").unwrap();
        let native = registry.get(TypeId::of::<Uuid>()).unwrap();

        let encoded = (native.encode)(&id).unwrap();
        assert_eq!(encoded, serde_json::json!("6f1c1b7e-58a4-4a8f-9d0c-2a4f0f4e9b11"));

        let mut decoded = Uuid::nil();
        (native.decode)(&encoded, &mut decoded).unwrap();
        assert_eq!(decoded, id);
    }

    #[test]
    fn test_native_encode_rejects_wrong_type() {
        let registry = ExclusionRegistry::with_defaults();
        let native = registry.get(TypeId::of::<Uuid>()).unwrap();
        let err = (native.encode)(&42u32).unwrap_err();
        assert!(err.contains("uuid"));
    }

    #[test]
    fn test_debug_lists_type_names() {
        let registry = ExclusionRegistry::new().exclude::<Uuid>();
        let rendered = format!("{:?}", registry);
        assert!(rendered.contains("Uuid"));
    }
}
