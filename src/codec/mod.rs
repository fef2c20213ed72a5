//! Universal value codec.
//!
//! Encodes any [`Reflect`] value into a canonical JSON document that contains
//! every reachable member, and decodes such documents back into a target
//! value. Types registered in the [`ExclusionRegistry`] are handed to their
//! own serde implementation instead of being walked.

mod decode;
mod encode;
mod reflect;
mod registry;

pub use reflect::{
    AsAny, Field, FieldMut, FieldTag, MapSlot, Node, NodeMut, OptionalSlot, Reflect, Scalar,
    ScalarSlot, SequenceSlot,
};
pub use registry::ExclusionRegistry;

use std::fmt;

use decode::Decoder;
use encode::Encoder;

/// Errors raised while encoding or decoding a value.
///
/// Paths use `$` for the root, `.Key` for record members and map entries,
/// and `[n]` for sequence elements.
#[derive(Debug)]
pub enum CodecError {
    /// Value has no inspectable structure and its type is not excluded
    Opaque {
        type_name: &'static str,
        path: String,
    },

    /// NaN or infinite float, which JSON cannot represent
    NonFiniteFloat { path: String },

    /// Document shape does not match the target type
    TypeMismatch {
        path: String,
        expected: &'static str,
        message: String,
    },

    /// An excluded type's own serialization failed
    Native {
        type_name: &'static str,
        path: String,
        message: String,
    },

    /// Malformed JSON input or output
    Json(serde_json::Error),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Opaque { type_name, path } => {
                write!(f, "cannot introspect value of type {} at {}", type_name, path)
            }
            CodecError::NonFiniteFloat { path } => {
                write!(f, "non-finite float at {} cannot be encoded", path)
            }
            CodecError::TypeMismatch {
                path,
                expected,
                message,
            } => write!(f, "expected {} at {}: {}", expected, path, message),
            CodecError::Native {
                type_name,
                path,
                message,
            } => write!(
                f,
                "native serialization of {} failed at {}: {}",
                type_name, path, message
            ),
            CodecError::Json(e) => write!(f, "invalid JSON document: {}", e),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::Json(err)
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Location inside the document being walked.
#[derive(Debug, Clone, Default)]
pub(crate) struct Path {
    segments: Vec<Segment>,
}

impl Path {
    pub(crate) fn push_key(&mut self, key: &str) {
        self.segments.push(Segment::Key(key.to_owned()));
    }

    pub(crate) fn push_index(&mut self, index: usize) {
        self.segments.push(Segment::Index(index));
    }

    pub(crate) fn pop(&mut self) {
        self.segments.pop();
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("$")?;
        for segment in &self.segments {
            match segment {
                Segment::Key(key) => write!(f, ".{}", key)?,
                Segment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

/// Encoder/decoder bound to an exclusion registry.
///
/// # Example
///
/// ```
/// use resource_sender::codec::{Codec, FieldTag};
/// use resource_sender::reflect_record;
///
/// #[derive(Default)]
/// struct Bucket {
///     name: String,
///     versioning: bool,
///     policy: Option<String>,
/// }
///
/// reflect_record!(Bucket {
///     name => FieldTag::named("Name"),
///     versioning => FieldTag::named("Versioning").omit_empty(),
///     policy => FieldTag::named("Policy"),
/// });
///
/// let codec = Codec::default();
/// let bucket = Bucket { name: "logs".into(), ..Default::default() };
/// let json = codec.encode_to_string(&bucket).unwrap();
/// assert_eq!(json, r#"{"Name":"logs","Policy":null}"#);
/// ```
#[derive(Debug, Clone)]
pub struct Codec {
    registry: ExclusionRegistry,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(ExclusionRegistry::with_defaults())
    }
}

impl Codec {
    pub fn new(registry: ExclusionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ExclusionRegistry {
        &self.registry
    }

    /// Builds the canonical document for `value`.
    pub fn to_document(&self, value: &dyn Reflect) -> Result<serde_json::Value, CodecError> {
        Encoder::new(&self.registry).encode(value, &mut Path::default())
    }

    /// Encodes `value` as JSON bytes.
    pub fn encode(&self, value: &dyn Reflect) -> Result<Vec<u8>, CodecError> {
        let document = self.to_document(value)?;
        Ok(serde_json::to_vec(&document)?)
    }

    /// Encodes `value` as a JSON string.
    pub fn encode_to_string(&self, value: &dyn Reflect) -> Result<String, CodecError> {
        let document = self.to_document(value)?;
        Ok(serde_json::to_string(&document)?)
    }

    /// Populates `target` from a canonical document.
    ///
    /// Members whose key is missing keep their current value.
    pub fn from_document(
        &self,
        document: &serde_json::Value,
        target: &mut dyn Reflect,
    ) -> Result<(), CodecError> {
        Decoder::new(&self.registry).decode(document, target, &mut Path::default())
    }

    /// Populates `target` from JSON bytes.
    pub fn decode(&self, bytes: &[u8], target: &mut dyn Reflect) -> Result<(), CodecError> {
        let document: serde_json::Value = serde_json::from_slice(bytes)?;
        self.from_document(&document, target)
    }

    /// Decodes JSON bytes into a fresh `T`.
    pub fn decode_new<T: Reflect + Default>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        let mut target = T::default();
        self.decode(bytes, &mut target)?;
        Ok(target)
    }
}
