use serde_json::{Map, Number, Value};
use tracing::debug;

use super::reflect::{Node, Reflect, Scalar};
use super::registry::ExclusionRegistry;
use super::{CodecError, Path};

pub(crate) struct Encoder<'r> {
    registry: &'r ExclusionRegistry,
}

impl<'r> Encoder<'r> {
    pub(crate) fn new(registry: &'r ExclusionRegistry) -> Self {
        Self { registry }
    }

    pub(crate) fn encode(&self, value: &dyn Reflect, path: &mut Path) -> Result<Value, CodecError> {
        if let Some(native) = self.registry.get(value.as_any().type_id()) {
            return (native.encode)(value.as_any()).map_err(|message| CodecError::Native {
                type_name: native.type_name,
                path: path.to_string(),
                message,
            });
        }

        match value.reflect() {
            Node::Scalar(scalar) => encode_scalar(scalar, path),
            Node::Optional(None) => Ok(Value::Null),
            // Nested optionality unwinds one level per call.
            Node::Optional(Some(inner)) => self.encode(inner, path),
            Node::Sequence(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    if !self.is_introspectable(item) {
                        debug!(
                            path = %path,
                            index = index,
                            type_name = item.type_name(),
                            "Skipping sequence element without inspectable structure"
                        );
                        continue;
                    }
                    path.push_index(index);
                    let encoded = self.encode(item, path)?;
                    path.pop();
                    out.push(encoded);
                }
                Ok(Value::Array(out))
            }
            Node::Map(entries) => {
                let mut out = Map::new();
                for (key, item) in entries {
                    path.push_key(&key);
                    let encoded = self.encode(item, path)?;
                    path.pop();
                    out.insert(key.into_owned(), encoded);
                }
                Ok(Value::Object(out))
            }
            Node::Record(fields) => {
                let mut out = Map::new();
                for field in fields {
                    if field.tag.is_hidden() {
                        continue;
                    }
                    if field.tag.is_omit_empty() && self.is_empty(field.value) {
                        continue;
                    }
                    let key = field.tag.key_or(field.name);
                    path.push_key(key);
                    let encoded = self.encode(field.value, path)?;
                    path.pop();
                    out.insert(key.to_owned(), encoded);
                }
                Ok(Value::Object(out))
            }
            Node::Opaque => Err(CodecError::Opaque {
                type_name: value.type_name(),
                path: path.to_string(),
            }),
        }
    }

    fn is_introspectable(&self, value: &dyn Reflect) -> bool {
        self.registry.is_excluded(value.as_any().type_id())
            || !matches!(value.reflect(), Node::Opaque)
    }

    /// Zero value of the member's kind. Records and excluded leaves are never empty.
    fn is_empty(&self, value: &dyn Reflect) -> bool {
        if self.registry.is_excluded(value.as_any().type_id()) {
            return false;
        }
        match value.reflect() {
            Node::Scalar(scalar) => scalar.is_zero(),
            Node::Optional(inner) => inner.is_none(),
            Node::Sequence(items) => items.is_empty(),
            Node::Map(entries) => entries.is_empty(),
            Node::Record(_) | Node::Opaque => false,
        }
    }
}

fn encode_scalar(scalar: Scalar<'_>, path: &Path) -> Result<Value, CodecError> {
    Ok(match scalar {
        Scalar::Bool(b) => Value::Bool(b),
        Scalar::Int(n) => Value::Number(n.into()),
        Scalar::Uint(n) => Value::Number(n.into()),
        Scalar::Float(f) => Value::Number(Number::from_f64(f).ok_or_else(|| {
            CodecError::NonFiniteFloat {
                path: path.to_string(),
            }
        })?),
        Scalar::Str(s) => Value::String(s.to_owned()),
        Scalar::Json(value) => value.clone(),
    })
}
