use serde_json::Value;

use super::reflect::{NodeMut, Reflect};
use super::registry::ExclusionRegistry;
use super::{CodecError, Path};

pub(crate) struct Decoder<'r> {
    registry: &'r ExclusionRegistry,
}

impl<'r> Decoder<'r> {
    pub(crate) fn new(registry: &'r ExclusionRegistry) -> Self {
        Self { registry }
    }

    pub(crate) fn decode(
        &self,
        doc: &Value,
        target: &mut dyn Reflect,
        path: &mut Path,
    ) -> Result<(), CodecError> {
        let type_name = target.type_name();

        if let Some(native) = self.registry.get(target.as_any().type_id()) {
            return (native.decode)(doc, target.as_any_mut()).map_err(|message| {
                CodecError::Native {
                    type_name: native.type_name,
                    path: path.to_string(),
                    message,
                }
            });
        }

        match target.reflect_mut() {
            NodeMut::Scalar(slot) => {
                // null leaves the zero value in place
                if doc.is_null() {
                    return Ok(());
                }
                slot.assign(doc).map_err(|e| CodecError::TypeMismatch {
                    path: path.to_string(),
                    expected: type_name,
                    message: e.to_string(),
                })
            }
            NodeMut::Optional(slot) => {
                if doc.is_null() {
                    slot.clear();
                    Ok(())
                } else {
                    self.decode(doc, slot.fill(), path)
                }
            }
            NodeMut::Sequence(slot) => {
                if doc.is_null() {
                    slot.clear();
                    return Ok(());
                }
                let items = doc
                    .as_array()
                    .ok_or_else(|| mismatch(path, type_name, "array", doc))?;
                slot.resize_default(items.len())
                    .map_err(|message| CodecError::TypeMismatch {
                        path: path.to_string(),
                        expected: type_name,
                        message,
                    })?;
                for (index, item) in items.iter().enumerate() {
                    path.push_index(index);
                    let element = slot.item_mut(index).ok_or_else(|| CodecError::TypeMismatch {
                        path: path.to_string(),
                        expected: type_name,
                        message: format!("no element at index {}", index),
                    })?;
                    self.decode(item, element, path)?;
                    path.pop();
                }
                Ok(())
            }
            NodeMut::Map(slot) => {
                if doc.is_null() {
                    slot.clear();
                    return Ok(());
                }
                let entries = doc
                    .as_object()
                    .ok_or_else(|| mismatch(path, type_name, "object", doc))?;
                slot.clear();
                for (key, item) in entries {
                    let entry = slot
                        .entry_default(key)
                        .map_err(|message| CodecError::TypeMismatch {
                            path: path.to_string(),
                            expected: type_name,
                            message,
                        })?;
                    path.push_key(key);
                    self.decode(item, entry, path)?;
                    path.pop();
                }
                Ok(())
            }
            NodeMut::Record(fields) => {
                if doc.is_null() {
                    return Ok(());
                }
                let members = doc
                    .as_object()
                    .ok_or_else(|| mismatch(path, type_name, "object", doc))?;
                for field in fields {
                    if field.tag.is_hidden() {
                        continue;
                    }
                    let key = field.tag.key_or(field.name);
                    let Some(item) = members.get(key) else {
                        continue;
                    };
                    path.push_key(key);
                    self.decode(item, field.value, path)?;
                    path.pop();
                }
                Ok(())
            }
            NodeMut::Opaque => Err(CodecError::Opaque {
                type_name,
                path: path.to_string(),
            }),
        }
    }
}

fn mismatch(path: &Path, expected: &'static str, kind: &str, found: &Value) -> CodecError {
    let found = match found {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    CodecError::TypeMismatch {
        path: path.to_string(),
        expected,
        message: format!("expected JSON {}, found {}", kind, found),
    }
}
