//! Structural view of arbitrary values.
//!
//! A [`Reflect`] implementation tells the codec what shape a value has at
//! runtime: a scalar leaf, an optional reference, an ordered sequence, a keyed
//! map, a record with tagged members, or something with no discoverable
//! structure at all. The codec walks this view instead of calling a type's own
//! `Serialize` impl, so fields a vendor type hides from default serialization
//! still reach the canonical document.

use std::any::Any;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Display;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use uuid::Uuid;

/// Type identity helpers, implemented for every `'static` type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A value the codec can walk.
///
/// Records normally implement this through [`reflect_record!`](crate::reflect_record),
/// and types without inspectable members through
/// [`reflect_opaque!`](crate::reflect_opaque).
pub trait Reflect: AsAny + Send + Sync {
    /// Read-only view used by encode.
    fn reflect(&self) -> Node<'_>;

    /// Mutable view used by decode.
    fn reflect_mut(&mut self) -> NodeMut<'_>;
}

/// Primitive leaf value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar<'a> {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(&'a str),
    /// Pre-built JSON, emitted as is.
    Json(&'a serde_json::Value),
}

impl Scalar<'_> {
    /// Whether this is the zero value of its kind.
    pub fn is_zero(&self) -> bool {
        match self {
            Scalar::Bool(b) => !*b,
            Scalar::Int(n) => *n == 0,
            Scalar::Uint(n) => *n == 0,
            Scalar::Float(f) => *f == 0.0,
            Scalar::Str(s) => s.is_empty(),
            // Only null; any other document must survive a round trip.
            Scalar::Json(value) => value.is_null(),
        }
    }
}

/// Read-only shape of a value.
pub enum Node<'a> {
    Scalar(Scalar<'a>),
    /// A reference that may be absent.
    Optional(Option<&'a dyn Reflect>),
    Sequence(Vec<&'a dyn Reflect>),
    /// Entries sorted by their string key.
    Map(Vec<(Cow<'a, str>, &'a dyn Reflect)>),
    Record(Vec<Field<'a>>),
    /// No discoverable structure; only encodable through the exclusion registry.
    Opaque,
}

/// Mutable shape of a value.
pub enum NodeMut<'a> {
    Scalar(&'a mut dyn ScalarSlot),
    Optional(&'a mut dyn OptionalSlot),
    Sequence(&'a mut dyn SequenceSlot),
    Map(&'a mut dyn MapSlot),
    Record(Vec<FieldMut<'a>>),
    Opaque,
}

/// Serialization tag attached to a record member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldTag {
    key: Option<&'static str>,
    omit_empty: bool,
    skip: bool,
    private: bool,
}

impl FieldTag {
    /// Untagged member: keyed by its own name, always emitted.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            key: None,
            omit_empty: false,
            skip: false,
            private: false,
        }
    }

    /// Member emitted under `key`.
    #[must_use]
    pub const fn named(key: &'static str) -> Self {
        Self {
            key: Some(key),
            ..Self::new()
        }
    }

    /// Member never emitted.
    #[must_use]
    pub const fn skip() -> Self {
        Self {
            skip: true,
            ..Self::new()
        }
    }

    /// Non-public member. Never emitted or populated.
    #[must_use]
    pub const fn private() -> Self {
        Self {
            private: true,
            ..Self::new()
        }
    }

    /// Drop the member when its value is the zero value of its kind.
    #[must_use]
    pub const fn omit_empty(mut self) -> Self {
        self.omit_empty = true;
        self
    }

    #[must_use]
    pub const fn is_omit_empty(&self) -> bool {
        self.omit_empty
    }

    /// True for skipped and private members.
    #[must_use]
    pub const fn is_hidden(&self) -> bool {
        self.skip || self.private
    }

    /// Output key, falling back to the member name.
    #[must_use]
    pub fn key_or<'a>(&self, name: &'a str) -> &'a str {
        match self.key {
            Some(key) => key,
            None => name,
        }
    }
}

/// A record member for encoding.
pub struct Field<'a> {
    pub name: &'static str,
    pub tag: FieldTag,
    pub value: &'a dyn Reflect,
}

impl<'a> Field<'a> {
    pub fn new(name: &'static str, tag: FieldTag, value: &'a dyn Reflect) -> Self {
        Self { name, tag, value }
    }
}

/// A record member for decoding.
pub struct FieldMut<'a> {
    pub name: &'static str,
    pub tag: FieldTag,
    pub value: &'a mut dyn Reflect,
}

impl<'a> FieldMut<'a> {
    pub fn new(name: &'static str, tag: FieldTag, value: &'a mut dyn Reflect) -> Self {
        Self { name, tag, value }
    }
}

/// Leaf that can be overwritten from a JSON value.
pub trait ScalarSlot {
    fn assign(&mut self, value: &serde_json::Value) -> Result<(), serde_json::Error>;
}

impl<T: DeserializeOwned> ScalarSlot for T {
    fn assign(&mut self, value: &serde_json::Value) -> Result<(), serde_json::Error> {
        *self = T::deserialize(value)?;
        Ok(())
    }
}

/// Optional reference that can be cleared or filled with a default payload.
pub trait OptionalSlot {
    fn clear(&mut self);
    fn fill(&mut self) -> &mut dyn Reflect;
}

/// Sequence that can be rebuilt element by element.
pub trait SequenceSlot {
    fn clear(&mut self);
    /// Reset to `len` default elements. Fixed-length sequences reject other lengths.
    fn resize_default(&mut self, len: usize) -> Result<(), String>;
    fn item_mut(&mut self, index: usize) -> Option<&mut dyn Reflect>;
}

/// Map that can be rebuilt entry by entry from string keys.
pub trait MapSlot {
    fn clear(&mut self);
    /// Fails when `key` does not parse as the map's key type.
    fn entry_default(&mut self, key: &str) -> Result<&mut dyn Reflect, String>;
}

/// Map key with a string form: anything that prints and parses.
pub trait MapKey: Display + FromStr + Send + Sync + 'static {}

impl<K> MapKey for K
where
    K: Display + FromStr + Send + Sync + 'static,
    K::Err: Display,
{
}

fn parse_key<K: MapKey>(key: &str) -> Result<K, String>
where
    K::Err: Display,
{
    key.parse::<K>()
        .map_err(|e| format!("invalid map key {:?}: {}", key, e))
}

fn sorted_entries<'a, K, T, I>(entries: I) -> Node<'a>
where
    K: MapKey + 'a,
    T: Reflect,
    I: Iterator<Item = (&'a K, &'a T)>,
{
    let mut entries: Vec<(Cow<'a, str>, &'a dyn Reflect)> = entries
        .map(|(key, value)| (Cow::Owned(key.to_string()), value as &dyn Reflect))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Node::Map(entries)
}

/// Implements [`Reflect`] for a record by listing its members and their tags.
///
/// ```
/// use resource_sender::codec::FieldTag;
/// use resource_sender::reflect_record;
///
/// #[derive(Default)]
/// struct Disk {
///     size_gb: u32,
///     kms_key: String,
/// }
///
/// reflect_record!(Disk {
///     size_gb => FieldTag::named("SizeGB"),
///     kms_key => FieldTag::named("KmsKeyId").omit_empty(),
/// });
/// ```
#[macro_export]
macro_rules! reflect_record {
    ($ty:ty { $($field:ident => $tag:expr),* $(,)? }) => {
        impl $crate::codec::Reflect for $ty {
            fn reflect(&self) -> $crate::codec::Node<'_> {
                $crate::codec::Node::Record(vec![
                    $($crate::codec::Field::new(stringify!($field), $tag, &self.$field),)*
                ])
            }

            fn reflect_mut(&mut self) -> $crate::codec::NodeMut<'_> {
                $crate::codec::NodeMut::Record(vec![
                    $($crate::codec::FieldMut::new(stringify!($field), $tag, &mut self.$field),)*
                ])
            }
        }
    };
}

/// Implements [`Reflect`] for a type with no inspectable members.
///
/// Such values can only be encoded once the type is added to the
/// [`ExclusionRegistry`](crate::codec::ExclusionRegistry).
#[macro_export]
macro_rules! reflect_opaque {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::codec::Reflect for $ty {
                fn reflect(&self) -> $crate::codec::Node<'_> {
                    $crate::codec::Node::Opaque
                }

                fn reflect_mut(&mut self) -> $crate::codec::NodeMut<'_> {
                    $crate::codec::NodeMut::Opaque
                }
            }
        )+
    };
}

macro_rules! reflect_scalar {
    ($($ty:ty => |$v:ident| $scalar:expr),* $(,)?) => {
        $(
            impl Reflect for $ty {
                fn reflect(&self) -> Node<'_> {
                    let $v = self;
                    Node::Scalar($scalar)
                }

                fn reflect_mut(&mut self) -> NodeMut<'_> {
                    NodeMut::Scalar(self)
                }
            }
        )*
    };
}

reflect_scalar! {
    bool => |v| Scalar::Bool(*v),
    i8 => |v| Scalar::Int(i64::from(*v)),
    i16 => |v| Scalar::Int(i64::from(*v)),
    i32 => |v| Scalar::Int(i64::from(*v)),
    i64 => |v| Scalar::Int(*v),
    isize => |v| Scalar::Int(*v as i64),
    u8 => |v| Scalar::Uint(u64::from(*v)),
    u16 => |v| Scalar::Uint(u64::from(*v)),
    u32 => |v| Scalar::Uint(u64::from(*v)),
    u64 => |v| Scalar::Uint(*v),
    usize => |v| Scalar::Uint(*v as u64),
    f32 => |v| Scalar::Float(f64::from(*v)),
    f64 => |v| Scalar::Float(*v),
    String => |v| Scalar::Str(v.as_str()),
    serde_json::Value => |v| Scalar::Json(v),
}

crate::reflect_opaque!(Uuid, DateTime<Utc>);

impl<T: Reflect + Default> Reflect for Option<T> {
    fn reflect(&self) -> Node<'_> {
        Node::Optional(self.as_ref().map(|value| value as &dyn Reflect))
    }

    fn reflect_mut(&mut self) -> NodeMut<'_> {
        NodeMut::Optional(self)
    }
}

impl<T: Reflect + Default> OptionalSlot for Option<T> {
    fn clear(&mut self) {
        *self = None;
    }

    fn fill(&mut self) -> &mut dyn Reflect {
        self.get_or_insert_with(T::default)
    }
}

// A box is a reference that is never absent.
impl<T: Reflect + Default> Reflect for Box<T> {
    fn reflect(&self) -> Node<'_> {
        Node::Optional(Some(&**self))
    }

    fn reflect_mut(&mut self) -> NodeMut<'_> {
        NodeMut::Optional(self)
    }
}

impl<T: Reflect + Default> OptionalSlot for Box<T> {
    fn clear(&mut self) {
        **self = T::default();
    }

    fn fill(&mut self) -> &mut dyn Reflect {
        &mut **self
    }
}

// Never absent, like a box. Decoding detaches a shared payload before writing.
impl<T: Reflect + Default + Clone> Reflect for Arc<T> {
    fn reflect(&self) -> Node<'_> {
        Node::Optional(Some(&**self))
    }

    fn reflect_mut(&mut self) -> NodeMut<'_> {
        NodeMut::Optional(self)
    }
}

impl<T: Reflect + Default + Clone> OptionalSlot for Arc<T> {
    fn clear(&mut self) {
        *self = Arc::new(T::default());
    }

    fn fill(&mut self) -> &mut dyn Reflect {
        Arc::<T>::make_mut(self)
    }
}

impl<T: Reflect + Default> Reflect for Vec<T> {
    fn reflect(&self) -> Node<'_> {
        Node::Sequence(self.iter().map(|item| item as &dyn Reflect).collect())
    }

    fn reflect_mut(&mut self) -> NodeMut<'_> {
        NodeMut::Sequence(self)
    }
}

impl<T: Reflect + Default> SequenceSlot for Vec<T> {
    fn clear(&mut self) {
        Vec::clear(self);
    }

    fn resize_default(&mut self, len: usize) -> Result<(), String> {
        Vec::clear(self);
        self.resize_with(len, T::default);
        Ok(())
    }

    fn item_mut(&mut self, index: usize) -> Option<&mut dyn Reflect> {
        self.get_mut(index).map(|item| item as &mut dyn Reflect)
    }
}

impl<T: Reflect + Default> Reflect for VecDeque<T> {
    fn reflect(&self) -> Node<'_> {
        Node::Sequence(self.iter().map(|item| item as &dyn Reflect).collect())
    }

    fn reflect_mut(&mut self) -> NodeMut<'_> {
        NodeMut::Sequence(self)
    }
}

impl<T: Reflect + Default> SequenceSlot for VecDeque<T> {
    fn clear(&mut self) {
        VecDeque::clear(self);
    }

    fn resize_default(&mut self, len: usize) -> Result<(), String> {
        VecDeque::clear(self);
        self.resize_with(len, T::default);
        Ok(())
    }

    fn item_mut(&mut self, index: usize) -> Option<&mut dyn Reflect> {
        self.get_mut(index).map(|item| item as &mut dyn Reflect)
    }
}

impl<T: Reflect + Default, const N: usize> Reflect for [T; N] {
    fn reflect(&self) -> Node<'_> {
        Node::Sequence(self.iter().map(|item| item as &dyn Reflect).collect())
    }

    fn reflect_mut(&mut self) -> NodeMut<'_> {
        NodeMut::Sequence(self)
    }
}

// Null resets every element; the length never changes.
impl<T: Reflect + Default, const N: usize> SequenceSlot for [T; N] {
    fn clear(&mut self) {
        self.iter_mut().for_each(|item| *item = T::default());
    }

    fn resize_default(&mut self, len: usize) -> Result<(), String> {
        if len != N {
            return Err(format!("expected {} elements, found {}", N, len));
        }
        SequenceSlot::clear(self);
        Ok(())
    }

    fn item_mut(&mut self, index: usize) -> Option<&mut dyn Reflect> {
        self.get_mut(index).map(|item| item as &mut dyn Reflect)
    }
}

impl<K, T> Reflect for HashMap<K, T>
where
    K: MapKey + Eq + Hash,
    K::Err: Display,
    T: Reflect + Default,
{
    fn reflect(&self) -> Node<'_> {
        sorted_entries(self.iter())
    }

    fn reflect_mut(&mut self) -> NodeMut<'_> {
        NodeMut::Map(self)
    }
}

impl<K, T> MapSlot for HashMap<K, T>
where
    K: MapKey + Eq + Hash,
    K::Err: Display,
    T: Reflect + Default,
{
    fn clear(&mut self) {
        HashMap::clear(self);
    }

    fn entry_default(&mut self, key: &str) -> Result<&mut dyn Reflect, String> {
        let key = parse_key::<K>(key)?;
        Ok(self.entry(key).or_default())
    }
}

// Keys are re-sorted by their string form, so 10 precedes 9 like in a HashMap.
impl<K, T> Reflect for BTreeMap<K, T>
where
    K: MapKey + Ord,
    K::Err: Display,
    T: Reflect + Default,
{
    fn reflect(&self) -> Node<'_> {
        sorted_entries(self.iter())
    }

    fn reflect_mut(&mut self) -> NodeMut<'_> {
        NodeMut::Map(self)
    }
}

impl<K, T> MapSlot for BTreeMap<K, T>
where
    K: MapKey + Ord,
    K::Err: Display,
    T: Reflect + Default,
{
    fn clear(&mut self) {
        BTreeMap::clear(self);
    }

    fn entry_default(&mut self, key: &str) -> Result<&mut dyn Reflect, String> {
        let key = parse_key::<K>(key)?;
        Ok(self.entry(key).or_default())
    }
}
