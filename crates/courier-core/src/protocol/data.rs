//! Typed data envelope (JSON).
//!
//! A `TypedEnvelope` is a labelled bag of fields, each stored together with the
//! tag of the type it was inserted as. Reads never coerce: asking for an `i64`
//! out of an `INT` field is a `TypeMismatch`, not a widening.
//!
//! Wire format:
//!
//! ```text
//! {"id":"<label>","data":{"<field>":{"type":"<TAG>","data":<literal | [byte,...]>}}}
//! ```
//!
//! Decoding keeps each field's `data` as a `RawValue` until the tag is known,
//! then parses it straight into the tagged Rust type so range checks
//! (e.g. `200` for `BYTE`) fall out of serde.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::value::RawValue;

use crate::error::{BoxError, CourierError, Result};

/// Label used when an envelope is created without an explicit id.
pub const UNDEFINED_ID: &str = "Undefined";

/// Type tag carried next to every field on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TypeTag {
    Object,
    Double,
    Float,
    Long,
    Int,
    Short,
    Byte,
    String,
    Char,
    Boolean,
}

impl TypeTag {
    /// Wire spelling of the tag.
    pub fn as_str(self) -> &'static str {
        match self {
            TypeTag::Object => "OBJECT",
            TypeTag::Double => "DOUBLE",
            TypeTag::Float => "FLOAT",
            TypeTag::Long => "LONG",
            TypeTag::Int => "INT",
            TypeTag::Short => "SHORT",
            TypeTag::Byte => "BYTE",
            TypeTag::String => "STRING",
            TypeTag::Char => "CHAR",
            TypeTag::Boolean => "BOOLEAN",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored field value.
///
/// `Object` holds the bytes produced by the caller's [`ObjectCodec`]; two
/// objects are equal when their encodings are.
#[derive(Debug, Clone)]
pub enum TypedValue {
    Object(Bytes),
    Double(f64),
    Float(f32),
    Long(i64),
    Int(i32),
    Short(i16),
    Byte(i8),
    String(String),
    Char(char),
    Boolean(bool),
}

impl TypedValue {
    pub fn tag(&self) -> TypeTag {
        match self {
            TypedValue::Object(_) => TypeTag::Object,
            TypedValue::Double(_) => TypeTag::Double,
            TypedValue::Float(_) => TypeTag::Float,
            TypedValue::Long(_) => TypeTag::Long,
            TypedValue::Int(_) => TypeTag::Int,
            TypedValue::Short(_) => TypeTag::Short,
            TypedValue::Byte(_) => TypeTag::Byte,
            TypedValue::String(_) => TypeTag::String,
            TypedValue::Char(_) => TypeTag::Char,
            TypedValue::Boolean(_) => TypeTag::Boolean,
        }
    }

    fn is_finite(&self) -> bool {
        match self {
            TypedValue::Double(v) => v.is_finite(),
            TypedValue::Float(v) => v.is_finite(),
            _ => true,
        }
    }
}

// Floats compare by bit pattern so that `Eq` and `Hash` agree.
impl PartialEq for TypedValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypedValue::Object(a), TypedValue::Object(b)) => a == b,
            (TypedValue::Double(a), TypedValue::Double(b)) => a.to_bits() == b.to_bits(),
            (TypedValue::Float(a), TypedValue::Float(b)) => a.to_bits() == b.to_bits(),
            (TypedValue::Long(a), TypedValue::Long(b)) => a == b,
            (TypedValue::Int(a), TypedValue::Int(b)) => a == b,
            (TypedValue::Short(a), TypedValue::Short(b)) => a == b,
            (TypedValue::Byte(a), TypedValue::Byte(b)) => a == b,
            (TypedValue::String(a), TypedValue::String(b)) => a == b,
            (TypedValue::Char(a), TypedValue::Char(b)) => a == b,
            (TypedValue::Boolean(a), TypedValue::Boolean(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for TypedValue {}

impl Hash for TypedValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag().hash(state);
        match self {
            TypedValue::Object(v) => v.hash(state),
            TypedValue::Double(v) => v.to_bits().hash(state),
            TypedValue::Float(v) => v.to_bits().hash(state),
            TypedValue::Long(v) => v.hash(state),
            TypedValue::Int(v) => v.hash(state),
            TypedValue::Short(v) => v.hash(state),
            TypedValue::Byte(v) => v.hash(state),
            TypedValue::String(v) => v.hash(state),
            TypedValue::Char(v) => v.hash(state),
            TypedValue::Boolean(v) => v.hash(state),
        }
    }
}

/// Scalar types that can be read back out of a [`TypedValue`].
pub trait FromTypedValue: Sized {
    /// The only tag this type accepts.
    const TAG: TypeTag;

    fn from_typed(value: &TypedValue) -> Option<Self>;
}

macro_rules! scalar_value {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for TypedValue {
            fn from(v: $ty) -> Self {
                TypedValue::$variant(v)
            }
        }

        impl FromTypedValue for $ty {
            const TAG: TypeTag = TypeTag::$variant;

            fn from_typed(value: &TypedValue) -> Option<Self> {
                match value {
                    TypedValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

scalar_value!(f64, Double);
scalar_value!(f32, Float);
scalar_value!(i64, Long);
scalar_value!(i32, Int);
scalar_value!(i16, Short);
scalar_value!(i8, Byte);
scalar_value!(String, String);
scalar_value!(char, Char);
scalar_value!(bool, Boolean);

impl From<&str> for TypedValue {
    fn from(v: &str) -> Self {
        TypedValue::String(v.to_owned())
    }
}

/// Caller-supplied encoder/decoder for `OBJECT` fields.
///
/// Peers only interoperate on an object field when both ends use matching
/// codecs; the wire carries the encoded bytes and nothing else.
pub trait ObjectCodec<T> {
    fn encode(&self, value: &T) -> std::result::Result<Vec<u8>, BoxError>;
    fn decode(&self, bytes: &[u8]) -> std::result::Result<T, BoxError>;
}

/// `ObjectCodec` storing any serde type as its JSON bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> ObjectCodec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> std::result::Result<Vec<u8>, BoxError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(&self, bytes: &[u8]) -> std::result::Result<T, BoxError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Labelled map of type-tagged fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypedEnvelope {
    id: String,
    fields: BTreeMap<String, TypedValue>,
}

impl Default for TypedEnvelope {
    fn default() -> Self {
        Self::new(UNDEFINED_ID)
    }
}

impl TypedEnvelope {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Store `value` under `name`, replacing any previous field of that name.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<TypedValue>) -> &mut Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Builder form of [`TypedEnvelope::add`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<TypedValue>) -> Self {
        self.add(name, value);
        self
    }

    /// Encode `value` with `codec` and store it as an `OBJECT` field.
    pub fn add_object<T, C>(
        &mut self,
        name: impl Into<String>,
        value: &T,
        codec: &C,
    ) -> Result<&mut Self>
    where
        C: ObjectCodec<T>,
    {
        let name = name.into();
        let bytes = codec
            .encode(value)
            .map_err(|e| CourierError::codec_with(format!("encode object field {name}"), e))?;
        self.fields.insert(name, TypedValue::Object(Bytes::from(bytes)));
        Ok(self)
    }

    /// Read a scalar field. The stored tag must be exactly `T`'s tag.
    pub fn get<T: FromTypedValue>(&self, name: &str) -> Result<T> {
        let value = self.value(name)?;
        T::from_typed(value).ok_or_else(|| CourierError::TypeMismatch {
            field: name.to_owned(),
            expected: T::TAG,
            found: value.tag(),
        })
    }

    /// Decode an `OBJECT` field with `codec`.
    pub fn get_object<T, C>(&self, name: &str, codec: &C) -> Result<T>
    where
        C: ObjectCodec<T>,
    {
        match self.value(name)? {
            TypedValue::Object(bytes) => codec
                .decode(bytes)
                .map_err(|e| CourierError::codec_with(format!("decode object field {name}"), e)),
            other => Err(CourierError::TypeMismatch {
                field: name.to_owned(),
                expected: TypeTag::Object,
                found: other.tag(),
            }),
        }
    }

    /// Raw access to a stored value.
    pub fn value(&self, name: &str) -> Result<&TypedValue> {
        self.fields
            .get(name)
            .ok_or_else(|| CourierError::FieldNotFound(name.to_owned()))
    }

    pub fn tag_of(&self, name: &str) -> Option<TypeTag> {
        self.fields.get(name).map(TypedValue::tag)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<TypedValue> {
        self.fields.remove(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypedValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Encode to the wire JSON.
    ///
    /// Fails on NaN or infinite floats, which JSON cannot carry.
    pub fn to_json(&self) -> Result<String> {
        if let Some((name, _)) = self.fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(CourierError::codec(format!(
                "field {name} holds a non-finite float"
            )));
        }
        let wire = WireEnvelopeRef {
            id: &self.id,
            data: self
                .fields
                .iter()
                .map(|(k, v)| {
                    (
                        k.as_str(),
                        WireFieldRef {
                            tag: v.tag(),
                            data: WireData(v),
                        },
                    )
                })
                .collect(),
        };
        serde_json::to_string(&wire)
            .map_err(|e| CourierError::codec_with("encode data envelope", e))
    }

    /// Decode from the wire JSON.
    pub fn from_json(s: &str) -> Result<Self> {
        let wire: WireEnvelope<'_> = serde_json::from_str(s)
            .map_err(|e| CourierError::codec_with("invalid data envelope json", e))?;

        let mut fields = BTreeMap::new();
        for (name, field) in wire.data {
            let value = decode_field(field.tag, field.data.get()).map_err(|e| {
                CourierError::codec_with(format!("invalid {} field {name}", field.tag), e)
            })?;
            fields.insert(name, value);
        }

        Ok(Self { id: wire.id, fields })
    }
}

fn decode_field(tag: TypeTag, raw: &str) -> serde_json::Result<TypedValue> {
    Ok(match tag {
        TypeTag::Object => {
            // JVM peers write signed bytes.
            let signed: Vec<i8> = serde_json::from_str(raw)?;
            TypedValue::Object(signed.into_iter().map(|b| b as u8).collect())
        }
        TypeTag::Double => TypedValue::Double(finite(serde_json::from_str(raw)?)?),
        TypeTag::Float => {
            // f32 narrowing saturates to infinity instead of failing.
            let narrow = serde_json::from_str::<f64>(raw)? as f32;
            finite(f64::from(narrow))?;
            TypedValue::Float(narrow)
        }
        TypeTag::Long => TypedValue::Long(serde_json::from_str(raw)?),
        TypeTag::Int => TypedValue::Int(serde_json::from_str(raw)?),
        TypeTag::Short => TypedValue::Short(serde_json::from_str(raw)?),
        TypeTag::Byte => TypedValue::Byte(serde_json::from_str(raw)?),
        TypeTag::String => TypedValue::String(serde_json::from_str(raw)?),
        TypeTag::Char => TypedValue::Char(serde_json::from_str(raw)?),
        TypeTag::Boolean => TypedValue::Boolean(serde_json::from_str(raw)?),
    })
}

fn finite(v: f64) -> serde_json::Result<f64> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(serde::de::Error::custom(format!("{v} is out of range")))
    }
}

#[derive(Serialize)]
struct WireEnvelopeRef<'a> {
    id: &'a str,
    data: BTreeMap<&'a str, WireFieldRef<'a>>,
}

#[derive(Serialize)]
struct WireFieldRef<'a> {
    #[serde(rename = "type")]
    tag: TypeTag,
    data: WireData<'a>,
}

struct WireData<'a>(&'a TypedValue);

impl Serialize for WireData<'_> {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            TypedValue::Object(bytes) => {
                let mut seq = s.serialize_seq(Some(bytes.len()))?;
                for b in bytes.iter() {
                    seq.serialize_element(&(*b as i8))?;
                }
                seq.end()
            }
            TypedValue::Double(v) => s.serialize_f64(*v),
            TypedValue::Float(v) => s.serialize_f32(*v),
            TypedValue::Long(v) => s.serialize_i64(*v),
            TypedValue::Int(v) => s.serialize_i32(*v),
            TypedValue::Short(v) => s.serialize_i16(*v),
            TypedValue::Byte(v) => s.serialize_i8(*v),
            TypedValue::String(v) => s.serialize_str(v),
            TypedValue::Char(v) => s.serialize_char(*v),
            TypedValue::Boolean(v) => s.serialize_bool(*v),
        }
    }
}

#[derive(Deserialize)]
struct WireEnvelope<'a> {
    id: String,
    #[serde(borrow)]
    data: BTreeMap<String, WireField<'a>>,
}

#[derive(Deserialize)]
struct WireField<'a> {
    #[serde(rename = "type")]
    tag: TypeTag,
    #[serde(borrow)]
    data: &'a RawValue,
}
