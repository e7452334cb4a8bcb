//! [`EjsonValue`], the native value model handled by the EJSON codec.
//!
//! JSON-native values map one-to-one onto variants; dates, byte sequences
//! and caller-defined [`Extension`] types are the values that need a tag on
//! the wire.
//!
//! Arrays and objects are shared (`Rc<RefCell<..>>`). The same composite may
//! appear under several parents, and a composite may even contain itself;
//! the encoder uses the allocation address as the composite's identity.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use indexmap::IndexMap;

/// Ordered mapping used for EJSON objects.
pub type ObjectMap = IndexMap<String, EjsonValue>;

/// Shared handle to an array's elements.
pub type ArrayRef = Rc<RefCell<Vec<EjsonValue>>>;

/// Shared handle to an object's fields.
pub type ObjectRef = Rc<RefCell<ObjectMap>>;

/// A caller-defined value type carried inside [`EjsonValue::Custom`].
///
/// Implemented automatically for every `'static` type that is `Debug` and
/// `PartialEq`; type hooks recognise values by downcasting.
pub trait Extension: Any + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn Extension) -> bool;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + fmt::Debug + PartialEq> Extension for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn Extension) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// A value the EJSON codec knows how to encode and decode.
#[derive(Debug, Clone)]
pub enum EjsonValue {
    Null,
    Bool(bool),
    /// Integer that fits in `i64`.
    Integer(i64),
    /// Unsigned integer greater than `i64::MAX`.
    UInteger(u64),
    Float(f64),
    Str(String),
    /// Raw bytes, written as `{"$binary": ..}`.
    Bytes(Vec<u8>),
    /// Calendar date, written as UTC midnight.
    Date(NaiveDate),
    /// Wall-clock date-time without an offset, read as UTC.
    NaiveDateTime(NaiveDateTime),
    /// Date-time with an offset. Decoded dates always carry `+00:00`.
    DateTime(DateTime<FixedOffset>),
    Array(ArrayRef),
    Object(ObjectRef),
    /// A caller-defined type; needs a type hook to be encoded.
    Custom(Rc<dyn Extension>),
}

impl EjsonValue {
    pub fn array(items: Vec<EjsonValue>) -> Self {
        EjsonValue::Array(Rc::new(RefCell::new(items)))
    }

    pub fn object(fields: ObjectMap) -> Self {
        EjsonValue::Object(Rc::new(RefCell::new(fields)))
    }

    /// Builds an object from key/value pairs. Later duplicates overwrite
    /// earlier ones but keep the first position.
    pub fn object_from<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, EjsonValue)>,
        K: Into<String>,
    {
        Self::object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn custom<T: Extension>(value: T) -> Self {
        EjsonValue::Custom(Rc::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, EjsonValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            EjsonValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            EjsonValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            EjsonValue::Integer(i) => Some(*i as f64),
            EjsonValue::UInteger(u) => Some(*u as f64),
            EjsonValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            EjsonValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The instant this value denotes, if it is one of the date variants.
    /// Calendar dates and naive date-times are taken as UTC.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            EjsonValue::Date(d) => Some(d.and_time(chrono::NaiveTime::MIN).and_utc()),
            EjsonValue::NaiveDateTime(dt) => Some(dt.and_utc()),
            EjsonValue::DateTime(dt) => Some(dt.with_timezone(&Utc)),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            EjsonValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            EjsonValue::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Downcasts a [`EjsonValue::Custom`] payload to its concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            EjsonValue::Custom(ext) => ext.as_ref().as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Looks up `key` in an object and clones the field.
    pub fn get(&self, key: &str) -> Option<EjsonValue> {
        self.as_object()
            .and_then(|fields| fields.borrow().get(key).cloned())
    }

    /// Short, human readable name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            EjsonValue::Null => "null",
            EjsonValue::Bool(_) => "bool",
            EjsonValue::Integer(_) | EjsonValue::UInteger(_) => "integer",
            EjsonValue::Float(_) => "float",
            EjsonValue::Str(_) => "string",
            EjsonValue::Bytes(_) => "bytes",
            EjsonValue::Date(_) => "date",
            EjsonValue::NaiveDateTime(_) | EjsonValue::DateTime(_) => "datetime",
            EjsonValue::Array(_) => "array",
            EjsonValue::Object(_) => "object",
            EjsonValue::Custom(ext) => ext.type_name(),
        }
    }
}

/// Deep equality. Objects compare as maps (field order is ignored); shared
/// composites short-circuit on pointer identity. Comparing two distinct
/// cyclic values does not terminate.
impl PartialEq for EjsonValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (EjsonValue::Null, EjsonValue::Null) => true,
            (EjsonValue::Bool(a), EjsonValue::Bool(b)) => a == b,
            (EjsonValue::Integer(a), EjsonValue::Integer(b)) => a == b,
            (EjsonValue::UInteger(a), EjsonValue::UInteger(b)) => a == b,
            (EjsonValue::Float(a), EjsonValue::Float(b)) => a == b,
            (EjsonValue::Str(a), EjsonValue::Str(b)) => a == b,
            (EjsonValue::Bytes(a), EjsonValue::Bytes(b)) => a == b,
            (EjsonValue::Date(a), EjsonValue::Date(b)) => a == b,
            (EjsonValue::NaiveDateTime(a), EjsonValue::NaiveDateTime(b)) => a == b,
            (EjsonValue::DateTime(a), EjsonValue::DateTime(b)) => a == b,
            (EjsonValue::Array(a), EjsonValue::Array(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (EjsonValue::Object(a), EjsonValue::Object(b)) => {
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow()
            }
            (EjsonValue::Custom(a), EjsonValue::Custom(b)) => a.as_ref().dyn_eq(b.as_ref()),
            _ => false,
        }
    }
}

impl From<bool> for EjsonValue {
    fn from(v: bool) -> Self {
        EjsonValue::Bool(v)
    }
}

impl From<i64> for EjsonValue {
    fn from(v: i64) -> Self {
        EjsonValue::Integer(v)
    }
}

impl From<i32> for EjsonValue {
    fn from(v: i32) -> Self {
        EjsonValue::Integer(i64::from(v))
    }
}

impl From<u64> for EjsonValue {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => EjsonValue::Integer(i),
            Err(_) => EjsonValue::UInteger(v),
        }
    }
}

impl From<f64> for EjsonValue {
    fn from(v: f64) -> Self {
        EjsonValue::Float(v)
    }
}

impl From<&str> for EjsonValue {
    fn from(v: &str) -> Self {
        EjsonValue::Str(v.to_owned())
    }
}

impl From<String> for EjsonValue {
    fn from(v: String) -> Self {
        EjsonValue::Str(v)
    }
}

impl From<&[u8]> for EjsonValue {
    fn from(v: &[u8]) -> Self {
        EjsonValue::Bytes(v.to_vec())
    }
}

impl From<NaiveDate> for EjsonValue {
    fn from(v: NaiveDate) -> Self {
        EjsonValue::Date(v)
    }
}

impl From<NaiveDateTime> for EjsonValue {
    fn from(v: NaiveDateTime) -> Self {
        EjsonValue::NaiveDateTime(v)
    }
}

impl From<DateTime<FixedOffset>> for EjsonValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        EjsonValue::DateTime(v)
    }
}

impl From<DateTime<Utc>> for EjsonValue {
    fn from(v: DateTime<Utc>) -> Self {
        EjsonValue::DateTime(v.fixed_offset())
    }
}

impl From<Vec<EjsonValue>> for EjsonValue {
    fn from(v: Vec<EjsonValue>) -> Self {
        EjsonValue::array(v)
    }
}

impl From<ObjectMap> for EjsonValue {
    fn from(v: ObjectMap) -> Self {
        EjsonValue::object(v)
    }
}

/// Structural conversion: no tag in `v` is interpreted. Use the decoder for
/// EJSON-aware conversion.
impl From<serde_json::Value> for EjsonValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => EjsonValue::Null,
            serde_json::Value::Bool(b) => EjsonValue::Bool(b),
            serde_json::Value::Number(n) => EjsonValue::from(&n),
            serde_json::Value::String(s) => EjsonValue::Str(s),
            serde_json::Value::Array(arr) => {
                EjsonValue::array(arr.into_iter().map(EjsonValue::from).collect())
            }
            serde_json::Value::Object(obj) => EjsonValue::object(
                obj.into_iter()
                    .map(|(k, v)| (k, EjsonValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&serde_json::Number> for EjsonValue {
    fn from(n: &serde_json::Number) -> Self {
        if let Some(i) = n.as_i64() {
            EjsonValue::Integer(i)
        } else if let Some(u) = n.as_u64() {
            EjsonValue::UInteger(u)
        } else {
            EjsonValue::Float(n.as_f64().unwrap_or(f64::NAN))
        }
    }
}
