//! EJSON encoder.
//!
//! Turns an [`EjsonValue`] into a JSON-native `serde_json::Value`:
//!
//! - dates become `{"$date": <millis since epoch>}`,
//! - byte sequences become `{"$binary": "<base64>"}`,
//! - values claimed by a type hook become `{"$type": tag, "$value": ..}`,
//! - objects using a reserved key are wrapped once in `{"$escape": ..}`.

use std::io;
use std::rc::Rc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::NaiveTime;
use serde_json::{Map, Number, Value as JsonValue};
use tracing::trace;

use crate::constants::{is_reserved_key, BINARY, DATE, ESCAPE, TYPE, VALUE};
use crate::cycle::{CycleGuard, OpenMarker};
use crate::error::EjsonEncodeError;
use crate::format;
use crate::hooks::EncodeHooks;
use crate::value::{EjsonValue, ObjectMap};

/// Options controlling EJSON encoding behaviour.
#[derive(Debug, Clone)]
pub struct EjsonEncoderOptions {
    /// Type hooks for caller-defined values, consulted in order.
    pub hooks: EncodeHooks,
    /// Fail with [`EjsonEncodeError::CircularReference`] on self-referential
    /// input instead of recursing without bound. Default `true`.
    pub check_circular: bool,
    /// Sort object keys in text output.
    pub sort_keys: bool,
    /// Pretty-print text output with this many spaces per level.
    pub indent: Option<usize>,
    /// Maximum nesting depth; `None` means unbounded.
    pub max_depth: Option<usize>,
}

impl Default for EjsonEncoderOptions {
    fn default() -> Self {
        Self {
            hooks: EncodeHooks::default(),
            check_circular: true,
            sort_keys: false,
            indent: None,
            max_depth: None,
        }
    }
}

impl EjsonEncoderOptions {
    pub fn with_hooks(mut self, hooks: EncodeHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_check_circular(mut self, check_circular: bool) -> Self {
        self.check_circular = check_circular;
        self
    }

    pub fn with_sort_keys(mut self, sort_keys: bool) -> Self {
        self.sort_keys = sort_keys;
        self
    }

    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = Some(indent);
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }
}

/// EJSON encoder. Holds configuration only; every call is independent.
#[derive(Debug, Clone, Default)]
pub struct EjsonEncoder {
    pub options: EjsonEncoderOptions,
}

impl EjsonEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: EjsonEncoderOptions) -> Self {
        Self { options }
    }

    // ----------------------------------------------------------------
    // Public encode entry-points

    /// Encode `value` to a JSON-native value.
    pub fn encode(&self, value: &EjsonValue) -> Result<JsonValue, EjsonEncodeError> {
        let guard = self.options.check_circular.then(CycleGuard::new);
        Walk {
            hooks: &self.options.hooks,
            guard: guard.as_ref(),
            max_depth: self.options.max_depth,
        }
        .write_any(value, 0)
    }

    /// Encode `value` to JSON text, applying `sort_keys` and `indent`.
    pub fn encode_to_string(&self, value: &EjsonValue) -> Result<String, EjsonEncodeError> {
        let json = self.prepare(value)?;
        Ok(format::to_json_string(&json, self.options.indent)?)
    }

    /// Encode `value` as JSON text into `writer`.
    pub fn encode_to_writer<W: io::Write>(
        &self,
        writer: W,
        value: &EjsonValue,
    ) -> Result<(), EjsonEncodeError> {
        let json = self.prepare(value)?;
        Ok(format::write_json(writer, &json, self.options.indent)?)
    }

    fn prepare(&self, value: &EjsonValue) -> Result<JsonValue, EjsonEncodeError> {
        let json = self.encode(value)?;
        if self.options.sort_keys {
            Ok(format::sort_keys(json))
        } else {
            Ok(json)
        }
    }
}

/// State of one top-level encode call.
struct Walk<'a> {
    hooks: &'a EncodeHooks,
    guard: Option<&'a CycleGuard>,
    max_depth: Option<usize>,
}

impl Walk<'_> {
    // ----------------------------------------------------------------
    // Core write dispatch

    fn write_any(&self, value: &EjsonValue, depth: usize) -> Result<JsonValue, EjsonEncodeError> {
        if let Some(limit) = self.max_depth {
            if depth > limit {
                return Err(EjsonEncodeError::DepthLimitExceeded(limit));
            }
        }
        match value {
            EjsonValue::Array(items) => {
                let _open = self.enter(Rc::as_ptr(items) as *const () as usize)?;
                let items = items.borrow();
                self.write_arr(&items, depth)
            }
            EjsonValue::Object(fields) => {
                let _open = self.enter(Rc::as_ptr(fields) as *const () as usize)?;
                let fields = fields.borrow();
                self.write_obj(&fields, depth)
            }
            EjsonValue::Date(date) => {
                Ok(date_tag(date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()))
            }
            EjsonValue::NaiveDateTime(dt) => Ok(date_tag(dt.and_utc().timestamp_millis())),
            EjsonValue::DateTime(dt) => Ok(date_tag(dt.timestamp_millis())),
            EjsonValue::Bytes(bytes) => Ok(binary_tag(bytes)),
            leaf => self.write_leaf(leaf),
        }
    }

    fn enter(&self, id: usize) -> Result<Option<OpenMarker<'_>>, EjsonEncodeError> {
        self.guard.map(|guard| guard.enter(id)).transpose()
    }

    // ----------------------------------------------------------------
    // Composites

    fn write_arr(&self, items: &[EjsonValue], depth: usize) -> Result<JsonValue, EjsonEncodeError> {
        let items = items
            .iter()
            .map(|item| self.write_any(item, depth + 1))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(JsonValue::Array(items))
    }

    fn write_obj(&self, fields: &ObjectMap, depth: usize) -> Result<JsonValue, EjsonEncodeError> {
        let mut out = Map::with_capacity(fields.len());
        for (key, value) in fields {
            out.insert(key.clone(), self.write_any(value, depth + 1)?);
        }
        if fields.keys().any(|key| is_reserved_key(key)) {
            let mut escaped = Map::with_capacity(1);
            escaped.insert(ESCAPE.to_owned(), JsonValue::Object(out));
            return Ok(JsonValue::Object(escaped));
        }
        Ok(JsonValue::Object(out))
    }

    // ----------------------------------------------------------------
    // Leaves

    fn write_leaf(&self, value: &EjsonValue) -> Result<JsonValue, EjsonEncodeError> {
        if let Some(hook) = self.hooks.find(value) {
            trace!(tag = hook.tag(), kind = value.kind(), "type hook matched");
            let payload = hook.apply(value).map_err(|source| EjsonEncodeError::Hook {
                tag: hook.tag().to_owned(),
                source,
            })?;
            return Ok(type_tag(hook.tag(), payload));
        }
        match value {
            EjsonValue::Null => Ok(JsonValue::Null),
            EjsonValue::Bool(b) => Ok(JsonValue::Bool(*b)),
            EjsonValue::Integer(i) => Ok(JsonValue::Number(Number::from(*i))),
            EjsonValue::UInteger(u) => Ok(JsonValue::Number(Number::from(*u))),
            EjsonValue::Float(f) => Number::from_f64(*f)
                .map(JsonValue::Number)
                .ok_or(EjsonEncodeError::NonFiniteFloat(*f)),
            EjsonValue::Str(s) => Ok(JsonValue::String(s.clone())),
            EjsonValue::Custom(ext) => Err(EjsonEncodeError::Unsupported(ext.type_name())),
            // Composites, dates and bytes are dispatched in `write_any`.
            other => Err(EjsonEncodeError::Unsupported(other.kind())),
        }
    }
}

fn date_tag(millis: i64) -> JsonValue {
    let mut tag = Map::with_capacity(1);
    tag.insert(DATE.to_owned(), JsonValue::Number(Number::from(millis)));
    JsonValue::Object(tag)
}

fn binary_tag(bytes: &[u8]) -> JsonValue {
    let mut tag = Map::with_capacity(1);
    tag.insert(BINARY.to_owned(), JsonValue::String(STANDARD.encode(bytes)));
    JsonValue::Object(tag)
}

fn type_tag(name: &str, payload: JsonValue) -> JsonValue {
    let mut tag = Map::with_capacity(2);
    tag.insert(TYPE.to_owned(), JsonValue::String(name.to_owned()));
    tag.insert(VALUE.to_owned(), payload);
    JsonValue::Object(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, NaiveDate};
    use serde_json::json;

    fn encode(value: &EjsonValue) -> JsonValue {
        EjsonEncoder::new().encode(value).unwrap()
    }

    #[test]
    fn json_native_leaves_pass_through() {
        assert_eq!(encode(&EjsonValue::Null), json!(null));
        assert_eq!(encode(&true.into()), json!(true));
        assert_eq!(encode(&(-7).into()), json!(-7));
        assert_eq!(encode(&EjsonValue::UInteger(u64::MAX)), json!(u64::MAX));
        assert_eq!(encode(&1.5.into()), json!(1.5));
        assert_eq!(encode(&"$date".into()), json!("$date"));
    }

    #[test]
    fn calendar_date_is_utc_midnight() {
        let date = NaiveDate::from_ymd_opt(2015, 1, 25).unwrap();
        assert_eq!(encode(&date.into()), json!({"$date": 1_422_144_000_000i64}));
    }

    #[test]
    fn aware_datetime_is_converted_to_utc() {
        let utc = DateTime::parse_from_rfc3339("2015-01-25T10:30:01Z").unwrap();
        let shifted = DateTime::parse_from_rfc3339("2015-01-25T12:30:01+02:00").unwrap();
        assert_eq!(encode(&utc.into()), json!({"$date": 1_422_181_801_000i64}));
        assert_eq!(encode(&shifted.into()), json!({"$date": 1_422_181_801_000i64}));
    }

    #[test]
    fn naive_datetime_is_read_as_utc() {
        let naive = NaiveDate::from_ymd_opt(2015, 1, 25)
            .unwrap()
            .and_hms_opt(10, 30, 1)
            .unwrap();
        assert_eq!(encode(&naive.into()), json!({"$date": 1_422_181_801_000i64}));
    }

    #[test]
    fn datetime_is_truncated_to_millis() {
        let dt = DateTime::parse_from_rfc3339("1970-01-01T00:00:01.234567Z").unwrap();
        assert_eq!(encode(&dt.into()), json!({"$date": 1234}));
        let before_epoch = DateTime::parse_from_rfc3339("1969-12-31T23:59:59.5Z").unwrap();
        assert_eq!(encode(&before_epoch.into()), json!({"$date": -500}));
    }

    #[test]
    fn bytes_are_padded_base64() {
        assert_eq!(encode(&EjsonValue::from(&b"foo"[..])), json!({"$binary": "Zm9v"}));
        assert_eq!(encode(&EjsonValue::from(&b"fo"[..])), json!({"$binary": "Zm8="}));
        assert_eq!(encode(&EjsonValue::Bytes(vec![])), json!({"$binary": ""}));
    }

    #[test]
    fn only_ambiguous_level_is_escaped() {
        let inner = EjsonValue::object_from([("plain", 1.into())]);
        let value = EjsonValue::object_from([("$value", inner), ("x", 2.into())]);
        assert_eq!(
            encode(&value),
            json!({"$escape": {"$value": {"plain": 1}, "x": 2}})
        );
    }

    #[test]
    fn escape_key_itself_is_escaped() {
        let value = EjsonValue::object_from([(
            "$escape",
            EjsonValue::object_from([("baz", "bazam".into())]),
        )]);
        assert_eq!(
            encode(&value),
            json!({"$escape": {"$escape": {"baz": "bazam"}}})
        );
    }

    #[test]
    fn field_order_is_preserved() {
        let value = EjsonValue::object_from([("b", 1.into()), ("a", 2.into())]);
        let keys: Vec<String> = encode(&value).as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["b", "a"]);
    }

    #[test]
    fn hook_output_is_not_rewalked() {
        let hooks = EncodeHooks::new().with(
            "raw",
            |v| v.as_str() == Some("special"),
            |_| Ok(json!({"$date": "not a date"})),
        );
        let encoder = EjsonEncoder::with_options(EjsonEncoderOptions::default().with_hooks(hooks));
        assert_eq!(
            encoder.encode(&"special".into()).unwrap(),
            json!({"$type": "raw", "$value": {"$date": "not a date"}})
        );
        assert_eq!(encoder.encode(&"plain".into()).unwrap(), json!("plain"));
    }

    #[test]
    fn hooks_do_not_see_built_in_types() {
        let hooks = EncodeHooks::new().with("all", |_| true, |_| Ok(json!(0)));
        let encoder = EjsonEncoder::with_options(EjsonEncoderOptions::default().with_hooks(hooks));
        let value = EjsonValue::array(vec![EjsonValue::Bytes(vec![1]), 5.into()]);
        assert_eq!(
            encoder.encode(&value).unwrap(),
            json!([{"$binary": "AQ=="}, {"$type": "all", "$value": 0}])
        );
    }

    #[test]
    fn failing_hook_aborts() {
        let hooks = EncodeHooks::new().with("bad", |_| true, |_| Err("nope".into()));
        let encoder = EjsonEncoder::with_options(EjsonEncoderOptions::default().with_hooks(hooks));
        let err = encoder.encode(&EjsonValue::array(vec![1.into()])).unwrap_err();
        assert!(matches!(err, EjsonEncodeError::Hook { ref tag, .. } if tag == "bad"));
    }

    #[test]
    fn unclaimed_custom_value_is_rejected() {
        let err = EjsonEncoder::new()
            .encode(&EjsonValue::custom(vec![1u8]))
            .unwrap_err();
        assert!(matches!(err, EjsonEncodeError::Unsupported(name) if name.contains("Vec<u8>")));
    }

    #[test]
    fn non_finite_float_is_rejected() {
        let err = EjsonEncoder::new().encode(&f64::NAN.into()).unwrap_err();
        assert!(matches!(err, EjsonEncodeError::NonFiniteFloat(f) if f.is_nan()));
    }

    #[test]
    fn depth_limit() {
        let nested = EjsonValue::array(vec![EjsonValue::array(vec![EjsonValue::array(vec![])])]);
        let encoder = EjsonEncoder::with_options(EjsonEncoderOptions::default().with_max_depth(1));
        assert!(matches!(
            encoder.encode(&nested),
            Err(EjsonEncodeError::DepthLimitExceeded(1))
        ));
        let encoder = EjsonEncoder::with_options(EjsonEncoderOptions::default().with_max_depth(2));
        assert_eq!(encoder.encode(&nested).unwrap(), json!([[[]]]));
    }

    #[test]
    fn self_reference_is_detected() {
        let value = EjsonValue::object_from([("a", 1.into())]);
        let fields = value.as_object().unwrap().clone();
        fields.borrow_mut().insert("me".into(), value.clone());
        let err = EjsonEncoder::new().encode(&value).unwrap_err();
        assert!(matches!(err, EjsonEncodeError::CircularReference));
        fields.borrow_mut().clear();
    }

    #[test]
    fn shared_subtree_is_written_per_occurrence() {
        let shared = EjsonValue::array(vec![1.into()]);
        let value = EjsonValue::object_from([("l", shared.clone()), ("r", shared)]);
        assert_eq!(encode(&value), json!({"l": [1], "r": [1]}));
    }

    #[test]
    fn text_output_sorts_and_indents() {
        let value = EjsonValue::object_from([("b", 1.into()), ("a", EjsonValue::Bytes(vec![]))]);
        let encoder = EjsonEncoder::with_options(
            EjsonEncoderOptions::default()
                .with_sort_keys(true)
                .with_indent(2),
        );
        assert_eq!(
            encoder.encode_to_string(&value).unwrap(),
            "{\n  \"a\": {\n    \"$binary\": \"\"\n  },\n  \"b\": 1\n}"
        );
        let mut out = Vec::new();
        EjsonEncoder::new().encode_to_writer(&mut out, &value).unwrap();
        assert_eq!(out, br#"{"b": 1, "a": {"$binary": ""}}"#);
    }
}
