//! Extended JSON (EJSON) encoder and decoder, as used by Meteor and DDP.
//!
//! EJSON is JSON plus a handful of reserved tag objects that carry values
//! plain JSON cannot express:
//!
//! | value                  | wire form                              |
//! |------------------------|----------------------------------------|
//! | date / date-time       | `{"$date": <millis since epoch, UTC>}` |
//! | byte sequence          | `{"$binary": "<base64>"}`              |
//! | caller-defined type    | `{"$type": "<tag>", "$value": <any>}`  |
//! | object using a tag key | `{"$escape": {..}}`                    |
//!
//! The codec is a pair of recursive transforms between [`EjsonValue`] and
//! JSON-native `serde_json::Value`; `serde_json` handles the text.
//!
//! ```
//! use meteor_ejson::{from_str, to_string, EjsonValue};
//!
//! let value = EjsonValue::array(vec![EjsonValue::from(&b"foo"[..]), "foo".into()]);
//! let text = to_string(&value).unwrap();
//! assert_eq!(text, r#"[{"$binary": "Zm9v"}, "foo"]"#);
//! assert_eq!(from_str(&text).unwrap(), value);
//! ```

mod cycle;

pub mod constants;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod format;
pub mod hooks;
pub mod value;

pub use decoder::{EjsonDecoder, EjsonDecoderOptions, MappingConstructor};
pub use encoder::{EjsonEncoder, EjsonEncoderOptions};
pub use error::{EjsonDecodeError, EjsonEncodeError, EjsonError, HookError};
pub use hooks::{DecodeHooks, EncodeHook, EncodeHooks, TypeHooks};
pub use value::{ArrayRef, EjsonValue, Extension, ObjectMap, ObjectRef};

use serde_json::Value as JsonValue;

/// Encode `value` to a JSON-native value.
///
/// With `check_circular` set, a composite that contains itself fails with
/// [`EjsonEncodeError::CircularReference`].
pub fn encode(
    value: &EjsonValue,
    hooks: &EncodeHooks,
    check_circular: bool,
) -> Result<JsonValue, EjsonEncodeError> {
    let options = EjsonEncoderOptions {
        hooks: hooks.clone(),
        check_circular,
        ..Default::default()
    };
    EjsonEncoder::with_options(options).encode(value)
}

/// Decode a JSON-native value.
pub fn decode(value: &JsonValue, hooks: &DecodeHooks) -> Result<EjsonValue, EjsonDecodeError> {
    let options = EjsonDecoderOptions {
        hooks: hooks.clone(),
        ..Default::default()
    };
    EjsonDecoder::with_options(options).decode(value)
}

/// Encode `value` to EJSON text.
pub fn serialize(
    value: &EjsonValue,
    options: &EjsonEncoderOptions,
) -> Result<String, EjsonEncodeError> {
    EjsonEncoder::with_options(options.clone()).encode_to_string(value)
}

/// Parse and decode EJSON text.
pub fn deserialize(
    input: &str,
    options: &EjsonDecoderOptions,
) -> Result<EjsonValue, EjsonDecodeError> {
    EjsonDecoder::with_options(options.clone()).decode_str(input)
}

/// [`serialize`] with default options.
pub fn to_string(value: &EjsonValue) -> Result<String, EjsonEncodeError> {
    EjsonEncoder::new().encode_to_string(value)
}

/// [`deserialize`] with default options.
pub fn from_str(input: &str) -> Result<EjsonValue, EjsonDecodeError> {
    EjsonDecoder::new().decode_str(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq)]
    struct Point {
        x: i64,
        y: i64,
    }

    #[test]
    fn transforms_round_trip_with_hooks() {
        let mut hooks = TypeHooks::new();
        hooks.register_type::<Point, _, _>(
            "point",
            |p| Ok(json!([p.x, p.y])),
            |json| match json.as_array().map(Vec::as_slice) {
                Some([x, y]) => Ok(Point {
                    x: x.as_i64().ok_or("x must be an integer")?,
                    y: y.as_i64().ok_or("y must be an integer")?,
                }),
                _ => Err("expected [x, y]".into()),
            },
        );
        let value = EjsonValue::object_from([("at", EjsonValue::custom(Point { x: 1, y: -2 }))]);
        let json = encode(&value, hooks.encode_hooks(), true).unwrap();
        assert_eq!(json, json!({"at": {"$type": "point", "$value": [1, -2]}}));
        assert_eq!(decode(&json, hooks.decode_hooks()).unwrap(), value);
    }

    #[test]
    fn check_circular_can_be_disabled_for_acyclic_input() {
        let shared = EjsonValue::object_from([("k", "v".into())]);
        let value = EjsonValue::array(vec![shared.clone(), shared]);
        let json = encode(&value, &EncodeHooks::new(), false).unwrap();
        assert_eq!(json, json!([{"k": "v"}, {"k": "v"}]));
    }

    #[test]
    fn default_text_helpers() {
        let value = EjsonValue::object_from([("$type", "literal".into())]);
        let text = to_string(&value).unwrap();
        assert_eq!(text, r#"{"$escape": {"$type": "literal"}}"#);
        assert_eq!(from_str(&text).unwrap(), value);
    }

    #[test]
    fn serialize_and_deserialize_use_options() {
        let options = EjsonEncoderOptions::default().with_sort_keys(true);
        let value = EjsonValue::object_from([("b", EjsonValue::Null), ("a", true.into())]);
        let text = serialize(&value, &options).unwrap();
        assert_eq!(text, r#"{"a": true, "b": null}"#);
        let back = deserialize(&text, &EjsonDecoderOptions::default()).unwrap();
        assert_eq!(back, value);
    }
}
