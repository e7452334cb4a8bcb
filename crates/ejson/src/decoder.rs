//! EJSON decoder.
//!
//! Turns a JSON-native `serde_json::Value` (or JSON text) back into an
//! [`EjsonValue`], recognising the `$date`, `$binary`, `$type`/`$value` and
//! `$escape` forms. An `$escape` wrapper is consumed one layer at a time:
//! the fields directly inside it are taken literally, their values are
//! decoded as usual.

use std::fmt;
use std::io;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::DateTime;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, trace};

use crate::constants::{BINARY, DATE, ESCAPE, TYPE, VALUE};
use crate::error::EjsonDecodeError;
use crate::hooks::DecodeHooks;
use crate::value::EjsonValue;

/// Builds the native value for a decoded JSON object from its fields.
pub type MappingConstructor = dyn Fn(Vec<(String, EjsonValue)>) -> EjsonValue + Send + Sync;

/// Options controlling EJSON decoding behaviour.
#[derive(Clone, Default)]
pub struct EjsonDecoderOptions {
    /// Revivers for `{"$type": .., "$value": ..}` objects.
    pub hooks: DecodeHooks,
    /// Called once per decoded object instead of building an
    /// [`EjsonValue::Object`].
    pub mapping_constructor: Option<Arc<MappingConstructor>>,
    /// Maximum nesting depth; `None` means unbounded.
    pub max_depth: Option<usize>,
}

impl EjsonDecoderOptions {
    pub fn with_hooks(mut self, hooks: DecodeHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_mapping_constructor<F>(mut self, constructor: F) -> Self
    where
        F: Fn(Vec<(String, EjsonValue)>) -> EjsonValue + Send + Sync + 'static,
    {
        self.mapping_constructor = Some(Arc::new(constructor));
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }
}

impl fmt::Debug for EjsonDecoderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EjsonDecoderOptions")
            .field("hooks", &self.hooks)
            .field("mapping_constructor", &self.mapping_constructor.is_some())
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

/// EJSON decoder. Holds configuration only; every call is independent.
#[derive(Debug, Clone, Default)]
pub struct EjsonDecoder {
    pub options: EjsonDecoderOptions,
}

impl EjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: EjsonDecoderOptions) -> Self {
        Self { options }
    }

    // ----------------------------------------------------------------
    // Public decode entry-points

    /// Decode a JSON-native value.
    pub fn decode(&self, value: &JsonValue) -> Result<EjsonValue, EjsonDecodeError> {
        self.read_any(value, 0)
    }

    /// Parse and decode JSON text.
    pub fn decode_str(&self, input: &str) -> Result<EjsonValue, EjsonDecodeError> {
        let json: JsonValue = serde_json::from_str(input)?;
        self.decode(&json)
    }

    /// Parse and decode UTF-8 JSON bytes.
    pub fn decode_slice(&self, input: &[u8]) -> Result<EjsonValue, EjsonDecodeError> {
        let json: JsonValue = serde_json::from_slice(input)?;
        self.decode(&json)
    }

    /// Parse and decode JSON text from a reader.
    pub fn decode_reader<R: io::Read>(&self, reader: R) -> Result<EjsonValue, EjsonDecodeError> {
        let json: JsonValue = serde_json::from_reader(reader)?;
        self.decode(&json)
    }

    // ----------------------------------------------------------------
    // Core read dispatch

    fn read_any(&self, value: &JsonValue, depth: usize) -> Result<EjsonValue, EjsonDecodeError> {
        if let Some(limit) = self.options.max_depth {
            if depth > limit {
                return Err(EjsonDecodeError::DepthLimitExceeded(limit));
            }
        }
        match value {
            JsonValue::Object(fields) => self.read_obj(fields, depth),
            JsonValue::Array(items) => {
                let items = items
                    .iter()
                    .map(|item| self.read_any(item, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(EjsonValue::array(items))
            }
            JsonValue::Null => Ok(EjsonValue::Null),
            JsonValue::Bool(b) => Ok(EjsonValue::Bool(*b)),
            JsonValue::Number(n) => Ok(EjsonValue::from(n)),
            JsonValue::String(s) => Ok(EjsonValue::Str(s.clone())),
        }
    }

    fn read_obj(
        &self,
        fields: &Map<String, JsonValue>,
        depth: usize,
    ) -> Result<EjsonValue, EjsonDecodeError> {
        if fields.len() == 1 {
            if let Some(inner) = fields.get(ESCAPE) {
                return self.read_escaped(inner, depth);
            }
            if let Some(millis) = fields.get(DATE) {
                return read_date(millis);
            }
            if let Some(encoded) = fields.get(BINARY) {
                return read_binary(encoded);
            }
        }
        if fields.len() == 2 {
            if let (Some(tag), Some(payload)) = (fields.get(TYPE), fields.get(VALUE)) {
                return self.read_typed(tag, payload);
            }
        }
        self.read_fields(fields, depth)
    }

    /// Interior of `{"$escape": ..}`: keys are literal, values are decoded.
    fn read_escaped(
        &self,
        inner: &JsonValue,
        depth: usize,
    ) -> Result<EjsonValue, EjsonDecodeError> {
        match inner {
            JsonValue::Object(fields) => self.read_fields(fields, depth + 1),
            other => self.read_any(other, depth + 1),
        }
    }

    fn read_fields(
        &self,
        fields: &Map<String, JsonValue>,
        depth: usize,
    ) -> Result<EjsonValue, EjsonDecodeError> {
        let mut pairs = Vec::with_capacity(fields.len());
        for (key, value) in fields {
            pairs.push((key.clone(), self.read_any(value, depth + 1)?));
        }
        Ok(match &self.options.mapping_constructor {
            Some(construct) => construct(pairs),
            None => EjsonValue::object_from(pairs),
        })
    }

    fn read_typed(
        &self,
        tag: &JsonValue,
        payload: &JsonValue,
    ) -> Result<EjsonValue, EjsonDecodeError> {
        // Tags are matched as strings only; `7` never finds a hook named "7".
        let name = match tag {
            JsonValue::String(s) => s.clone(),
            other => {
                debug!(tag = %other, "non-string EJSON type tag");
                return Err(EjsonDecodeError::UnknownType(other.to_string()));
            }
        };
        let Some(reviver) = self.options.hooks.get(&name) else {
            debug!(tag = %name, "no reviver registered for EJSON type");
            return Err(EjsonDecodeError::UnknownType(name));
        };
        trace!(tag = %name, "reviving EJSON type");
        reviver(payload).map_err(|source| EjsonDecodeError::Hook { tag: name, source })
    }
}

fn read_date(millis: &JsonValue) -> Result<EjsonValue, EjsonDecodeError> {
    let instant = match millis {
        JsonValue::Number(n) => match n.as_i64() {
            Some(ms) => DateTime::from_timestamp_millis(ms),
            None => n
                .as_f64()
                .filter(|ms| ms.is_finite() && ms.abs() < i64::MAX as f64 / 1000.0)
                .and_then(|ms| DateTime::from_timestamp_micros((ms * 1000.0).round() as i64)),
        },
        _ => None,
    };
    match instant {
        Some(dt) => Ok(EjsonValue::DateTime(dt.fixed_offset())),
        None => {
            debug!(payload = %millis, "rejecting malformed $date");
            Err(EjsonDecodeError::InvalidDate(millis.to_string()))
        }
    }
}

fn read_binary(encoded: &JsonValue) -> Result<EjsonValue, EjsonDecodeError> {
    let bytes = encoded.as_str().and_then(|s| STANDARD.decode(s).ok());
    match bytes {
        Some(bytes) => Ok(EjsonValue::Bytes(bytes)),
        None => {
            debug!(payload = %encoded, "rejecting malformed $binary");
            Err(EjsonDecodeError::InvalidBinary(encoded.to_string()))
        }
    }
}
