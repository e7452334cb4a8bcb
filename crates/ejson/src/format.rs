//! Text output for encoded documents.
//!
//! `serde_json` does the writing. This module adds the two layout options
//! the codec exposes: key sorting and indentation. Without indentation the
//! layout uses `", "` and `": "` separators, e.g.
//! `{"bat": {"$escape": {"baz": "bazam"}}, "foo": "bar"}`.

use std::io;

use serde::Serialize;
use serde_json::ser::{Formatter, PrettyFormatter};
use serde_json::Value as JsonValue;

/// Single-line layout with a space after every separator.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

/// Recursively reorders object fields by key.
pub fn sort_keys(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::Object(map) => {
            let mut fields: Vec<(String, JsonValue)> = map.into_iter().collect();
            fields.sort_by(|(a, _), (b, _)| a.cmp(b));
            JsonValue::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        JsonValue::Array(items) => JsonValue::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Writes `value` to `writer`, indented by `indent` spaces per level when
/// given.
pub fn write_json<W: io::Write>(
    writer: W,
    value: &JsonValue,
    indent: Option<usize>,
) -> Result<(), serde_json::Error> {
    match indent {
        Some(width) => {
            let indent = " ".repeat(width);
            let formatter = PrettyFormatter::with_indent(indent.as_bytes());
            let mut ser = serde_json::Serializer::with_formatter(writer, formatter);
            value.serialize(&mut ser)
        }
        None => {
            let mut ser = serde_json::Serializer::with_formatter(writer, SpacedFormatter);
            value.serialize(&mut ser)
        }
    }
}

/// [`write_json`] into a `String`.
pub fn to_json_string(
    value: &JsonValue,
    indent: Option<usize>,
) -> Result<String, serde_json::Error> {
    let mut out = Vec::with_capacity(128);
    write_json(&mut out, value, indent)?;
    String::from_utf8(out)
        .map_err(|err| serde_json::Error::io(io::Error::new(io::ErrorKind::InvalidData, err)))
}
