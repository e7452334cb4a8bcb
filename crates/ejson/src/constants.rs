//! Reserved EJSON keys.

/// Tag key for date values: `{"$date": <millis since epoch>}`.
pub const DATE: &str = "$date";
/// Tag key for custom types: `{"$type": <tag>, "$value": <any>}`.
pub const TYPE: &str = "$type";
/// Payload key paired with [`TYPE`].
pub const VALUE: &str = "$value";
/// Wrapper key for ordinary mappings that contain a reserved key.
pub const ESCAPE: &str = "$escape";
/// Tag key for byte sequences: `{"$binary": <base64>}`.
pub const BINARY: &str = "$binary";

/// Every key with special meaning to the decoder.
pub const RESERVED_KEYS: [&str; 5] = [DATE, TYPE, VALUE, ESCAPE, BINARY];

/// Whether `key` is one of [`RESERVED_KEYS`].
pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}
