//! Type hook registry for caller-defined types.
//!
//! Encoding consults an ordered list of `(predicate, tag, transform)`
//! entries and the first matching predicate wins. Decoding looks the tag up
//! by exact name. Both halves are plain configuration values: they are
//! cloned into each encoder/decoder and never shared through global state.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::error::HookError;
use crate::value::{EjsonValue, Extension};

/// Decides whether an encode hook applies to a value.
pub type TypePredicate = dyn Fn(&EjsonValue) -> bool + Send + Sync;

/// Forward transform: native value to the JSON written under `"$value"`.
/// The result is emitted as-is.
pub type ToJson = dyn Fn(&EjsonValue) -> Result<JsonValue, HookError> + Send + Sync;

/// Reverse transform: the raw `"$value"` payload back to a native value.
pub type FromJson = dyn Fn(&JsonValue) -> Result<EjsonValue, HookError> + Send + Sync;

/// One encode-side entry.
#[derive(Clone)]
pub struct EncodeHook {
    tag: String,
    predicate: Arc<TypePredicate>,
    transform: Arc<ToJson>,
}

impl EncodeHook {
    pub fn new<P, F>(tag: impl Into<String>, predicate: P, transform: F) -> Self
    where
        P: Fn(&EjsonValue) -> bool + Send + Sync + 'static,
        F: Fn(&EjsonValue) -> Result<JsonValue, HookError> + Send + Sync + 'static,
    {
        Self {
            tag: tag.into(),
            predicate: Arc::new(predicate),
            transform: Arc::new(transform),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn matches(&self, value: &EjsonValue) -> bool {
        (self.predicate)(value)
    }

    pub fn apply(&self, value: &EjsonValue) -> Result<JsonValue, HookError> {
        (self.transform)(value)
    }
}

impl fmt::Debug for EncodeHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodeHook").field("tag", &self.tag).finish()
    }
}

/// Ordered encode-side registry.
#[derive(Clone, Default, Debug)]
pub struct EncodeHooks {
    hooks: Vec<EncodeHook>,
}

impl EncodeHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a hook. Earlier hooks take precedence.
    pub fn push<P, F>(&mut self, tag: impl Into<String>, predicate: P, transform: F)
    where
        P: Fn(&EjsonValue) -> bool + Send + Sync + 'static,
        F: Fn(&EjsonValue) -> Result<JsonValue, HookError> + Send + Sync + 'static,
    {
        self.hooks.push(EncodeHook::new(tag, predicate, transform));
    }

    /// Appends a hook matching [`EjsonValue::Custom`] values of type `T`.
    pub fn push_type<T, F>(&mut self, tag: impl Into<String>, transform: F)
    where
        T: Extension,
        F: Fn(&T) -> Result<JsonValue, HookError> + Send + Sync + 'static,
    {
        self.push(
            tag,
            |value| value.downcast_ref::<T>().is_some(),
            move |value| match value.downcast_ref::<T>() {
                Some(typed) => transform(typed),
                None => Err(format!(
                    "expected a value of type `{}`",
                    std::any::type_name::<T>()
                )
                .into()),
            },
        );
    }

    /// Builder form of [`EncodeHooks::push`].
    pub fn with<P, F>(mut self, tag: impl Into<String>, predicate: P, transform: F) -> Self
    where
        P: Fn(&EjsonValue) -> bool + Send + Sync + 'static,
        F: Fn(&EjsonValue) -> Result<JsonValue, HookError> + Send + Sync + 'static,
    {
        self.push(tag, predicate, transform);
        self
    }

    /// Builder form of [`EncodeHooks::push_type`].
    pub fn with_type<T, F>(mut self, tag: impl Into<String>, transform: F) -> Self
    where
        T: Extension,
        F: Fn(&T) -> Result<JsonValue, HookError> + Send + Sync + 'static,
    {
        self.push_type(tag, transform);
        self
    }

    /// First hook, in registration order, whose predicate accepts `value`.
    pub fn find(&self, value: &EjsonValue) -> Option<&EncodeHook> {
        self.hooks.iter().find(|hook| hook.matches(value))
    }

    pub fn iter(&self) -> impl Iterator<Item = &EncodeHook> {
        self.hooks.iter()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

/// Decode-side registry, keyed by tag.
#[derive(Clone, Default)]
pub struct DecodeHooks {
    revivers: HashMap<String, Arc<FromJson>>,
}

impl DecodeHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the reviver for `tag`, replacing any previous one.
    pub fn insert<F>(&mut self, tag: impl Into<String>, reviver: F)
    where
        F: Fn(&JsonValue) -> Result<EjsonValue, HookError> + Send + Sync + 'static,
    {
        self.revivers.insert(tag.into(), Arc::new(reviver));
    }

    /// Builder form of [`DecodeHooks::insert`].
    pub fn with<F>(mut self, tag: impl Into<String>, reviver: F) -> Self
    where
        F: Fn(&JsonValue) -> Result<EjsonValue, HookError> + Send + Sync + 'static,
    {
        self.insert(tag, reviver);
        self
    }

    pub fn get(&self, tag: &str) -> Option<&FromJson> {
        self.revivers.get(tag).map(|reviver| reviver.as_ref())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.revivers.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.revivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revivers.is_empty()
    }
}

impl fmt::Debug for DecodeHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&str> = self.revivers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        f.debug_struct("DecodeHooks").field("tags", &tags).finish()
    }
}

/// Both halves of a hook set, registered symmetrically by tag.
#[derive(Clone, Default, Debug)]
pub struct TypeHooks {
    encode: EncodeHooks,
    decode: DecodeHooks,
}

impl TypeHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P, F, R>(
        &mut self,
        tag: impl Into<String>,
        predicate: P,
        forward: F,
        reverse: R,
    ) -> &mut Self
    where
        P: Fn(&EjsonValue) -> bool + Send + Sync + 'static,
        F: Fn(&EjsonValue) -> Result<JsonValue, HookError> + Send + Sync + 'static,
        R: Fn(&JsonValue) -> Result<EjsonValue, HookError> + Send + Sync + 'static,
    {
        let tag = tag.into();
        self.encode.push(tag.clone(), predicate, forward);
        self.decode.insert(tag, reverse);
        self
    }

    pub fn register_type<T, F, R>(
        &mut self,
        tag: impl Into<String>,
        forward: F,
        reverse: R,
    ) -> &mut Self
    where
        T: Extension,
        F: Fn(&T) -> Result<JsonValue, HookError> + Send + Sync + 'static,
        R: Fn(&JsonValue) -> Result<T, HookError> + Send + Sync + 'static,
    {
        let tag = tag.into();
        self.encode.push_type::<T, F>(tag.clone(), forward);
        self.decode
            .insert(tag, move |json| reverse(json).map(EjsonValue::custom));
        self
    }

    pub fn encode_hooks(&self) -> &EncodeHooks {
        &self.encode
    }

    pub fn decode_hooks(&self) -> &DecodeHooks {
        &self.decode
    }

    pub fn into_parts(self) -> (EncodeHooks, DecodeHooks) {
        (self.encode, self.decode)
    }
}
