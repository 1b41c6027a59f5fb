//! Sensitive-data masking.
//!
//! Any object key in the sensitive set (compared case-insensitively) has its
//! value replaced with [`MASK_TOKEN`], whatever that value is. Masking recurses
//! through nested objects and arrays; scalars under non-sensitive keys are
//! left alone. Applying the mask twice gives the same result as applying it
//! once.

use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Replacement for masked values.
pub const MASK_TOKEN: &str = "***FILTERED***";

/// Masks values whose keys are in a sensitive set.
#[derive(Debug, Clone, Default)]
pub struct Masker {
    /// Lower-cased.
    keys: HashSet<String>,
}

impl Masker {
    /// Create a masker for the given keys.
    pub fn new(keys: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self {
            keys: keys.into_iter().map(|k| k.as_ref().to_lowercase()).collect(),
        }
    }

    /// Whether `key` is sensitive.
    pub fn is_sensitive(&self, key: &str) -> bool {
        !self.keys.is_empty() && self.keys.contains(&key.to_lowercase())
    }

    /// Whether the masker has nothing to mask.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Recursively mask a JSON value in place.
    pub fn mask_value(&self, value: &mut Value) {
        if self.keys.is_empty() {
            return;
        }
        match value {
            Value::Object(map) => {
                for (key, v) in map.iter_mut() {
                    if self.is_sensitive(key) {
                        *v = Value::String(MASK_TOKEN.to_string());
                    } else {
                        self.mask_value(v);
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.mask_value(item);
                }
            }
            _ => {}
        }
    }

    /// Mask header values in place.
    pub fn mask_headers(&self, headers: &mut BTreeMap<String, String>) {
        for (name, value) in headers.iter_mut() {
            if self.is_sensitive(name) {
                *value = MASK_TOKEN.to_string();
            }
        }
    }
}
