//! Profile fields collected during onboarding.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Keys of the fields the onboarding flow fills in.
pub mod profile_keys {
    pub const BRAND_NAME: &str = "brandName";
    pub const CATEGORY: &str = "category";
}

/// String → string map of onboarding answers.
///
/// Stored as a JSON object. Fields are only ever added or overwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile(BTreeMap<String, String>);

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Add or overwrite a field.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style [`Profile::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn brand_name(&self) -> Option<&str> {
        self.get(profile_keys::BRAND_NAME)
    }

    pub fn category(&self) -> Option<&str> {
        self.get(profile_keys::CATEGORY)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
