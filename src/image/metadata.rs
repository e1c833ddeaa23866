//! Image metadata: a protected block the library maintains and a free-form
//! public map for callers.
//!
//! Protected fields (name, id, format, kind) are stored as typed struct
//! fields and serialized to the store's `meta` subgroup. The public map is
//! persisted separately under `userdata` and may hold anything except keys
//! that shadow a protected field.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::image::format::{ImageFormat, ImageKind};

/// Keys reserved for the protected metadata block.
pub const PROTECTED_KEYS: &[&str] = &["ImageName", "ImageId", "ImageFormat", "ImageKind"];

/// Protected, library-maintained metadata for one image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageMeta {
    pub name: String,
    pub id: String,
    pub format: ImageFormat,
    #[serde(default)]
    pub kind: ImageKind,
}

impl ImageMeta {
    pub fn new(name: impl Into<String>, format: ImageFormat) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            format,
            kind: ImageKind::Base,
        }
    }
}

/// Free-form public metadata. Keys colliding with the protected block are
/// rejected so the two namespaces cannot diverge.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserData(BTreeMap<String, String>);

impl UserData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key/value pair. Protected keys are refused.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        if PROTECTED_KEYS.contains(&key.as_str()) {
            return Err(Error::MetadataKeyViolation { key });
        }
        self.0.insert(key, value.into());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
