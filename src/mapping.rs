use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use crate::error::StartupError;

/// Ordered dish keys plus the descriptive record for each.
///
/// Index `i` names the class at position `i` of the model output. Order is
/// the key order of the metadata document.
#[derive(Debug, Clone)]
pub struct LabelSet {
    keys: Vec<String>,
    metadata: Map<String, Value>,
}

impl LabelSet {
    pub fn from_metadata(metadata: Map<String, Value>) -> Result<Self, StartupError> {
        if metadata.is_empty() {
            return Err(StartupError::EmptyLabelSet);
        }
        let keys = metadata.keys().cloned().collect();
        Ok(Self { keys, metadata })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.keys.get(index).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.metadata.contains_key(key)
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }
}

/// Reads the food info JSON document and takes its keys as the label set.
pub fn load_class_mapping(file_path: &Path) -> Result<LabelSet, StartupError> {
    let raw = fs::read_to_string(file_path).map_err(|source| StartupError::MetadataIo {
        path: file_path.to_path_buf(),
        source,
    })?;
    let value: Value =
        serde_json::from_str(&raw).map_err(|source| StartupError::MetadataParse {
            path: file_path.to_path_buf(),
            source,
        })?;
    match value {
        Value::Object(map) => LabelSet::from_metadata(map),
        _ => Err(StartupError::MetadataNotObject(file_path.to_path_buf())),
    }
}
