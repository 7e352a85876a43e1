//! The name/value mapping a probe produces.

use serde::ser::{Serialize, SerializeMap, Serializer};

/// Name of the synthetic field holding the content size.
pub const SIZE_FIELD: &str = "SIZE";

/// One reported property of a signature, e.g. `TYPE=ext4`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldEntry {
    pub name: String,
    pub value: String,
}

impl FieldEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Accumulated fields of one probing pass plus the `SIZE` field.
///
/// Setting a name twice keeps its first position and the last value.
/// Serializes as a JSON object in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResults {
    entries: Vec<FieldEntry>,
    size: u64,
}

impl ProbeResults {
    pub(crate) fn new(size: u64) -> Self {
        Self {
            entries: vec![FieldEntry::new(SIZE_FIELD, size.to_string())],
            size,
        }
    }

    pub(crate) fn merge(&mut self, fields: &[FieldEntry]) {
        for field in fields {
            self.set(&field.name, &field.value);
        }
    }

    pub(crate) fn set_size(&mut self, size: u64) {
        self.size = size;
        self.set(SIZE_FIELD, &size.to_string());
    }

    fn set(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => value.clone_into(&mut entry.value),
            None => self.entries.push(FieldEntry::new(name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The `SIZE` value as a number.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Number of fields, `SIZE` included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing besides `SIZE` was reported.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.name == SIZE_FIELD)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|e| (e.name.as_str(), e.value.as_str()))
    }
}

impl Serialize for ProbeResults {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.name, &entry.value)?;
        }
        map.end()
    }
}
