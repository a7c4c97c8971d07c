//! Domain entities exchanged with external collaborators.

use crate::domain::node::ValueType;

/// One value held by the overlay record store.
///
/// Records are keyed by `(path, name)`: `path` is the absolute path of the
/// node's parent and `name` its name. List positions use the list's own path
/// and the decimal index as name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayRecord {
    pub path: String,
    pub name: String,
    pub value: String,
    pub value_type: ValueType,
    pub encrypted: bool,
}

impl OverlayRecord {
    pub fn new(path: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            value: value.into(),
            value_type: ValueType::default(),
            encrypted: false,
        }
    }

    pub fn with_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    pub fn key(&self) -> (&str, &str) {
        (&self.path, &self.name)
    }
}
