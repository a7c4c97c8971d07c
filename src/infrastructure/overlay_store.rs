//! Overlay record stores: a TOML records file and an in-memory store.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{OverlayRecord, ValueType};
use crate::infrastructure::traits::{FileSystem, OverlayStore};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct RecordEntry {
    config: String,
    major: u64,
    path: String,
    name: String,
    value: String,
    #[serde(rename = "type", default = "default_type")]
    value_type: String,
    #[serde(default)]
    encrypted: bool,
}

fn default_type() -> String {
    ValueType::String.as_str().to_string()
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RecordsFile {
    #[serde(default)]
    record: Vec<RecordEntry>,
}

impl RecordEntry {
    fn to_record(&self) -> io::Result<OverlayRecord> {
        let value_type: ValueType = self
            .value_type
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(OverlayRecord::new(&self.path, &self.name, &self.value)
            .with_type(value_type)
            .encrypted(self.encrypted))
    }
}

/// Records kept in a TOML file of `[[record]]` tables. A missing file holds
/// no records.
pub struct TomlOverlayStore {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl TomlOverlayStore {
    pub fn new(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: path.into(),
            fs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> io::Result<RecordsFile> {
        if !self.fs.exists(&self.path) {
            debug!("read: no records file at {}", self.path.display());
            return Ok(RecordsFile::default());
        }
        let content = self.fs.read_to_string(&self.path)?;
        toml::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Replaces the records of `config_id`/`major` and writes the file back.
    pub fn save(&self, config_id: &str, major: u64, records: &[OverlayRecord]) -> io::Result<()> {
        let mut file = self.read()?;
        file.record
            .retain(|r| !(r.config == config_id && r.major == major));
        file.record.extend(records.iter().map(|r| RecordEntry {
            config: config_id.to_string(),
            major,
            path: r.path.clone(),
            name: r.name.clone(),
            value: r.value.clone(),
            value_type: r.value_type.as_str().to_string(),
            encrypted: r.encrypted,
        }));
        let content = toml::to_string_pretty(&file)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.fs.write(&self.path, &content)
    }
}

impl OverlayStore for TomlOverlayStore {
    fn lookup(&self, config_id: &str, major: u64) -> io::Result<Vec<OverlayRecord>> {
        let records: Vec<OverlayRecord> = self
            .read()?
            .record
            .iter()
            .filter(|r| r.config == config_id && r.major == major)
            .map(RecordEntry::to_record)
            .collect::<io::Result<_>>()?;
        debug!(
            "lookup: {} record(s) for {} v{}",
            records.len(),
            config_id,
            major
        );
        Ok(records)
    }
}

/// Records held in memory, keyed by configuration id and major version.
#[derive(Debug, Default)]
pub struct MemoryOverlayStore {
    records: RwLock<HashMap<(String, u64), Vec<OverlayRecord>>>,
}

impl MemoryOverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, config_id: &str, major: u64, record: OverlayRecord) {
        let mut records = match self.records.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        records
            .entry((config_id.to_string(), major))
            .or_default()
            .push(record);
    }
}

impl OverlayStore for MemoryOverlayStore {
    fn lookup(&self, config_id: &str, major: u64) -> io::Result<Vec<OverlayRecord>> {
        let records = self
            .records
            .read()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(records
            .get(&(config_id.to_string(), major))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::traits::RealFileSystem;
    use tempfile::TempDir;

    const RECORDS: &str = r#"
[[record]]
config = "orders"
major = 1
path = "/orders"
name = "timeout"
value = "60"
type = "int"

[[record]]
config = "orders"
major = 2
path = "/orders"
name = "timeout"
value = "90"
"#;

    #[test]
    fn test_lookup_filters_by_config_and_major() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.toml");
        std::fs::write(&path, RECORDS).unwrap();
        let store = TomlOverlayStore::new(&path, Arc::new(RealFileSystem));

        let records = store.lookup("orders", 1).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, "60");
        assert_eq!(records[0].value_type, ValueType::Int);
        assert!(store.lookup("billing", 1).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_has_no_records() {
        let dir = TempDir::new().unwrap();
        let store = TomlOverlayStore::new(dir.path().join("none.toml"), Arc::new(RealFileSystem));
        assert!(store.lookup("orders", 1).unwrap().is_empty());
    }

    #[test]
    fn test_save_replaces_records_of_same_major() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.toml");
        std::fs::write(&path, RECORDS).unwrap();
        let store = TomlOverlayStore::new(&path, Arc::new(RealFileSystem));

        store
            .save("orders", 1, &[OverlayRecord::new("/orders", "retries", "3")])
            .unwrap();

        let records = store.lookup("orders", 1).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "retries");
        assert_eq!(store.lookup("orders", 2).unwrap().len(), 1);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryOverlayStore::new();
        store.insert("orders", 1, OverlayRecord::new("/orders", "timeout", "60"));
        assert_eq!(store.lookup("orders", 1).unwrap().len(), 1);
        assert!(store.lookup("orders", 2).unwrap().is_empty());
    }
}
