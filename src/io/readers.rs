//! Reader directory - per-reader metadata lookup
//!
//! The engine only needs `lookup`. The in-memory directory is loaded once from a
//! JSON array and never mutated while a run holds it.

use crate::domain::types::ReaderInfo;
use anyhow::Context;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Source of reader metadata
pub trait ReaderDirectory {
    fn lookup(&self, reader_id: &str) -> Option<&ReaderInfo>;
}

/// Reader record as stored on disk
#[derive(Debug, Deserialize)]
struct ReaderRecord {
    reader_id: String,
    #[serde(default)]
    direction: Option<String>,
    #[serde(default)]
    orientation: Option<String>,
    #[serde(default)]
    road: Option<String>,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
}

impl From<ReaderRecord> for ReaderInfo {
    fn from(r: ReaderRecord) -> Self {
        Self {
            reader_id: r.reader_id,
            direction: r.direction,
            orientation: r.orientation,
            road: r.road,
            latitude: r.latitude,
            longitude: r.longitude,
        }
    }
}

/// Read-only directory backed by a hash map
#[derive(Debug, Default, Clone)]
pub struct InMemoryReaderDirectory {
    readers: FxHashMap<String, ReaderInfo>,
}

impl InMemoryReaderDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a reader
    pub fn insert(&mut self, reader: ReaderInfo) {
        self.readers.insert(reader.reader_id.clone(), reader);
    }

    pub fn len(&self) -> usize {
        self.readers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }

    /// Parse a JSON array of reader records
    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let records: Vec<ReaderRecord> =
            serde_json::from_str(content).context("Failed to parse reader directory JSON")?;

        let mut directory = Self::new();
        for record in records {
            if directory.readers.contains_key(&record.reader_id) {
                warn!(reader_id = %record.reader_id, "reader_duplicate_replaced");
            }
            directory.insert(record.into());
        }
        Ok(directory)
    }

    /// Load the directory from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read reader directory {}", path.display()))?;
        let directory = Self::from_json(&content)
            .with_context(|| format!("Failed to load reader directory {}", path.display()))?;

        let without_direction =
            directory.readers.values().filter(|r| r.resolved_direction().is_none()).count();
        info!(
            path = %path.display(),
            readers = %directory.len(),
            without_direction = %without_direction,
            "reader_directory_loaded"
        );
        Ok(directory)
    }
}

impl FromIterator<ReaderInfo> for InMemoryReaderDirectory {
    fn from_iter<I: IntoIterator<Item = ReaderInfo>>(iter: I) -> Self {
        let mut directory = Self::new();
        for reader in iter {
            directory.insert(reader);
        }
        directory
    }
}

impl ReaderDirectory for InMemoryReaderDirectory {
    fn lookup(&self, reader_id: &str) -> Option<&ReaderInfo> {
        self.readers.get(reader_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_from_json() {
        let json = r#"[
            {"reader_id": "R1", "direction": "Norte", "orientation": "Creciente",
             "road": "A-4", "latitude": 40.41, "longitude": -3.70},
            {"reader_id": "R2"}
        ]"#;
        let directory = InMemoryReaderDirectory::from_json(json).unwrap();

        assert_eq!(directory.len(), 2);
        let r1 = directory.lookup("R1").unwrap();
        assert_eq!(r1.resolved_direction(), Some("Norte"));
        assert_eq!(r1.resolved_road(), Some("A-4"));
        assert_eq!(r1.latitude, Some(40.41));
        let r2 = directory.lookup("R2").unwrap();
        assert_eq!(r2.resolved_direction(), None);
        assert!(directory.lookup("R3").is_none());
    }

    #[test]
    fn test_duplicate_reader_last_wins() {
        let json = r#"[
            {"reader_id": "R1", "direction": "Norte"},
            {"reader_id": "R1", "direction": "Sur"}
        ]"#;
        let directory = InMemoryReaderDirectory::from_json(json).unwrap();
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.lookup("R1").unwrap().resolved_direction(), Some("Sur"));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(br#"[{"reader_id": "CAM001", "direction": "Sur"}]"#).unwrap();
        file.flush().unwrap();

        let directory = InMemoryReaderDirectory::from_file(file.path()).unwrap();
        assert!(directory.lookup("CAM001").is_some());
    }

    #[test]
    fn test_from_file_missing() {
        assert!(InMemoryReaderDirectory::from_file("/nonexistent/readers.json").is_err());
    }

    #[test]
    fn test_invalid_json() {
        assert!(InMemoryReaderDirectory::from_json("{not json").is_err());
    }
}
