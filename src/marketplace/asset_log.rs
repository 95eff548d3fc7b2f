use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::warn;

use crate::error::{PipelineError, Result};

/// One downloaded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub download_date: String,
    pub image_url: String,
}

/// Persistent map of `"<item_id>_<index>"` to [`AssetRecord`].
///
/// Stored as a single JSON object. Every [`AssetLog::record`] rewrites the file through a
/// temp file in the same directory, so a crash mid-write leaves the previous version.
#[derive(Debug)]
pub struct AssetLog {
    path: PathBuf,
    entries: BTreeMap<String, AssetRecord>,
}

impl AssetLog {
    /// Load the log at `path`. A missing or unreadable file gives an empty log.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!(
                    "Asset log {} is not valid JSON ({}); starting empty",
                    path.display(),
                    e
                );
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self { path, entries }
    }

    pub fn key(item_id: &str, index: usize) -> String {
        format!("{}_{}", item_id, index)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&AssetRecord> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Add an entry stamped with the current local time and persist.
    pub fn record(&mut self, key: String, image_url: &str) -> Result<()> {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        self.record_at(key, image_url, now)
    }

    pub fn record_at(&mut self, key: String, image_url: &str, at: OffsetDateTime) -> Result<()> {
        let download_date = at
            .format(&Rfc3339)
            .map_err(|e| PipelineError::Config(format!("cannot format timestamp: {}", e)))?;
        let record = AssetRecord {
            download_date,
            image_url: image_url.to_string(),
        };
        let previous = self.entries.insert(key.clone(), record);
        // memory must not claim what the file does not hold
        if let Err(e) = self.persist() {
            match previous {
                Some(previous) => self.entries.insert(key, previous),
                None => self.entries.remove(&key),
            };
            return Err(e);
        }
        Ok(())
    }

    pub fn persist(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        serde_json::to_writer_pretty(&mut tmp, &self.entries)?;
        tmp.write_all(b"\n")
            .map_err(|e| PipelineError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| PipelineError::io(&self.path, e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let log = AssetLog::open(dir.path().join("image_log.json"));
        assert!(log.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("image_log.json");
        fs::write(&path, "{not json").unwrap();
        assert!(AssetLog::open(&path).is_empty());
    }

    #[test]
    fn test_record_persists_and_reloads() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("logs/image_log.json");

        let mut log = AssetLog::open(&path);
        let key = AssetLog::key("v1|1234|0", 0);
        assert_eq!(key, "v1|1234|0_0");
        log.record_at(
            key.clone(),
            "https://i.example.com/a.jpg",
            datetime!(2024-11-20 12:34:56 UTC),
        )
        .unwrap();

        let reloaded = AssetLog::open(&path);
        assert_eq!(reloaded.len(), 1);
        let record = reloaded.get(&key).unwrap();
        assert_eq!(record.image_url, "https://i.example.com/a.jpg");
        assert_eq!(record.download_date, "2024-11-20T12:34:56Z");

        // plain JSON object keyed by "<item>_<index>"
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw[&key]["image_url"].is_string());
        assert!(raw[&key]["download_date"].is_string());
    }

    #[test]
    fn test_failed_persist_leaves_entry_out() {
        let dir = tempfile::TempDir::new().unwrap();
        // a directory where the log file should be makes the rename fail
        let path = dir.path().join("image_log.json");
        fs::create_dir_all(path.join("occupied")).unwrap();

        let mut log = AssetLog::open(&path);
        assert!(log.record("v1|9|0_0".to_string(), "u").is_err());
        assert!(!log.contains("v1|9|0_0"));
        assert!(log.is_empty());
    }

    #[test]
    fn test_record_keeps_existing_entries() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("image_log.json");
        fs::write(
            &path,
            r#"{"old_0": {"download_date": "2024-01-01T00:00:00", "image_url": "u"}}"#,
        )
        .unwrap();

        let mut log = AssetLog::open(&path);
        assert!(log.contains("old_0"));
        log.record("new_1".to_string(), "v").unwrap();

        let reloaded = AssetLog::open(&path);
        assert!(reloaded.contains("old_0"));
        assert!(reloaded.contains("new_1"));
        // no temp files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
