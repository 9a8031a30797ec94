//! Persisted worker record so separate invocations agree on the current
//! generation.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::controller::WorkerState;
use crate::generation::GenerationName;

const RECORD_FILE: &str = "worker.toml";

/// What the last lifecycle run left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRecord {
    /// Identifies the run that wrote this record.
    pub id: Uuid,
    /// Generation named by the controller.
    pub generation: GenerationName,
    /// Lifecycle state reached.
    pub state: WorkerState,
    /// When the generation was installed, if it was.
    pub installed_at: Option<DateTime<Utc>>,
    /// When activation last completed, if it did.
    pub activated_at: Option<DateTime<Utc>>,
    /// Number of manifest entries stored.
    pub entries: usize,
    /// Stale generations that could not be evicted.
    #[serde(default)]
    pub lingering: Vec<GenerationName>,
}

impl WorkerRecord {
    /// Creates a record for a freshly constructed controller.
    #[must_use]
    pub fn new(generation: GenerationName) -> Self {
        Self {
            id: Uuid::new_v4(),
            generation,
            state: WorkerState::Parsed,
            installed_at: None,
            activated_at: None,
            entries: 0,
            lingering: Vec::new(),
        }
    }

    /// Path of the record file inside `dir`.
    #[must_use]
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(RECORD_FILE)
    }

    /// Marks a successful install.
    pub fn mark_installed(&mut self, entries: usize) {
        self.state = WorkerState::Installed;
        self.installed_at = Some(Utc::now());
        self.entries = entries;
    }

    /// Marks a failed install.
    pub fn mark_redundant(&mut self) {
        self.state = WorkerState::Redundant;
    }

    /// Marks a completed activation.
    pub fn mark_activated(&mut self, lingering: Vec<GenerationName>) {
        self.state = WorkerState::Activated;
        self.activated_at = Some(Utc::now());
        self.lingering = lingering;
    }

    /// Saves the record into `dir` atomically (write tmp + rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;

        let path = Self::path_in(dir);
        let tmp_path = path.with_extension("toml.tmp");

        let toml_str = toml::to_string(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        std::fs::write(&tmp_path, toml_str)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Loads the record from `dir`, returning `None` if none was saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(dir: &Path) -> std::io::Result<Option<Self>> {
        let contents = match std::fs::read_to_string(Self::path_in(dir)) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        toml::from_str(&contents)
            .map(Some)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn name() -> GenerationName {
        GenerationName::new("django-pwa-v", "v1")
    }

    #[test]
    fn record_save_and_load() {
        let dir = TempDir::new().unwrap();
        let mut record = WorkerRecord::new(name());
        record.mark_installed(20);
        record.save(dir.path()).unwrap();

        let loaded = WorkerRecord::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.state, WorkerState::Installed);
        assert!(!WorkerRecord::path_in(dir.path()).with_extension("toml.tmp").exists());
    }

    #[test]
    fn load_missing_record_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(WorkerRecord::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn load_garbage_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(WorkerRecord::path_in(dir.path()), "not = [valid").unwrap();
        assert!(WorkerRecord::load(dir.path()).is_err());
    }

    #[test]
    fn lifecycle_marks() {
        let mut record = WorkerRecord::new(name());
        assert_eq!(record.state, WorkerState::Parsed);
        record.mark_redundant();
        assert_eq!(record.state, WorkerState::Redundant);
        record.mark_installed(3);
        record.mark_activated(vec![GenerationName::new("django-pwa-v", "old")]);
        assert_eq!(record.state, WorkerState::Activated);
        assert!(record.activated_at.is_some());
        assert_eq!(record.lingering.len(), 1);
    }
}
