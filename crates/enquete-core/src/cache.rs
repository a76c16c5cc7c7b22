use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::Result;
use crate::models::ResumeEntry;

/// Client-local resume slot: one JSON file remembering which session is in
/// progress and which step the user last saw. At most one entry exists at a
/// time; completing a session removes it.
#[derive(Debug, Clone)]
pub struct ResumeCache {
    path: PathBuf,
}

impl ResumeCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the slot. A missing file means no entry; unreadable content is
    /// discarded and reported as no entry, since a slot that cannot be
    /// parsed cannot be resumed either.
    pub fn load(&self) -> Result<Option<ResumeEntry>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(_) => {
                let _ = fs::remove_file(&self.path);
                Ok(None)
            }
        }
    }

    pub fn save(&self, session_id: &str, current_step: usize) -> Result<ResumeEntry> {
        let entry = ResumeEntry {
            session_id: session_id.to_string(),
            current_step,
            timestamp: Utc::now(),
        };
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&entry)?)?;
        Ok(entry)
    }

    /// Removes the slot. Returns whether an entry existed.
    pub fn clear(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn slot_round_trip() {
        let temp = tempdir().expect("tempdir");
        let cache = ResumeCache::new(temp.path().join("resume.json"));

        assert!(cache.load().expect("load empty").is_none());

        cache.save("session-1", 3).expect("save");
        let entry = cache.load().expect("load").expect("entry present");
        assert_eq!(entry.session_id, "session-1");
        assert_eq!(entry.current_step, 3);

        assert!(cache.clear().expect("clear"));
        assert!(!cache.clear().expect("second clear"));
        assert!(cache.load().expect("load after clear").is_none());
    }

    #[test]
    fn save_replaces_previous_entry() {
        let temp = tempdir().expect("tempdir");
        let cache = ResumeCache::new(temp.path().join("resume.json"));

        cache.save("session-1", 0).expect("save");
        cache.save("session-1", 4).expect("save again");

        let entry = cache.load().expect("load").expect("entry present");
        assert_eq!(entry.current_step, 4);
    }

    #[test]
    fn corrupt_slot_is_discarded() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("resume.json");
        fs::write(&path, "{ not json").expect("write corrupt slot");

        let cache = ResumeCache::new(&path);
        assert!(cache.load().expect("load corrupt").is_none());
        assert!(!path.exists());
    }

    #[test]
    fn save_creates_missing_parent() {
        let temp = tempdir().expect("tempdir");
        let cache = ResumeCache::new(temp.path().join("nested").join("resume.json"));
        cache.save("session-1", 1).expect("save into nested dir");
        assert!(cache.load().expect("load").is_some());
    }
}
