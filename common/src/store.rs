use crate::schedule::Schedule;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The persisted schedules document: an ordered collection of schedule
/// records under the `schedules` top-level key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleSet {
    pub schedules: Vec<Schedule>,
}

impl ScheduleSet {
    /// Next free id: max existing id + 1. Ids are never reused, even
    /// after cancellation.
    pub fn next_id(&self) -> u64 {
        self.schedules.iter().map(|s| s.id).max().unwrap_or(0) + 1
    }

    pub fn find(&self, id: u64) -> Option<&Schedule> {
        self.schedules.iter().find(|s| s.id == id)
    }

    pub fn find_mut(&mut self, id: u64) -> Option<&mut Schedule> {
        self.schedules.iter_mut().find(|s| s.id == id)
    }
}

/// File-backed store for the schedules document.
///
/// Loading is tolerant: a missing or corrupt file degrades to an empty
/// set so startup never aborts. Saving is an atomic overwrite and its
/// I/O errors propagate to the caller.
pub struct ScheduleStore {
    path: PathBuf,
}

impl ScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> ScheduleSet {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return ScheduleSet::default(),
            Err(e) => {
                log::error!(
                    "Failed to read schedule file {}: {}; starting with an empty set",
                    self.path.display(),
                    e
                );
                return ScheduleSet::default();
            }
        };
        match serde_json::from_str(&content) {
            Ok(set) => set,
            Err(e) => {
                log::error!(
                    "Schedule file {} is corrupt ({}); starting with an empty set",
                    self.path.display(),
                    e
                );
                ScheduleSet::default()
            }
        }
    }

    /// Write the full document to a sibling temp file, then rename it
    /// over the target so readers never observe a partial write.
    pub fn save(&self, set: &ScheduleSet) -> io::Result<()> {
        let json = serde_json::to_string_pretty(set).map_err(io::Error::from)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
