//! File-state snapshots: capture before risky steps, restore on
//! rollback.
//!
//! Snapshots form an append-only per-task list, held in memory and
//! persisted as JSON beneath `{base}/sessions/{task-id}/`. Restores
//! create parent directories as needed; on error the restore stops at
//! the first failure and surfaces it, leaving the partial restore in
//! place for the caller to decide what to do next.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An immutable capture of a set of file contents. `None` records a
/// path that did not exist at capture time; rolling back deletes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: String,
    pub task_id: String,
    pub label: String,
    pub files: BTreeMap<String, Option<String>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    Created,
    Modified,
    Deleted,
}

/// One path's difference between a snapshot and the current disk state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileDiff {
    pub path: String,
    pub status: DiffStatus,
    pub old: Option<String>,
    pub new: Option<String>,
}

#[derive(Default)]
struct SnapshotIndex {
    snapshots: HashMap<String, Snapshot>,
    by_task: HashMap<String, Vec<String>>,
}

/// Owns all snapshots. The map lock is never held across file I/O.
pub struct SnapshotManager {
    base: PathBuf,
    index: RwLock<SnapshotIndex>,
}

impl SnapshotManager {
    pub fn new(base: PathBuf) -> Self {
        Self {
            base,
            index: RwLock::new(SnapshotIndex::default()),
        }
    }

    fn snapshot_path(&self, task_id: &str, snapshot_id: &str) -> PathBuf {
        self.base
            .join("sessions")
            .join(task_id)
            .join(format!("{snapshot_id}.json"))
    }

    /// Captures the current contents of the listed files. Missing files
    /// are recorded as absent; any other read error aborts the capture.
    pub fn create_snapshot(&self, task_id: &str, files: &[String], label: &str) -> Result<Snapshot> {
        let mut captured = BTreeMap::new();

        for path in files {
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    captured.insert(path.clone(), Some(content));
                }
                Err(error) if error.kind() == ErrorKind::NotFound => {
                    captured.insert(path.clone(), None);
                }
                Err(error) => {
                    return Err(Error::SnapshotIo {
                        path: path.clone(),
                        source: error,
                    });
                }
            }
        }

        let snapshot = Snapshot {
            id: format!("snap_{}", uuid::Uuid::new_v4()),
            task_id: task_id.to_string(),
            label: label.to_string(),
            files: captured,
            created_at: Utc::now(),
        };

        let disk_path = self.snapshot_path(task_id, &snapshot.id);
        persist(&disk_path, &snapshot)?;

        let mut index = self.write_index();
        index
            .by_task
            .entry(task_id.to_string())
            .or_default()
            .push(snapshot.id.clone());
        index.snapshots.insert(snapshot.id.clone(), snapshot.clone());

        Ok(snapshot)
    }

    pub fn get(&self, snapshot_id: &str) -> Option<Snapshot> {
        self.read_index().snapshots.get(snapshot_id).cloned()
    }

    /// Snapshots for a task, oldest first.
    pub fn for_task(&self, task_id: &str) -> Vec<Snapshot> {
        let index = self.read_index();
        index
            .by_task
            .get(task_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| index.snapshots.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Restores the most recent snapshot for a task.
    pub fn rollback(&self, task_id: &str) -> Result<String> {
        let latest = {
            let index = self.read_index();
            index
                .by_task
                .get(task_id)
                .and_then(|ids| ids.last().cloned())
                .ok_or_else(|| Error::NoSnapshot(task_id.to_string()))?
        };

        self.rollback_to(&latest)?;
        Ok(latest)
    }

    /// Restores an explicit snapshot, byte for byte. Stops at the first
    /// error; earlier restores stand.
    pub fn rollback_to(&self, snapshot_id: &str) -> Result<()> {
        let snapshot = self
            .get(snapshot_id)
            .ok_or_else(|| Error::SnapshotNotFound(snapshot_id.to_string()))?;

        for (path, content) in &snapshot.files {
            restore_file(path, content.as_deref()).map_err(|source| Error::SnapshotIo {
                path: path.clone(),
                source,
            })?;
        }

        Ok(())
    }

    /// Current disk state versus a snapshot, one record per changed
    /// path.
    pub fn diff(&self, snapshot_id: &str) -> Result<Vec<FileDiff>> {
        let snapshot = self
            .get(snapshot_id)
            .ok_or_else(|| Error::SnapshotNotFound(snapshot_id.to_string()))?;

        let mut diffs = Vec::new();

        for (path, captured) in &snapshot.files {
            let current = match std::fs::read_to_string(path) {
                Ok(content) => Some(content),
                Err(error) if error.kind() == ErrorKind::NotFound => None,
                Err(error) => {
                    return Err(Error::SnapshotIo {
                        path: path.clone(),
                        source: error,
                    });
                }
            };

            let status = match (captured, &current) {
                (Some(old), Some(new)) if old != new => DiffStatus::Modified,
                (Some(_), None) => DiffStatus::Deleted,
                (None, Some(_)) => DiffStatus::Created,
                _ => continue,
            };

            diffs.push(FileDiff {
                path: path.clone(),
                status,
                old: captured.clone(),
                new: current,
            });
        }

        Ok(diffs)
    }

    /// Drops a task's snapshots from memory and disk.
    pub fn clean(&self, task_id: &str) -> Result<()> {
        let removed = {
            let mut index = self.write_index();
            let ids = index.by_task.remove(task_id).unwrap_or_default();
            for id in &ids {
                index.snapshots.remove(id);
            }
            ids
        };

        if !removed.is_empty() {
            let dir = self.base.join("sessions").join(task_id);
            std::fs::remove_dir_all(&dir).map_err(|source| Error::SnapshotIo {
                path: dir.display().to_string(),
                source,
            })?;
        }

        Ok(())
    }

    fn read_index(&self) -> std::sync::RwLockReadGuard<'_, SnapshotIndex> {
        self.index.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_index(&self) -> std::sync::RwLockWriteGuard<'_, SnapshotIndex> {
        self.index.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Writes through a sibling temp file and renames, so a crash mid-write
/// never leaves a truncated snapshot on disk.
fn persist(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let io = |source: std::io::Error| Error::SnapshotIo {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io)?;
    }

    let body = serde_json::to_vec_pretty(snapshot)
        .map_err(|e| io(std::io::Error::new(ErrorKind::InvalidData, e)))?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body).map_err(io)?;
    std::fs::rename(&tmp, path).map_err(io)
}

fn restore_file(path: &str, content: Option<&str>) -> std::io::Result<()> {
    match content {
        Some(content) => {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)
        }
        None => match std::fs::remove_file(path) {
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            result => result,
        },
    }
}
