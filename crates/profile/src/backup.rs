//! One rolling backup per profile, kept in a shared directory.
//!
//! Files are named `{profile_id}_{unix_millis}.json`. Anything else found in
//! the directory is ignored by every operation here.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::Result;
use crate::fs::Filesystem;

const BACKUP_EXTENSION: &str = "json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub profile_id: String,
    pub timestamp_millis: i64,
    pub content: String,
    pub path: PathBuf,
}

impl BackupRecord {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp_millis)
    }
}

/// A backup file name split into its parts, content not yet read.
#[derive(Debug, Clone)]
struct BackupFile {
    profile_id: String,
    timestamp_millis: i64,
    path: PathBuf,
}

fn parse_backup_name(path: &Path) -> Option<BackupFile> {
    if path.extension()?.to_str()? != BACKUP_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (profile_id, millis) = stem.rsplit_once('_')?;
    if profile_id.is_empty() {
        return None;
    }
    let timestamp_millis = millis.parse().ok()?;
    Some(BackupFile {
        profile_id: profile_id.to_string(),
        timestamp_millis,
        path: path.to_path_buf(),
    })
}

pub struct BackupManager {
    fs: Arc<dyn Filesystem>,
    dir: PathBuf,
}

impl BackupManager {
    /// Creates the backup directory if needed. Without it no profile can be
    /// protected, so failure is returned to the caller as fatal.
    pub fn open(fs: Arc<dyn Filesystem>, dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs.create_directory(&dir)?;
        Ok(Self { fs, dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `content` as the newest backup of `id` unless it is identical to
    /// the current one. Returns whether a file was written.
    pub fn backup(&self, id: &str, content: &str) -> Result<bool> {
        let latest = self.latest_file(id)?;
        if let Some(latest) = &latest {
            if self.fs.read_all(&latest.path)? == content {
                debug!(profile = %id, "backup unchanged; skipping");
                return Ok(false);
            }
        }

        // Never reuse the previous name, even within the same millisecond.
        let now = Utc::now().timestamp_millis();
        let timestamp = match &latest {
            Some(latest) => now.max(latest.timestamp_millis.saturating_add(1)),
            None => now,
        };
        let path = self.dir.join(format!("{id}_{timestamp}.{BACKUP_EXTENSION}"));
        self.fs.write_all(&path, content)?;

        let mut replaced = 0usize;
        for stale in self.files_of(id)? {
            if stale.path != path {
                self.fs.delete(&stale.path)?;
                replaced += 1;
            }
        }

        info!(profile = %id, path = %path.display(), replaced, "profile backed up");
        Ok(true)
    }

    pub fn most_recent(&self, id: &str) -> Result<Option<BackupRecord>> {
        let Some(file) = self.latest_file(id)? else {
            return Ok(None);
        };
        let content = self.fs.read_all(&file.path)?;
        Ok(Some(BackupRecord {
            profile_id: file.profile_id,
            timestamp_millis: file.timestamp_millis,
            content,
            path: file.path,
        }))
    }

    /// Delete backups whose profile id is not in `active_ids`.
    pub fn prune_orphans(&self, active_ids: &[String]) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for file in self.all_files()? {
            if active_ids.iter().any(|id| *id == file.profile_id) {
                continue;
            }
            debug!(path = %file.path.display(), "deleting backup not linked to a profile");
            self.fs.delete(&file.path)?;
            removed.push(file.path);
        }
        if !removed.is_empty() {
            info!(count = removed.len(), "orphan backups pruned");
        }
        Ok(removed)
    }

    pub fn delete_all(&self, id: &str) -> Result<usize> {
        let files = self.files_of(id)?;
        for file in &files {
            self.fs.delete(&file.path)?;
        }
        Ok(files.len())
    }

    fn all_files(&self) -> Result<Vec<BackupFile>> {
        Ok(self
            .fs
            .list_children(&self.dir)?
            .iter()
            .filter(|path| !self.fs.is_dir(path))
            .filter_map(|path| parse_backup_name(path))
            .collect())
    }

    fn files_of(&self, id: &str) -> Result<Vec<BackupFile>> {
        Ok(self
            .all_files()?
            .into_iter()
            .filter(|file| file.profile_id == id)
            .collect())
    }

    fn latest_file(&self, id: &str) -> Result<Option<BackupFile>> {
        Ok(self
            .files_of(id)?
            .into_iter()
            .max_by_key(|file| file.timestamp_millis))
    }
}
