//! What happens to a profile the validator could not heal: restore the most
//! recent backup, or quarantine the profile for the rest of the run.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{info, warn};

use crate::error::Result;
use crate::store::ProfileStore;

/// Append-only set of profile ids excluded for the rest of the process.
/// There is no removal operation.
#[derive(Debug, Default)]
pub struct QuarantineSet {
    ids: Mutex<BTreeSet<String>>,
}

impl QuarantineSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `id` was already quarantined.
    pub fn insert(&self, id: &str) -> bool {
        self.lock().insert(id.to_string())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Everything the operator needs to salvage a quarantined profile by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantineReport {
    pub id: String,
    pub directory: PathBuf,
    /// File names left in the directory and, one level down, in each
    /// sub-directory.
    pub remaining_files: Vec<String>,
    pub directory_removed: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    Restored { backup_timestamp: i64 },
    Quarantined(QuarantineReport),
}

/// Resolve an unrecoverable profile. User content is never deleted: only a
/// blank primary file and an empty profile directory are removed.
pub fn recover(
    id: &str,
    reason: &str,
    store: &ProfileStore,
    quarantine: &QuarantineSet,
) -> Result<RecoveryOutcome> {
    warn!(profile = %id, reason, "profile data corrupted; attempting restore");

    match restore_from_backup(id, store) {
        Ok(Some(timestamp)) => {
            info!(profile = %id, backup_timestamp = timestamp, "profile restored from backup");
            return Ok(RecoveryOutcome::Restored {
                backup_timestamp: timestamp,
            });
        }
        Ok(None) => {}
        Err(err) => warn!(profile = %id, %err, "restore from backup failed"),
    }

    quarantine.insert(id);
    let report = quarantine_files(id, store)?;
    warn!(
        profile = %id,
        directory = %report.directory.display(),
        remaining = report.remaining_files.len(),
        removed = report.directory_removed,
        "profile quarantined"
    );
    Ok(RecoveryOutcome::Quarantined(report))
}

/// Writes the most recent backup back over the primary file when that backup
/// itself deserializes. Returns its timestamp on success.
fn restore_from_backup(id: &str, store: &ProfileStore) -> Result<Option<i64>> {
    let Some(record) = store.backups().most_recent(id)? else {
        return Ok(None);
    };
    if let Err(err) = store.codec().deserialize(&record.content) {
        warn!(profile = %id, path = %record.path.display(), %err, "backup is unusable");
        return Ok(None);
    }
    store.restore_raw(id, &record.content)?;
    Ok(Some(record.timestamp_millis))
}

fn quarantine_files(id: &str, store: &ProfileStore) -> Result<QuarantineReport> {
    let directory = store.layout().profile_dir(id);
    store.discard_blank_primary(id)?;

    if store.remove_dir_if_empty(id)? {
        return Ok(QuarantineReport {
            id: id.to_string(),
            message: format!(
                "Profile {id} was corrupted and has been removed; nothing else was stored in {}.",
                directory.display()
            ),
            directory,
            remaining_files: Vec::new(),
            directory_removed: true,
        });
    }

    let fs = store.fs();
    let mut remaining_files = Vec::new();
    for child in fs.list_children(&directory)? {
        if fs.is_dir(&child) {
            for nested in fs.list_children(&child)? {
                remaining_files.push(file_name(&nested));
            }
        } else {
            remaining_files.push(file_name(&child));
        }
    }

    let mut message = format!(
        "Profile {id} was corrupted and could not be restored. The following files are still \
         associated with it at {}:",
        directory.display()
    );
    if remaining_files.is_empty() {
        message.push_str(" no files found.");
    } else {
        for name in &remaining_files {
            message.push_str("\n  ");
            message.push_str(name);
        }
    }

    Ok(QuarantineReport {
        id: id.to_string(),
        directory,
        remaining_files,
        directory_removed: false,
        message,
    })
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
