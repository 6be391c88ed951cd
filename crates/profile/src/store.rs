use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::backup::BackupManager;
use crate::codec::ProfileCodec;
use crate::distance::distance;
use crate::error::{ProfileError, Result};
use crate::fs::Filesystem;
use crate::gate::WriterGate;
use crate::layout::{ProfileLayout, UserFile};
use crate::schema::Profile;

/// What a successful [`ProfileStore::save`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Edit distance from the previous serialization written by this process.
    pub distance: usize,
    /// Whether a new backup file was written.
    pub backed_up: bool,
}

/// What [`ProfileStore::modify`] left behind.
#[derive(Debug, Clone)]
pub struct Modified {
    pub profile: Profile,
    /// `None` when the change asked for nothing to be written.
    pub outcome: Option<SaveOutcome>,
}

/// The only component that touches primary profile files.
///
/// Reads are unsynchronized snapshots; every write goes through the shared
/// [`WriterGate`].
pub struct ProfileStore {
    fs: Arc<dyn Filesystem>,
    codec: Arc<dyn ProfileCodec>,
    gate: Arc<WriterGate>,
    backups: BackupManager,
    layout: ProfileLayout,
    /// Last serialization written, across all profiles.
    last_serialized: Mutex<Option<String>>,
    /// Ids deleted during this run; saving them again is refused.
    retired: Mutex<HashSet<String>>,
}

impl ProfileStore {
    pub fn new(
        fs: Arc<dyn Filesystem>,
        codec: Arc<dyn ProfileCodec>,
        gate: Arc<WriterGate>,
        backups: BackupManager,
        layout: ProfileLayout,
    ) -> Self {
        Self {
            fs,
            codec,
            gate,
            backups,
            layout,
            last_serialized: Mutex::new(None),
            retired: Mutex::new(HashSet::new()),
        }
    }

    pub fn layout(&self) -> &ProfileLayout {
        &self.layout
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub fn gate(&self) -> &WriterGate {
        &self.gate
    }

    pub(crate) fn fs(&self) -> &dyn Filesystem {
        self.fs.as_ref()
    }

    pub(crate) fn codec(&self) -> &dyn ProfileCodec {
        self.codec.as_ref()
    }

    pub fn exists(&self, id: &str) -> bool {
        self.fs.exists(&self.layout.primary_file(id))
    }

    pub fn load(&self, id: &str) -> Result<Profile> {
        let raw = self.read_raw(id)?;
        self.codec.deserialize(&raw)
    }

    pub fn read_raw(&self, id: &str) -> Result<String> {
        let path = self.layout.primary_file(id);
        if !self.fs.exists(&path) {
            return Err(ProfileError::ProfileNotFound(id.to_string()));
        }
        self.fs.read_all(&path)
    }

    pub fn save(&self, id: &str, profile: &Profile) -> Result<SaveOutcome> {
        self.ensure_not_retired(id)?;
        let serialized = self.codec.serialize(profile)?;
        self.gate
            .with_exclusive_write(|| self.save_locked(id, serialized))
    }

    /// Read `id`, apply `change` and persist the result, all inside one gated
    /// write. `change` returns whether the profile should be written.
    pub fn modify(
        &self,
        id: &str,
        change: impl FnOnce(&mut Profile) -> Result<bool>,
    ) -> Result<Modified> {
        self.ensure_not_retired(id)?;
        self.gate.with_exclusive_write(|| -> Result<Modified> {
            let mut profile = self.load(id)?;
            if !change(&mut profile)? {
                return Ok(Modified {
                    profile,
                    outcome: None,
                });
            }
            let serialized = self.codec.serialize(&profile)?;
            let outcome = self.save_locked(id, serialized)?;
            Ok(Modified {
                profile,
                outcome: Some(outcome),
            })
        })
    }

    /// Write, measure and back up. The caller holds the writer gate.
    pub(crate) fn save_locked(&self, id: &str, serialized: String) -> Result<SaveOutcome> {
        let path = self.layout.primary_file(id);
        self.fs.write_all(&path, &serialized)?;

        let distance = distance(lock(&self.last_serialized).as_deref(), &serialized);
        if distance == 0 {
            debug!(profile = %id, "profile unchanged since last write");
            return Ok(SaveOutcome {
                distance,
                backed_up: false,
            });
        }

        info!(profile = %id, distance, "profile written");
        let backed_up = self.backups.backup(id, &serialized)?;
        // Moved only once the backup is on disk, so a failed backup is retried.
        *lock(&self.last_serialized) = Some(serialized);
        Ok(SaveOutcome {
            distance,
            backed_up,
        })
    }

    /// Write `content` verbatim over the primary file.
    pub fn restore_raw(&self, id: &str, content: &str) -> Result<()> {
        self.ensure_not_retired(id)?;
        let path = self.layout.primary_file(id);
        self.gate
            .with_exclusive_write(|| self.fs.write_all(&path, content))
    }

    /// Create the profile directory and every user content directory.
    pub fn ensure_user_files(&self, id: &str) -> Result<()> {
        for kind in UserFile::ALL {
            let path = self.layout.user_file(id, kind);
            if !self.fs.is_dir(&path) {
                debug!(profile = %id, dir = kind.dir_name(), "creating user directory");
                self.fs.create_directory(&path)?;
            }
        }
        Ok(())
    }

    /// Ids of every profile directory that holds a primary file, sorted.
    pub fn stored_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for dir in self.fs.list_children(self.layout.users_dir())? {
            if !self.fs.is_dir(&dir) {
                continue;
            }
            let Some(id) = dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if self.exists(id) {
                ids.push(id.to_string());
            }
        }
        Ok(ids)
    }

    /// Remove the profile directory and all its backups, then refuse further
    /// writes to `id` for the rest of the run.
    pub fn remove(&self, id: &str) -> Result<()> {
        let dir = self.layout.profile_dir(id);
        if !self.fs.exists(&dir) {
            return Err(ProfileError::ProfileNotFound(id.to_string()));
        }

        self.gate.with_exclusive_write(|| -> Result<()> {
            self.fs.delete(&dir)?;
            let backups = self.backups.delete_all(id)?;
            lock(&self.retired).insert(id.to_string());
            info!(profile = %id, backups, "profile deleted");
            Ok(())
        })
    }

    /// Delete the primary file when it holds nothing but whitespace. A file
    /// that cannot be read as text is left for the operator.
    pub(crate) fn discard_blank_primary(&self, id: &str) -> Result<bool> {
        let path = self.layout.primary_file(id);
        self.gate.with_exclusive_write(|| -> Result<bool> {
            if !self.fs.exists(&path) {
                return Ok(false);
            }
            match self.fs.read_all(&path) {
                Ok(content) if content.trim().is_empty() => {}
                _ => return Ok(false),
            }
            self.fs.delete(&path)?;
            Ok(true)
        })
    }

    /// Remove the profile directory only if nothing at all is left inside.
    pub(crate) fn remove_dir_if_empty(&self, id: &str) -> Result<bool> {
        let dir = self.layout.profile_dir(id);
        if !self.fs.is_dir(&dir) || !self.fs.list_children(&dir)?.is_empty() {
            return Ok(false);
        }
        self.gate.with_exclusive_write(|| self.fs.delete(&dir))?;
        Ok(true)
    }

    fn ensure_not_retired(&self, id: &str) -> Result<()> {
        if lock(&self.retired).contains(id) {
            return Err(ProfileError::ProfileNotFound(id.to_string()));
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
