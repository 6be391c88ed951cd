use std::path::{Path, PathBuf};

use hestia_config::StorageConfig;

/// Name of the primary data file inside every profile directory.
pub const PRIMARY_FILE: &str = "userdata.json";

/// User content directories that live next to the primary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserFile {
    Music,
    Backgrounds,
    Notes,
    Files,
}

impl UserFile {
    pub const ALL: [UserFile; 4] = [
        UserFile::Music,
        UserFile::Backgrounds,
        UserFile::Notes,
        UserFile::Files,
    ];

    pub fn dir_name(self) -> &'static str {
        match self {
            UserFile::Music => "Music",
            UserFile::Backgrounds => "Backgrounds",
            UserFile::Notes => "Notes",
            UserFile::Files => "Files",
        }
    }
}

/// Resolves every on-disk location the profile layer touches.
#[derive(Debug, Clone)]
pub struct ProfileLayout {
    users_dir: PathBuf,
    backup_dir: PathBuf,
}

impl ProfileLayout {
    pub fn new(users_dir: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            users_dir: users_dir.into(),
            backup_dir: backup_dir.into(),
        }
    }

    /// `<root>/users` and `<root>/backups` under a single data root.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::new(root.join("users"), root.join("backups"))
    }

    pub fn users_dir(&self) -> &Path {
        &self.users_dir
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn profile_dir(&self, id: &str) -> PathBuf {
        self.users_dir.join(id)
    }

    pub fn primary_file(&self, id: &str) -> PathBuf {
        self.profile_dir(id).join(PRIMARY_FILE)
    }

    pub fn user_file(&self, id: &str, kind: UserFile) -> PathBuf {
        self.profile_dir(id).join(kind.dir_name())
    }
}

impl From<&StorageConfig> for ProfileLayout {
    fn from(storage: &StorageConfig) -> Self {
        Self::new(storage.users_path(), storage.backup_path())
    }
}
