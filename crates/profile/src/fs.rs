//! Filesystem seam used by the store, the backup manager and recovery.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{ProfileError, Result};

/// The handful of primitives the profile layer needs from the platform.
pub trait Filesystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    /// Direct children of a directory, sorted by path. Missing directory → empty.
    fn list_children(&self, dir: &Path) -> Result<Vec<PathBuf>>;

    fn read_all(&self, path: &Path) -> Result<String>;

    /// Replace the whole file. Creates it when absent.
    fn write_all(&self, path: &Path, content: &str) -> Result<()>;

    /// Create an empty file; an existing file is left untouched.
    fn create_file(&self, path: &Path) -> Result<()>;

    /// Create a directory and any missing parents.
    fn create_directory(&self, path: &Path) -> Result<()>;

    /// Remove a file, or a directory with everything below it.
    fn delete(&self, path: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl Filesystem for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn list_children(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(ProfileError::io(dir, err)),
        };

        let mut children = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ProfileError::io(dir, e))?;
            children.push(entry.path());
        }
        children.sort();
        Ok(children)
    }

    fn read_all(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).map_err(|e| ProfileError::io(path, e))
    }

    fn write_all(&self, path: &Path, content: &str) -> Result<()> {
        // Written beside the target and renamed over it: readers never see a
        // truncated file.
        static NEXT: AtomicU64 = AtomicU64::new(0);
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = path.with_file_name(format!(
            ".{name}.{}-{}.tmp",
            process::id(),
            NEXT.fetch_add(1, Ordering::Relaxed)
        ));

        if let Err(err) = fs::write(&tmp, content).and_then(|()| fs::rename(&tmp, path)) {
            let _ = fs::remove_file(&tmp);
            return Err(ProfileError::write(path, err));
        }
        Ok(())
    }

    fn create_file(&self, path: &Path) -> Result<()> {
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(|_| ())
            .map_err(|e| ProfileError::write(path, e))
    }

    fn create_directory(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).map_err(|e| ProfileError::write(path, e))
    }

    fn delete(&self, path: &Path) -> Result<()> {
        let result = if path.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ProfileError::write(path, err)),
        }
    }
}
