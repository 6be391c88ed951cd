use std::path::PathBuf;

use thiserror::Error;

/// Every failure the profile layer reports to its callers.
///
/// `ValidationUnrecoverable` is produced by the validator and consumed by
/// corruption recovery; callers of [`crate::ProfileManager::validate`] only
/// ever observe the resolved outcome or [`ProfileError::Quarantined`].
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile '{0}' not found")]
    ProfileNotFound(String),

    #[error("preference '{0}' is not declared in the registry")]
    PreferenceNotFound(String),

    #[error("failed to parse profile data: {0}")]
    Parse(String),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("profile '{id}' could not be healed: {reason}")]
    ValidationUnrecoverable { id: String, reason: String },

    #[error("username '{0}' is already in use")]
    DuplicateUsername(String),

    #[error("profile '{0}' is quarantined for the rest of this run")]
    Quarantined(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),
}

pub type Result<T> = std::result::Result<T, ProfileError>;

impl ProfileError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}
