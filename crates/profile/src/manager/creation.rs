use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use super::ProfileManager;
use crate::error::{ProfileError, Result};

/// SHA-256 applied twice, the second pass over the lowercase hex of the first.
pub fn hash_password(password: &str) -> String {
    let first = format!("{:x}", Sha256::digest(password.as_bytes()));
    format!("{:x}", Sha256::digest(first.as_bytes()))
}

impl ProfileManager {
    /// Whether any readable, non-quarantined profile already uses `name`,
    /// compared case-insensitively.
    pub fn username_in_use(&self, name: &str) -> Result<bool> {
        let wanted = name.to_lowercase();
        for id in self.profile_ids()? {
            match self.store.load(&id) {
                Ok(profile) => {
                    if profile.name.is_some_and(|existing| existing.to_lowercase() == wanted) {
                        return Ok(true);
                    }
                }
                Err(err) => warn!(profile = %id, %err, "skipping unreadable profile"),
            }
        }
        Ok(false)
    }

    /// Create a profile holding registry defaults and return its new id.
    pub fn create_profile(&self, name: &str, password: &str) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ProfileError::InvalidCredentials(
                "username must not be blank".to_string(),
            ));
        }
        if password.is_empty() {
            return Err(ProfileError::InvalidCredentials(
                "password must not be blank".to_string(),
            ));
        }

        let mut profile = self.registry.build_default_profile();
        profile.name = Some(name.to_string());
        profile.pass = Some(hash_password(password));
        let serialized = self.store.codec().serialize(&profile)?;

        // The name check and the write share one gated write.
        let id = self.store.gate().with_exclusive_write(|| -> Result<String> {
            if self.username_in_use(name)? {
                return Err(ProfileError::DuplicateUsername(name.to_string()));
            }

            let id = self.fresh_id();
            let written = self
                .store
                .ensure_user_files(&id)
                .and_then(|()| self.store.save_locked(&id, serialized));
            if let Err(err) = written {
                let dir = self.store.layout().profile_dir(&id);
                if let Err(cleanup) = self.store.fs().delete(&dir) {
                    warn!(profile = %id, %cleanup, "could not remove half-created profile");
                }
                return Err(err);
            }
            Ok(id)
        })?;

        info!(profile = %id, name, "profile created");
        Ok(id)
    }

    fn fresh_id(&self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            if !self.store.fs().exists(&self.store.layout().profile_dir(&id)) {
                return id;
            }
        }
    }
}
