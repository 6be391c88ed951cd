//! Self-healing validation of a single stored profile.

use std::io::ErrorKind;

use tracing::{debug, warn};

use crate::error::{ProfileError, Result};
use crate::registry::Registry;
use crate::schema::{MappedExecutables, Profile, ScreenStat};
use crate::store::{ProfileStore, SaveOutcome};

pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct Validator {
    max_attempts: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl Validator {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Fill every healable hole of `id` from the registry and persist it
    /// exactly once. The read, the healing and the write share one gated
    /// write, so no interactive save of `id` can interleave with them.
    ///
    /// Content that cannot be healed, including a primary file that is not
    /// text at all, yields [`ProfileError::ValidationUnrecoverable`]. A missing
    /// profile and other read failures pass through unchanged.
    pub fn validate(
        &self,
        id: &str,
        store: &ProfileStore,
        registry: &Registry,
    ) -> Result<SaveOutcome> {
        let unrecoverable = |reason: String| ProfileError::ValidationUnrecoverable {
            id: id.to_string(),
            reason,
        };
        let primary = store.layout().primary_file(id);

        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            let healed = store.modify(id, |profile| {
                heal(profile, registry).map_err(&unrecoverable)?;
                Ok(true)
            });
            match healed {
                Ok(modified) => {
                    if let Err(err) = store.ensure_user_files(id) {
                        warn!(profile = %id, %err, "could not create user directories");
                    }
                    return Ok(modified.outcome.unwrap_or_default());
                }
                Err(err @ ProfileError::ValidationUnrecoverable { .. }) => return Err(err),
                Err(ProfileError::Parse(reason)) => {
                    return Err(unrecoverable(format!("primary file does not parse: {reason}")));
                }
                Err(ProfileError::Io { path, source })
                    if path == primary && source.kind() == ErrorKind::InvalidData =>
                {
                    return Err(unrecoverable(format!("primary file is not text: {source}")));
                }
                Err(err @ ProfileError::Write { .. }) => {
                    warn!(profile = %id, attempt, %err, "persisting healed profile failed");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        let reason = match last_error {
            Some(err) => format!("gave up after {} attempts: {err}", self.max_attempts),
            None => format!("gave up after {} attempts", self.max_attempts),
        };
        Err(unrecoverable(reason))
    }
}

/// Fill absent fields with defaults and return how many were filled. Fails
/// when a field that has no default (one set only at creation time) is
/// missing.
pub fn heal(profile: &mut Profile, registry: &Registry) -> std::result::Result<usize, String> {
    let mut healed = 0usize;
    for descriptor in registry.all() {
        if descriptor.get(profile).is_some() {
            continue;
        }
        if descriptor.ignore_for_profile_creation {
            return Err(format!("required field '{}' is missing", descriptor.id));
        }
        descriptor.apply_default(profile);
        healed += 1;
    }

    if profile.executables.is_none() {
        profile.executables = Some(MappedExecutables::new());
        healed += 1;
    }
    if profile.screenstat.is_none() {
        profile.screenstat = Some(ScreenStat::UNPLACED);
        healed += 1;
    }

    if healed > 0 {
        debug!(healed, "filled missing profile fields with defaults");
    }
    Ok(healed)
}
