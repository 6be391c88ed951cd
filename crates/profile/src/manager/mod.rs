use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hestia_config::AppConfig;
use tracing::{info, warn};

use crate::backup::BackupManager;
use crate::codec::{JsonCodec, ProfileCodec};
use crate::error::{ProfileError, Result};
use crate::fs::{Filesystem, LocalFs};
use crate::gate::WriterGate;
use crate::layout::ProfileLayout;
use crate::recovery::{QuarantineReport, QuarantineSet, RecoveryOutcome, recover};
use crate::registry::Registry;
use crate::schema::{MappedExecutable, MappedExecutables, Profile, ScreenStat};
use crate::store::{ProfileStore, SaveOutcome};
use crate::validate::Validator;

mod creation;

pub use creation::hash_password;

/// Result of validating one profile, after corruption recovery has run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationStatus {
    Valid(SaveOutcome),
    Restored { backup_timestamp: i64 },
    Quarantined(QuarantineReport),
}

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub valid: Vec<String>,
    pub restored: Vec<String>,
    pub quarantined: Vec<QuarantineReport>,
    /// Profiles whose validation failed for a reason other than corruption,
    /// such as a read that was refused. They stay on disk untouched.
    pub failed: Vec<String>,
    pub pruned_backups: usize,
}

impl SweepReport {
    pub fn usable(&self) -> impl Iterator<Item = &String> {
        self.valid.iter().chain(self.restored.iter())
    }
}

/// Owns every profile component plus the per-run state the UI works against:
/// the current-profile handle and the quarantine set.
///
/// `Send + Sync`; share it behind an `Arc`.
pub struct ProfileManager {
    registry: Registry,
    store: ProfileStore,
    validator: Validator,
    quarantine: QuarantineSet,
    current: Mutex<Option<String>>,
    prune_orphan_backups: bool,
}

impl ProfileManager {
    /// Open the data root described by `config` on the local filesystem.
    pub fn open(config: &AppConfig) -> Result<Self> {
        Self::open_with_registry(config, Registry::standard())
    }

    /// Like [`ProfileManager::open`], with a registry that carries UI hooks.
    pub fn open_with_registry(config: &AppConfig, registry: Registry) -> Result<Self> {
        let mut manager = Self::with_parts(
            registry,
            Arc::new(LocalFs),
            Arc::new(JsonCodec),
            ProfileLayout::from(&config.storage),
            Validator::new(config.validation.max_attempts),
        )?;
        manager.prune_orphan_backups = config.validation.prune_orphan_backups;
        Ok(manager)
    }

    /// Fails when the users or backup directory cannot be created.
    pub fn with_parts(
        registry: Registry,
        fs: Arc<dyn Filesystem>,
        codec: Arc<dyn ProfileCodec>,
        layout: ProfileLayout,
        validator: Validator,
    ) -> Result<Self> {
        fs.create_directory(layout.users_dir())?;
        let backups = BackupManager::open(Arc::clone(&fs), layout.backup_dir())?;
        info!(
            users = %layout.users_dir().display(),
            backups = %layout.backup_dir().display(),
            "profile storage opened"
        );

        let store = ProfileStore::new(fs, codec, Arc::new(WriterGate::new()), backups, layout);
        Ok(Self {
            registry,
            store,
            validator,
            quarantine: QuarantineSet::new(),
            current: Mutex::new(None),
            prune_orphan_backups: true,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub fn quarantine(&self) -> &QuarantineSet {
        &self.quarantine
    }

    // ── Load / save ──────────────────────────────────────────────────────────

    pub fn load(&self, id: &str) -> Result<Profile> {
        self.ensure_usable(id)?;
        self.store.load(id)
    }

    pub fn save(&self, id: &str, profile: &Profile) -> Result<SaveOutcome> {
        self.ensure_usable(id)?;
        self.store.save(id, profile)
    }

    pub fn get_field(&self, id: &str, key: &str) -> Result<Option<String>> {
        let descriptor = self.registry.lookup(key)?;
        let profile = self.load(id)?;
        Ok(descriptor.get(&profile).map(str::to_owned))
    }

    /// Write one preference, persist the profile, then run its change hooks.
    pub fn set_field(&self, id: &str, key: &str, value: &str) -> Result<SaveOutcome> {
        let descriptor = self.registry.lookup(key)?;
        self.ensure_usable(id)?;
        let modified = self.store.modify(id, |profile| {
            descriptor.set(profile, value);
            Ok(true)
        })?;
        self.registry.invoke_on_change(key, &modified.profile);
        Ok(modified.outcome.unwrap_or_default())
    }

    pub fn set_screen_stat(&self, id: &str, stat: ScreenStat) -> Result<SaveOutcome> {
        self.update(id, |profile| profile.screenstat = Some(stat))
    }

    /// Returns `Ok(false)` without writing when the name is already mapped.
    pub fn add_executable(&self, id: &str, executable: MappedExecutable) -> Result<bool> {
        self.ensure_usable(id)?;
        let modified = self.store.modify(id, |profile| {
            Ok(profile
                .executables
                .get_or_insert_with(MappedExecutables::new)
                .insert(executable))
        })?;
        Ok(modified.outcome.is_some())
    }

    pub fn remove_executable(&self, id: &str, name: &str) -> Result<bool> {
        self.ensure_usable(id)?;
        let modified = self.store.modify(id, |profile| {
            Ok(profile
                .executables
                .as_mut()
                .and_then(|executables| executables.remove(name))
                .is_some())
        })?;
        Ok(modified.outcome.is_some())
    }

    /// Put every defaultable preference back to its registry default.
    pub fn reset_profile(&self, id: &str) -> Result<SaveOutcome> {
        self.update(id, |profile| self.registry.reset(profile))
    }

    fn update(&self, id: &str, change: impl FnOnce(&mut Profile)) -> Result<SaveOutcome> {
        self.ensure_usable(id)?;
        let modified = self.store.modify(id, |profile| {
            change(profile);
            Ok(true)
        })?;
        Ok(modified.outcome.unwrap_or_default())
    }

    // ── Validation ───────────────────────────────────────────────────────────

    /// Heal `id`, or restore it from backup, or quarantine it.
    pub fn validate(&self, id: &str) -> Result<ValidationStatus> {
        self.ensure_usable(id)?;
        let reason = match self.validator.validate(id, &self.store, &self.registry) {
            Ok(outcome) => return Ok(ValidationStatus::Valid(outcome)),
            Err(ProfileError::ValidationUnrecoverable { reason, .. }) => reason,
            Err(err) => return Err(err),
        };

        Ok(
            match recover(id, &reason, &self.store, &self.quarantine)? {
                RecoveryOutcome::Restored { backup_timestamp } => {
                    ValidationStatus::Restored { backup_timestamp }
                }
                RecoveryOutcome::Quarantined(report) => ValidationStatus::Quarantined(report),
            },
        )
    }

    /// Validate every stored profile, reject duplicate usernames among the
    /// survivors, then drop backups that no longer belong to any profile.
    pub fn validate_all(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        for id in self.profile_ids()? {
            match self.validate(&id) {
                Ok(ValidationStatus::Valid(_)) => report.valid.push(id),
                Ok(ValidationStatus::Restored { .. }) => report.restored.push(id),
                Ok(ValidationStatus::Quarantined(quarantined)) => {
                    report.quarantined.push(quarantined)
                }
                Err(err) => {
                    warn!(profile = %id, %err, "profile could not be validated; skipping");
                    report.failed.push(id);
                }
            }
        }

        let mut seen: HashMap<String, String> = HashMap::new();
        for id in report.usable() {
            let name = match self.load(id) {
                Ok(profile) => profile.name,
                Err(err) => {
                    warn!(profile = %id, %err, "skipping unreadable profile");
                    None
                }
            };
            let Some(name) = name else {
                continue;
            };
            if let Some(first) = seen.insert(name.to_lowercase(), id.clone()) {
                warn!(name = %name, first = %first, second = %id, "duplicate username found");
                return Err(ProfileError::DuplicateUsername(name));
            }
        }

        if self.prune_orphan_backups {
            // Quarantined profiles still on disk keep their backups.
            let on_disk = self.store.stored_ids()?;
            report.pruned_backups = self.store.backups().prune_orphans(&on_disk)?.len();
        }

        info!(
            valid = report.valid.len(),
            restored = report.restored.len(),
            quarantined = report.quarantined.len(),
            failed = report.failed.len(),
            pruned = report.pruned_backups,
            "profile sweep finished"
        );
        Ok(report)
    }

    // ── Enumeration & session ────────────────────────────────────────────────

    /// Every stored profile that is not quarantined, sorted by id.
    pub fn profile_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .stored_ids()?
            .into_iter()
            .filter(|id| !self.quarantine.contains(id))
            .collect())
    }

    pub fn delete_profile(&self, id: &str) -> Result<()> {
        self.store.remove(id)?;
        let mut current = self.lock_current();
        if current.as_deref() == Some(id) {
            *current = None;
        }
        Ok(())
    }

    pub fn set_current(&self, id: &str) -> Result<()> {
        self.ensure_usable(id)?;
        if !self.store.exists(id) {
            return Err(ProfileError::ProfileNotFound(id.to_string()));
        }
        *self.lock_current() = Some(id.to_string());
        Ok(())
    }

    pub fn current(&self) -> Option<String> {
        self.lock_current().clone()
    }

    pub fn clear_current(&self) {
        *self.lock_current() = None;
    }

    /// Mark every profile as logged out. Profiles that cannot be read are
    /// skipped. Returns how many profiles were changed.
    pub fn logout_all(&self) -> Result<usize> {
        let mut changed = 0;
        for id in self.profile_ids()? {
            let logged_out = self.store.modify(&id, |profile| {
                if profile.loggedin.as_deref() == Some("0") {
                    return Ok(false);
                }
                profile.loggedin = Some("0".to_string());
                Ok(true)
            });
            match logged_out {
                Ok(modified) if modified.outcome.is_some() => changed += 1,
                Ok(_) => {}
                Err(err @ ProfileError::Write { .. }) => return Err(err),
                Err(err) => warn!(profile = %id, %err, "skipping unreadable profile during logout"),
            }
        }
        Ok(changed)
    }

    pub fn first_logged_in(&self) -> Result<Option<String>> {
        for id in self.profile_ids()? {
            match self.store.load(&id) {
                Ok(profile) if profile.loggedin.as_deref() == Some("1") => return Ok(Some(id)),
                Ok(_) => {}
                Err(err) => warn!(profile = %id, %err, "skipping unreadable profile"),
            }
        }
        Ok(None)
    }

    /// Block every later write for the rest of the process.
    pub fn shutdown(&self) {
        self.store.gate().freeze();
    }

    fn ensure_usable(&self, id: &str) -> Result<()> {
        if self.quarantine.contains(id) {
            return Err(ProfileError::Quarantined(id.to_string()));
        }
        Ok(())
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<String>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    use tempfile::TempDir;

    use super::*;
    use crate::fs::faults::FaultyFs;
    use crate::layout::UserFile;

    const NOT_UTF8: [u8; 4] = [0xff, 0xfe, 0x00, 0x7b];

    fn manager_with(dir: &TempDir, registry: Registry) -> ProfileManager {
        ProfileManager::with_parts(
            registry,
            Arc::new(LocalFs),
            Arc::new(JsonCodec),
            ProfileLayout::under(dir.path()),
            Validator::default(),
        )
        .unwrap()
    }

    fn manager(dir: &TempDir) -> ProfileManager {
        manager_with(dir, Registry::standard())
    }

    fn manager_on(dir: &TempDir, fs: Arc<FaultyFs>) -> ProfileManager {
        ProfileManager::with_parts(
            Registry::standard(),
            fs,
            Arc::new(JsonCodec),
            ProfileLayout::under(dir.path()),
            Validator::default(),
        )
        .unwrap()
    }

    /// Drop raw primary content for `id` on disk, bypassing the store.
    fn plant(manager: &ProfileManager, id: &str, content: &str) {
        let layout = manager.store().layout();
        fs::create_dir_all(layout.profile_dir(id)).unwrap();
        fs::write(layout.primary_file(id), content).unwrap();
    }

    fn backup_count(manager: &ProfileManager) -> usize {
        fs::read_dir(manager.store().layout().backup_dir())
            .unwrap()
            .count()
    }

    // ── Creation ─────────────────────────────────────────────────────────────

    #[test]
    fn new_profile_holds_registry_defaults() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);

        let id = manager.create_profile("Alice", "secret")?;
        let profile = manager.load(&id)?;
        assert_eq!(profile.name.as_deref(), Some("Alice"));
        assert_eq!(profile.hourlychimes.as_deref(), Some("1"));
        assert_eq!(profile.font.as_deref(), Some("Agency FB"));
        assert_eq!(profile.pass, Some(hash_password("secret")));
        assert_eq!(profile.screenstat, Some(ScreenStat::UNPLACED));
        for kind in UserFile::ALL {
            assert!(manager.store().layout().user_file(&id, kind).is_dir());
        }
        assert_eq!(manager.profile_ids()?, vec![id]);
        Ok(())
    }

    #[test]
    fn usernames_are_unique_ignoring_case() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);

        manager.create_profile("Bob", "pw")?;
        let err = manager.create_profile("BOB", "pw").unwrap_err();
        assert!(matches!(err, ProfileError::DuplicateUsername(name) if name == "BOB"));
        assert_eq!(manager.profile_ids()?.len(), 1);
        Ok(())
    }

    #[test]
    fn blank_credentials_are_rejected() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        assert!(matches!(
            manager.create_profile("  ", "pw"),
            Err(ProfileError::InvalidCredentials(_))
        ));
        assert!(matches!(
            manager.create_profile("Carol", ""),
            Err(ProfileError::InvalidCredentials(_))
        ));
    }

    #[test]
    fn concurrent_creations_of_one_name_admit_a_single_profile() {
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(manager(&dir));
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    manager.create_profile("Bob", "pw")
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(ProfileError::DuplicateUsername(_))))
        );
        assert_eq!(manager.profile_ids().unwrap().len(), 1);
    }

    #[test]
    fn failed_creation_leaves_no_directory_behind() {
        let dir = TempDir::new().unwrap();
        let faulty = Arc::new(FaultyFs::default());
        let manager = manager_on(&dir, faulty.clone());
        faulty.fail_writes_under(manager.store().layout().users_dir(), 1);

        assert!(matches!(
            manager.create_profile("Alice", "secret"),
            Err(ProfileError::Write { .. })
        ));
        let leftovers = fs::read_dir(manager.store().layout().users_dir())
            .unwrap()
            .count();
        assert_eq!(leftovers, 0);

        let id = manager.create_profile("Alice", "secret").unwrap();
        assert_eq!(manager.profile_ids().unwrap(), vec![id]);
    }

    // ── Fields ───────────────────────────────────────────────────────────────

    #[test]
    fn toggling_a_switch_is_one_edit_and_rolls_the_backup() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let id = manager.create_profile("Alice", "secret")?;
        let old = manager.store().backups().most_recent(&id)?.unwrap();

        let outcome = manager.set_field(&id, "outputborder", "1")?;
        assert_eq!(outcome.distance, 1);
        assert!(outcome.backed_up);

        let new = manager.store().backups().most_recent(&id)?.unwrap();
        assert_ne!(new.path, old.path);
        assert!(!old.path.exists());
        assert_eq!(backup_count(&manager), 1);
        assert_eq!(new.content, manager.store().read_raw(&id)?);
        assert_eq!(manager.get_field(&id, "outputborder")?.as_deref(), Some("1"));
        Ok(())
    }

    #[test]
    fn saving_an_unchanged_profile_skips_the_backup() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let id = manager.create_profile("Alice", "secret")?;
        let before = manager.store().backups().most_recent(&id)?;

        let outcome = manager.save(&id, &manager.load(&id)?)?;
        assert_eq!(outcome.distance, 0);
        assert!(!outcome.backed_up);
        assert_eq!(manager.store().backups().most_recent(&id)?, before);
        Ok(())
    }

    #[test]
    fn set_field_runs_hooks_after_persisting() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let field_calls = Arc::new(AtomicUsize::new(0));
        let post_calls = Arc::new(AtomicUsize::new(0));
        let registry = {
            let field_calls = Arc::clone(&field_calls);
            let post_calls = Arc::clone(&post_calls);
            Registry::standard()
                .with_hook(
                    "darkmode",
                    Arc::new(move |profile: &Profile| {
                        assert_eq!(profile.darkmode.as_deref(), Some("1"));
                        field_calls.fetch_add(1, Ordering::SeqCst);
                    }),
                )?
                .with_post_change_hook(Arc::new(move |_: &Profile| {
                    post_calls.fetch_add(1, Ordering::SeqCst);
                }))
        };
        let manager = manager_with(&dir, registry);
        let id = manager.create_profile("Alice", "secret")?;

        manager.set_field(&id, "darkmode", "1")?;
        manager.set_field(&id, "font", "Consolas")?;
        assert_eq!(field_calls.load(Ordering::SeqCst), 1);
        assert_eq!(post_calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    #[test]
    fn unknown_ids_are_not_found() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let id = manager.create_profile("Alice", "secret")?;

        assert!(matches!(
            manager.get_field(&id, "nosuchpref"),
            Err(ProfileError::PreferenceNotFound(_))
        ));
        assert!(matches!(
            manager.set_field("nobody", "font", "Arial"),
            Err(ProfileError::ProfileNotFound(_))
        ));
        assert!(matches!(
            manager.set_current("nobody"),
            Err(ProfileError::ProfileNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn structured_setters_persist() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let id = manager.create_profile("Alice", "secret")?;

        assert!(manager.add_executable(&id, MappedExecutable::new("vim", "/usr/bin/vim"))?);
        assert!(!manager.add_executable(&id, MappedExecutable::new("VIM", "/opt/vim"))?);
        let stat = ScreenStat {
            console_x: 10,
            console_y: 20,
            console_width: 800,
            console_height: 600,
            monitor: 0,
            console_on_top: true,
            console_direction: crate::schema::Orientation::Left,
        };
        manager.set_screen_stat(&id, stat)?;

        let profile = manager.load(&id)?;
        assert_eq!(profile.screenstat, Some(stat));
        let executables = profile.executables.unwrap();
        assert_eq!(executables.len(), 1);
        assert_eq!(executables.get("Vim").unwrap().filepath, "/usr/bin/vim");

        assert!(manager.remove_executable(&id, "Vim")?);
        assert!(!manager.remove_executable(&id, "vim")?);
        assert!(manager.load(&id)?.executables.unwrap().is_empty());
        Ok(())
    }

    #[test]
    fn reset_restores_defaults_but_keeps_credentials() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let id = manager.create_profile("Alice", "secret")?;
        manager.set_field(&id, "font", "Consolas")?;
        manager.set_field(&id, "fontsize", "12")?;

        manager.reset_profile(&id)?;
        let profile = manager.load(&id)?;
        assert_eq!(profile.font.as_deref(), Some("Agency FB"));
        assert_eq!(profile.fontsize.as_deref(), Some("30"));
        assert_eq!(profile.name.as_deref(), Some("Alice"));
        Ok(())
    }

    #[test]
    fn concurrent_edits_of_one_profile_are_not_lost() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(manager(&dir));
        let id = manager.create_profile("Alice", "secret")?;
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|prefix| {
                let manager = Arc::clone(&manager);
                let barrier = Arc::clone(&barrier);
                let id = id.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..40 {
                        let name = format!("{prefix}{i}");
                        let path = format!("/bin/{name}");
                        assert!(
                            manager
                                .add_executable(&id, MappedExecutable::new(&name, &path))
                                .unwrap()
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(manager.load(&id)?.executables.unwrap().len(), 80);
        Ok(())
    }

    #[test]
    fn healing_never_reverts_a_concurrent_edit() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = Arc::new(manager(&dir));
        let id = manager.create_profile("Alice", "secret")?;
        let barrier = Arc::new(Barrier::new(2));

        let healer = {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let id = id.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..40 {
                    assert!(matches!(
                        manager.validate(&id).unwrap(),
                        ValidationStatus::Valid(_)
                    ));
                }
            })
        };
        barrier.wait();
        for i in 0..40 {
            manager.set_field(&id, "font", &format!("Font {i}"))?;
            assert_eq!(manager.get_field(&id, "font")?, Some(format!("Font {i}")));
        }
        healer.join().unwrap();

        assert_eq!(manager.get_field(&id, "font")?.as_deref(), Some("Font 39"));
        Ok(())
    }

    // ── Validation & recovery ────────────────────────────────────────────────

    #[test]
    fn validation_fills_every_missing_field() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        plant(&manager, "carol", r#"{"name":"Carol","pass":"digest"}"#);

        let status = manager.validate("carol")?;
        assert!(matches!(status, ValidationStatus::Valid(_)));

        let profile = manager.load("carol")?;
        for descriptor in manager.registry().creation_defaults() {
            assert_eq!(
                descriptor.get(&profile),
                Some(descriptor.default_value.as_str()),
                "field {}",
                descriptor.id
            );
        }
        assert_eq!(profile.screenstat, Some(ScreenStat::UNPLACED));
        assert!(profile.executables.unwrap().is_empty());
        assert!(manager.store().layout().user_file("carol", UserFile::Notes).is_dir());
        Ok(())
    }

    #[test]
    fn validation_replaces_malformed_values() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        plant(
            &manager,
            "dan",
            r#"{"name":"Dan","pass":"digest","fontsize":12,"screenstat":"oops","font":"Arial"}"#,
        );

        manager.validate("dan")?;
        let profile = manager.load("dan")?;
        assert_eq!(profile.fontsize.as_deref(), Some("30"));
        assert_eq!(profile.font.as_deref(), Some("Arial"));
        assert_eq!(profile.screenstat, Some(ScreenStat::UNPLACED));
        Ok(())
    }

    #[test]
    fn corrupt_profile_is_restored_byte_for_byte() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let id = manager.create_profile("Alice", "secret")?;
        manager.set_field(&id, "darkmode", "1")?;
        let backup = manager.store().backups().most_recent(&id)?.unwrap();

        fs::write(manager.store().layout().primary_file(&id), "{\"name\": tru").unwrap();

        let status = manager.validate(&id)?;
        assert_eq!(
            status,
            ValidationStatus::Restored {
                backup_timestamp: backup.timestamp_millis
            }
        );
        assert_eq!(manager.store().read_raw(&id)?, backup.content);
        assert!(matches!(manager.validate(&id)?, ValidationStatus::Valid(_)));
        assert_eq!(manager.get_field(&id, "darkmode")?.as_deref(), Some("1"));
        Ok(())
    }

    #[test]
    fn empty_profile_without_backup_is_quarantined_and_removed() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        plant(&manager, "U2", "");

        let ValidationStatus::Quarantined(report) = manager.validate("U2")? else {
            panic!("expected quarantine");
        };
        assert!(report.directory_removed);
        assert!(report.remaining_files.is_empty());
        assert!(!manager.store().layout().profile_dir("U2").exists());
        assert!(manager.quarantine().contains("U2"));
        Ok(())
    }

    #[test]
    fn quarantine_leaves_user_content_in_place() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        plant(&manager, "U3", "  ");
        let notes = manager.store().layout().user_file("U3", UserFile::Notes);
        fs::create_dir_all(&notes).unwrap();
        fs::write(notes.join("todo.txt"), "buy milk").unwrap();

        let ValidationStatus::Quarantined(report) = manager.validate("U3")? else {
            panic!("expected quarantine");
        };
        assert!(!report.directory_removed);
        assert_eq!(report.remaining_files, vec!["todo.txt"]);
        assert!(report.message.contains("todo.txt"));
        assert!(!manager.store().layout().primary_file("U3").exists());
        assert!(notes.join("todo.txt").exists());
        Ok(())
    }

    #[test]
    fn unhealable_primary_file_is_kept_when_quarantined() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        plant(&manager, "U4", r#"{"font":"Arial"}"#);

        let ValidationStatus::Quarantined(report) = manager.validate("U4")? else {
            panic!("expected quarantine");
        };
        assert_eq!(report.remaining_files, vec!["userdata.json"]);
        assert!(manager.store().layout().primary_file("U4").exists());
        Ok(())
    }

    #[test]
    fn quarantine_outlives_an_external_repair() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        plant(&manager, "U5", "garbage");
        manager.validate("U5")?;

        plant(&manager, "U5", r#"{"name":"Fixed","pass":"digest"}"#);
        assert!(matches!(manager.load("U5"), Err(ProfileError::Quarantined(_))));
        assert!(matches!(manager.validate("U5"), Err(ProfileError::Quarantined(_))));
        assert!(matches!(manager.set_current("U5"), Err(ProfileError::Quarantined(_))));
        assert!(!manager.profile_ids()?.contains(&"U5".to_string()));
        Ok(())
    }

    #[test]
    fn binary_primary_is_restored_from_backup() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let id = manager.create_profile("Alice", "secret")?;
        let backup = manager.store().backups().most_recent(&id)?.unwrap();

        fs::write(manager.store().layout().primary_file(&id), NOT_UTF8).unwrap();

        assert_eq!(
            manager.validate(&id)?,
            ValidationStatus::Restored {
                backup_timestamp: backup.timestamp_millis
            }
        );
        assert_eq!(manager.store().read_raw(&id)?, backup.content);
        Ok(())
    }

    #[test]
    fn binary_primary_without_backup_is_quarantined_by_the_sweep() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let alice = manager.create_profile("Alice", "secret")?;
        let layout = manager.store().layout();
        fs::create_dir_all(layout.profile_dir("bin")).unwrap();
        fs::write(layout.primary_file("bin"), NOT_UTF8).unwrap();

        let report = manager.validate_all()?;
        assert_eq!(report.valid, vec![alice]);
        assert_eq!(report.quarantined.len(), 1);
        assert_eq!(report.quarantined[0].id, "bin");
        assert_eq!(report.quarantined[0].remaining_files, vec!["userdata.json"]);
        assert_eq!(fs::read(layout.primary_file("bin")).unwrap(), NOT_UTF8);
        Ok(())
    }

    #[test]
    fn unusable_backup_leads_to_quarantine() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let id = manager.create_profile("Alice", "secret")?;
        let backup = manager.store().backups().most_recent(&id)?.unwrap();
        fs::write(&backup.path, "{\"name\": ").unwrap();
        fs::write(manager.store().layout().primary_file(&id), "not json").unwrap();

        let ValidationStatus::Quarantined(report) = manager.validate(&id)? else {
            panic!("expected quarantine");
        };
        assert_eq!(report.remaining_files, vec!["userdata.json"]);
        assert!(manager.quarantine().contains(&id));
        assert!(backup.path.exists());
        Ok(())
    }

    #[test]
    fn sweep_continues_past_a_profile_it_cannot_read() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let faulty = Arc::new(FaultyFs::default());
        let manager = manager_on(&dir, faulty.clone());
        let alice = manager.create_profile("Alice", "secret")?;
        plant(&manager, "stuck", r#"{"name":"Stuck","pass":"digest"}"#);
        faulty.deny_reads_of(&manager.store().layout().primary_file("stuck"));

        let report = manager.validate_all()?;
        assert_eq!(report.valid, vec![alice]);
        assert_eq!(report.failed, vec!["stuck"]);
        assert!(report.quarantined.is_empty());
        assert!(!manager.quarantine().contains("stuck"));
        assert!(manager.store().layout().primary_file("stuck").exists());
        Ok(())
    }

    #[test]
    fn sweep_sorts_profiles_and_prunes_orphan_backups() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        manager.create_profile("Alice", "a")?;
        manager.create_profile("Bob", "b")?;
        plant(&manager, "broken", "not json");
        fs::write(
            manager.store().layout().backup_dir().join("ghost_1700000000000.json"),
            "{}",
        )
        .unwrap();

        let report = manager.validate_all()?;
        assert_eq!(report.valid.len(), 2);
        assert!(report.restored.is_empty());
        assert_eq!(report.quarantined.len(), 1);
        assert_eq!(report.quarantined[0].id, "broken");
        assert_eq!(report.pruned_backups, 1);
        assert_eq!(backup_count(&manager), 2);
        Ok(())
    }

    #[test]
    fn sweep_rejects_duplicate_usernames() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        plant(&manager, "one", r#"{"name":"Eve","pass":"x"}"#);
        plant(&manager, "two", r#"{"name":"EVE","pass":"y"}"#);

        assert!(matches!(
            manager.validate_all(),
            Err(ProfileError::DuplicateUsername(_))
        ));
    }

    // ── Session ──────────────────────────────────────────────────────────────

    #[test]
    fn login_state_is_tracked_across_profiles() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let _alice = manager.create_profile("Alice", "a")?;
        let bob = manager.create_profile("Bob", "b")?;
        assert_eq!(manager.first_logged_in()?, None);

        manager.set_field(&bob, "loggedin", "1")?;
        assert_eq!(manager.first_logged_in()?, Some(bob.clone()));

        assert_eq!(manager.logout_all()?, 1);
        assert_eq!(manager.first_logged_in()?, None);
        assert_eq!(manager.logout_all()?, 0);
        Ok(())
    }

    #[test]
    fn deleting_the_current_profile_clears_the_handle() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        let id = manager.create_profile("Alice", "secret")?;
        let profile = manager.load(&id)?;
        manager.set_current(&id)?;
        assert_eq!(manager.current(), Some(id.clone()));

        manager.delete_profile(&id)?;
        assert_eq!(manager.current(), None);
        assert!(!manager.store().layout().profile_dir(&id).exists());
        assert_eq!(backup_count(&manager), 0);
        assert!(matches!(
            manager.save(&id, &profile),
            Err(ProfileError::ProfileNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn shutdown_freezes_writes() {
        let dir = TempDir::new().unwrap();
        let manager = manager(&dir);
        manager.shutdown();
        assert!(manager.store().gate().is_frozen());
    }

    // ── Opening ──────────────────────────────────────────────────────────────

    #[test]
    fn open_creates_storage_from_config() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.storage.root = dir.path().display().to_string();
        config.validation.prune_orphan_backups = false;

        let manager = ProfileManager::open(&config)?;
        assert!(dir.path().join("users").is_dir());
        assert!(dir.path().join("backups").is_dir());

        fs::write(dir.path().join("backups").join("ghost_1.json"), "{}").unwrap();
        assert_eq!(manager.validate_all()?.pruned_backups, 0);
        Ok(())
    }

    #[test]
    fn open_fails_when_storage_cannot_be_created() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();
        let mut config = AppConfig::default();
        config.storage.root = blocker.display().to_string();

        assert!(matches!(
            ProfileManager::open(&config),
            Err(ProfileError::Write { .. })
        ));
    }
}
