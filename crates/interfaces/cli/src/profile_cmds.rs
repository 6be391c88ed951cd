use std::io;
use std::io::IsTerminal;
use std::io::Write;

use anyhow::{Result, bail};
use chrono::Local;

use hestia_profile::{ProfileManager, QuarantineReport, ValidationStatus};

pub(crate) fn run_validate(manager: &ProfileManager) -> Result<()> {
    let report = manager.validate_all()?;

    println!("── profile sweep ────────────────────────────────────");
    println!("  valid:       {}", report.valid.len());
    println!("  restored:    {}", report.restored.len());
    println!("  quarantined: {}", report.quarantined.len());
    println!("  failed:      {}", report.failed.len());
    println!("  pruned backups: {}", report.pruned_backups);
    for id in &report.restored {
        println!("  restored from backup: {id}");
    }
    for id in &report.failed {
        println!("  could not be validated (see log): {id}");
    }
    print_quarantined(&report.quarantined);
    Ok(())
}

pub(crate) fn print_quarantined(reports: &[QuarantineReport]) {
    for report in reports {
        println!();
        println!("⚠️  profile {} is unusable for this run", report.id);
        println!("{}", report.message);
    }
}

pub(crate) fn run_create(manager: &ProfileManager, name: &str, password: &str) -> Result<()> {
    let id = manager.create_profile(name, password)?;
    println!("created profile {name}");
    println!("- id: {id}");
    println!("- directory: {}", manager.store().layout().profile_dir(&id).display());
    Ok(())
}

pub(crate) fn run_list(manager: &ProfileManager) -> Result<()> {
    let ids = manager.profile_ids()?;
    if ids.is_empty() {
        println!("no profiles");
        return Ok(());
    }

    for id in ids {
        match manager.load(&id) {
            Ok(profile) => {
                let name = profile.name.as_deref().unwrap_or("(unnamed)");
                let marker = if profile.loggedin.as_deref() == Some("1") {
                    " [logged in]"
                } else {
                    ""
                };
                println!("  {id}  {name}{marker}");
            }
            Err(err) => println!("  {id}  (unreadable: {err})"),
        }
    }
    Ok(())
}

pub(crate) fn run_get(manager: &ProfileManager, id: &str, key: &str) -> Result<()> {
    match manager.get_field(id, key)? {
        Some(value) => println!("{value}"),
        None => println!("(unset)"),
    }
    Ok(())
}

pub(crate) fn run_set(manager: &ProfileManager, id: &str, key: &str, value: &str) -> Result<()> {
    // A quarantined profile cannot be edited.
    if let ValidationStatus::Quarantined(report) = manager.validate(id)? {
        print_quarantined(std::slice::from_ref(&report));
        bail!("profile {id} is quarantined");
    }

    let outcome = manager.set_field(id, key, value)?;
    if outcome.distance == 0 {
        println!("{key} unchanged");
    } else {
        println!("{key} = {value} (edit distance {})", outcome.distance);
    }
    if outcome.backed_up {
        println!("- backup refreshed");
    }
    Ok(())
}

pub(crate) fn run_prefs(manager: &ProfileManager, toggles_only: bool) {
    let registry = manager.registry();
    let descriptors: Vec<_> = if toggles_only {
        registry.toggles().collect()
    } else {
        registry.all().iter().collect()
    };

    println!("── preferences ({}) ─────────────────────────────────", descriptors.len());
    for descriptor in descriptors {
        let default = if descriptor.ignore_for_profile_creation {
            "(set at creation)"
        } else if descriptor.default_value.is_empty() {
            "(empty)"
        } else {
            descriptor.default_value.as_str()
        };
        println!(
            "  {:<24} {:<20} {}",
            descriptor.id, default, descriptor.display_name
        );
    }
}

pub(crate) fn run_reset(manager: &ProfileManager, id: &str) -> Result<()> {
    let outcome = manager.reset_profile(id)?;
    println!("profile {id} reset to defaults (edit distance {})", outcome.distance);
    Ok(())
}

pub(crate) fn run_delete(manager: &ProfileManager, id: &str, yes: bool) -> Result<()> {
    let name = manager
        .get_field(id, "name")
        .ok()
        .flatten()
        .unwrap_or_else(|| id.to_string());

    println!("⚠️  destructive operation: profile delete");
    println!("- profile: {name} ({id})");
    println!("- directory: {}", manager.store().layout().profile_dir(id).display());

    if !yes {
        if !io::stdin().is_terminal() {
            bail!("refusing to delete a profile in non-interactive mode without --yes");
        }

        let expected = format!("DELETE {name}");
        print!("This removes the profile, its files and its backups. Type '{expected}' to continue: ");
        io::stdout().flush()?;

        let mut confirmation = String::new();
        io::stdin().read_line(&mut confirmation)?;
        if confirmation.trim() != expected {
            println!("profile delete cancelled");
            return Ok(());
        }
    }

    manager.delete_profile(id)?;
    println!("profile {name} deleted");
    Ok(())
}

pub(crate) fn run_backups_list(manager: &ProfileManager) -> Result<()> {
    println!("── backups ──────────────────────────────────────────");
    for id in manager.store().stored_ids()? {
        match manager.store().backups().most_recent(&id)? {
            Some(record) => {
                let when = record
                    .created_at()
                    .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| record.timestamp_millis.to_string());
                println!("  {id}  {when}  ({} bytes)", record.content.len());
            }
            None => println!("  {id}  (no backup)"),
        }
    }
    Ok(())
}

pub(crate) fn run_backups_prune(manager: &ProfileManager) -> Result<()> {
    let active = manager.store().stored_ids()?;
    let removed = manager.store().backups().prune_orphans(&active)?;
    for path in &removed {
        println!("  removed {}", path.display());
    }
    println!("pruned {} orphan backup(s)", removed.len());
    Ok(())
}
