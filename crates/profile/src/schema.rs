use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// One user's persisted settings and state.
///
/// Every scalar is stored as a string exactly as it appears on disk
/// (`"0"`/`"1"` for switches, hex for colours, decimal for numbers).
/// `None` means the field was absent or malformed when the file was read;
/// the validator replaces such holes with registry defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: Option<String>,
    pub pass: Option<String>,
    pub font: Option<String>,
    pub foreground: Option<String>,
    pub background: Option<String>,
    pub intromusic: Option<String>,
    pub debugwindows: Option<String>,
    pub randombackground: Option<String>,
    pub outputborder: Option<String>,
    pub inputborder: Option<String>,
    pub hourlychimes: Option<String>,
    pub silenceerrors: Option<String>,
    pub fullscreen: Option<String>,
    pub outputfill: Option<String>,
    pub inputfill: Option<String>,
    pub clockonconsole: Option<String>,
    pub showseconds: Option<String>,
    pub filterchat: Option<String>,
    pub laststart: Option<String>,
    pub minimizeonclose: Option<String>,
    pub typinganimation: Option<String>,
    pub typingsound: Option<String>,
    pub showbusyicon: Option<String>,
    pub roundedwindows: Option<String>,
    pub windowcolor: Option<String>,
    pub consoleclockformat: Option<String>,
    pub youtubeuuid: Option<String>,
    pub ipkey: Option<String>,
    pub weatherkey: Option<String>,
    pub youtubeapi3key: Option<String>,
    pub capsmode: Option<String>,
    pub loggedin: Option<String>,
    pub audiolength: Option<String>,
    pub persistentnotifications: Option<String>,
    pub doanimations: Option<String>,
    pub compacttextmode: Option<String>,
    pub fontmetric: Option<String>,
    pub fontsize: Option<String>,
    pub wrapshell: Option<String>,
    pub darkmode: Option<String>,
    pub weathermap: Option<String>,
    pub screenstat: Option<ScreenStat>,
    pub executables: Option<MappedExecutables>,
}

/// JSON keys of the two structured fields; every other key is a string scalar.
pub const SCREEN_STAT_KEY: &str = "screenstat";
pub const EXECUTABLES_KEY: &str = "executables";

// ── Screen position ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Orientation {
    #[default]
    Top,
    Bottom,
    Left,
    Right,
}

/// Where the console window sits and how it is rotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenStat {
    pub console_x: i32,
    pub console_y: i32,
    pub console_width: i32,
    pub console_height: i32,
    pub monitor: i32,
    pub console_on_top: bool,
    pub console_direction: Orientation,
}

impl ScreenStat {
    /// Placeholder used until the window has been placed for real.
    pub const UNPLACED: ScreenStat = ScreenStat {
        console_x: i32::MIN,
        console_y: i32::MIN,
        console_width: i32::MAX,
        console_height: i32::MAX,
        monitor: i32::MAX,
        console_on_top: false,
        console_direction: Orientation::Top,
    };

    pub fn is_placed(&self) -> bool {
        *self != Self::UNPLACED
    }
}

impl Default for ScreenStat {
    fn default() -> Self {
        Self::UNPLACED
    }
}

// ── Mapped executables ───────────────────────────────────────────────────────

/// A user-defined shortcut: typing `name` launches `filepath`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappedExecutable {
    pub name: String,
    pub filepath: String,
}

impl MappedExecutable {
    pub fn new(name: impl Into<String>, filepath: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filepath: filepath.into(),
        }
    }

    fn key(&self) -> String {
        self.name.to_lowercase()
    }
}

/// Set of executables keyed by the case-insensitive display name.
///
/// Stored on disk as a plain JSON list. Reading a list drops exact duplicates
/// silently and keeps only the first entry for a name that appears again with
/// a different path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<MappedExecutable>", into = "Vec<MappedExecutable>")]
pub struct MappedExecutables {
    by_name: BTreeMap<String, MappedExecutable>,
}

impl MappedExecutables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` (and leaves the set untouched) when the name is taken.
    pub fn insert(&mut self, executable: MappedExecutable) -> bool {
        let key = executable.key();
        if self.by_name.contains_key(&key) {
            return false;
        }
        self.by_name.insert(key, executable);
        true
    }

    pub fn remove(&mut self, name: &str) -> Option<MappedExecutable> {
        self.by_name.remove(&name.to_lowercase())
    }

    pub fn get(&self, name: &str) -> Option<&MappedExecutable> {
        self.by_name.get(&name.to_lowercase())
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappedExecutable> {
        self.by_name.values()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl From<Vec<MappedExecutable>> for MappedExecutables {
    fn from(entries: Vec<MappedExecutable>) -> Self {
        let mut set = Self::new();
        for entry in entries {
            if let Some(existing) = set.get(&entry.name) {
                if *existing != entry {
                    warn!(
                        name = %entry.name,
                        kept = %existing.filepath,
                        dropped = %entry.filepath,
                        "conflicting executable mapping dropped"
                    );
                }
                continue;
            }
            set.insert(entry);
        }
        set
    }
}

impl From<MappedExecutables> for Vec<MappedExecutable> {
    fn from(set: MappedExecutables) -> Self {
        set.by_name.into_values().collect()
    }
}
