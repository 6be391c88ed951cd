//! The preference catalogue: one descriptor per scalar [`Profile`] field.
//!
//! Each descriptor carries its default, its editor metadata, an optional
//! change hook supplied by the UI layer, and a typed getter/setter pair so
//! field routing is a table lookup.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{ProfileError, Result};
use crate::schema::{MappedExecutables, Profile, ScreenStat};

/// Side effect run after a preference changes. Receives the saved profile.
pub type ChangeHook = Arc<dyn Fn(&Profile) + Send + Sync>;

/// Typed accessors for one scalar field.
#[derive(Clone, Copy)]
pub struct FieldAccess {
    pub get: fn(&Profile) -> Option<&str>,
    pub set: fn(&mut Profile, String),
}

macro_rules! field {
    ($field:ident) => {
        FieldAccess {
            get: |profile| profile.$field.as_deref(),
            set: |profile, value| profile.$field = Some(value),
        }
    };
}

#[derive(Clone)]
pub struct PreferenceDescriptor {
    pub id: &'static str,
    pub display_name: &'static str,
    pub tooltip: &'static str,
    pub default_value: String,
    /// Hidden from the editor's switch list (colours, fonts, keys, ...).
    pub ignore_for_toggle_ui: bool,
    /// No safe default exists; a missing value cannot be healed.
    pub ignore_for_profile_creation: bool,
    access: FieldAccess,
    on_change: Option<ChangeHook>,
}

impl PreferenceDescriptor {
    pub fn new(
        id: &'static str,
        display_name: &'static str,
        tooltip: &'static str,
        default_value: impl Into<String>,
        access: FieldAccess,
    ) -> Self {
        Self {
            id,
            display_name,
            tooltip,
            default_value: default_value.into(),
            ignore_for_toggle_ui: false,
            ignore_for_profile_creation: false,
            access,
            on_change: None,
        }
    }

    pub fn hidden_from_toggles(mut self) -> Self {
        self.ignore_for_toggle_ui = true;
        self
    }

    pub fn required_at_creation(mut self) -> Self {
        self.ignore_for_profile_creation = true;
        self
    }

    pub fn get<'a>(&self, profile: &'a Profile) -> Option<&'a str> {
        (self.access.get)(profile)
    }

    pub fn set(&self, profile: &mut Profile, value: impl Into<String>) {
        (self.access.set)(profile, value.into())
    }

    pub fn apply_default(&self, profile: &mut Profile) {
        self.set(profile, self.default_value.clone());
    }
}

impl fmt::Debug for PreferenceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreferenceDescriptor")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("default_value", &self.default_value)
            .field("ignore_for_toggle_ui", &self.ignore_for_toggle_ui)
            .field("ignore_for_profile_creation", &self.ignore_for_profile_creation)
            .field("has_hook", &self.on_change.is_some())
            .finish()
    }
}

pub struct Registry {
    descriptors: Vec<PreferenceDescriptor>,
    index: HashMap<&'static str, usize>,
    post_change: Option<ChangeHook>,
}

impl Registry {
    pub fn new(descriptors: Vec<PreferenceDescriptor>) -> Self {
        let mut kept = Vec::with_capacity(descriptors.len());
        let mut index = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if index.contains_key(descriptor.id) {
                warn!(id = descriptor.id, "duplicate preference id ignored");
                continue;
            }
            index.insert(descriptor.id, kept.len());
            kept.push(descriptor);
        }
        Self {
            descriptors: kept,
            index,
            post_change: None,
        }
    }

    /// The full profile schema, in the order the editor presents it.
    pub fn standard() -> Self {
        let launch_millis = Utc::now().timestamp_millis().to_string();

        Self::new(vec![
            PreferenceDescriptor::new("name", "Name", "Account name", "", field!(name))
                .hidden_from_toggles()
                .required_at_creation(),
            PreferenceDescriptor::new("pass", "Password", "Hashed password", "", field!(pass))
                .hidden_from_toggles()
                .required_at_creation(),
            PreferenceDescriptor::new("font", "Font", "", "Agency FB", field!(font))
                .hidden_from_toggles(),
            PreferenceDescriptor::new("foreground", "Foreground", "", "f0f0f0", field!(foreground))
                .hidden_from_toggles(),
            PreferenceDescriptor::new("background", "Background", "", "101010", field!(background))
                .hidden_from_toggles(),
            PreferenceDescriptor::new(
                "intromusic",
                "Intro Music",
                "Play intro music on start",
                "0",
                field!(intromusic),
            ),
            PreferenceDescriptor::new(
                "debugwindows",
                "Debug Windows",
                "Show debug menus on startup",
                "0",
                field!(debugwindows),
            ),
            PreferenceDescriptor::new(
                "randombackground",
                "Random Background",
                "Choose a random background on startup",
                "0",
                field!(randombackground),
            ),
            PreferenceDescriptor::new(
                "outputborder",
                "Output Border",
                "Draw a border around the output area",
                "0",
                field!(outputborder),
            ),
            PreferenceDescriptor::new(
                "inputborder",
                "Input Border",
                "Draw a border around the input area",
                "0",
                field!(inputborder),
            ),
            PreferenceDescriptor::new(
                "hourlychimes",
                "Hourly Chimes",
                "Chime every hour",
                "1",
                field!(hourlychimes),
            ),
            PreferenceDescriptor::new(
                "silenceerrors",
                "Silence Errors",
                "Don't open errors externally",
                "1",
                field!(silenceerrors),
            ),
            PreferenceDescriptor::new(
                "fullscreen",
                "Fullscreen",
                "Fullscreen the console (this also covers the taskbar)",
                "0",
                field!(fullscreen),
            ),
            PreferenceDescriptor::new(
                "outputfill",
                "Output Fill",
                "Fill the output area with the background colour",
                "0",
                field!(outputfill),
            ),
            PreferenceDescriptor::new(
                "inputfill",
                "Input Fill",
                "Fill the input area with the background colour",
                "0",
                field!(inputfill),
            ),
            PreferenceDescriptor::new(
                "clockonconsole",
                "Clock On Console",
                "Show a clock at the top of the console",
                "1",
                field!(clockonconsole),
            ),
            PreferenceDescriptor::new(
                "showseconds",
                "Show Seconds",
                "Show seconds on the console clock if enabled",
                "1",
                field!(showseconds),
            ),
            PreferenceDescriptor::new(
                "filterchat",
                "Filter Chat",
                "Filter foul language",
                "1",
                field!(filterchat),
            ),
            PreferenceDescriptor::new("laststart", "Last Start", "", launch_millis, field!(laststart))
                .hidden_from_toggles(),
            PreferenceDescriptor::new(
                "minimizeonclose",
                "Minimize On Close",
                "Minimize instead of exiting whenever a close action is requested",
                "0",
                field!(minimizeonclose),
            ),
            PreferenceDescriptor::new(
                "typinganimation",
                "Typing Animation",
                "Typing animation on console for non-vital outputs",
                "1",
                field!(typinganimation),
            ),
            PreferenceDescriptor::new(
                "typingsound",
                "Typing Animation Sound",
                "Typing sound effect to play if typing animation is enabled",
                "1",
                field!(typingsound),
            ),
            PreferenceDescriptor::new(
                "showbusyicon",
                "Show Busy Icon",
                "Show when the assistant is busy by changing the tray icon",
                "0",
                field!(showbusyicon),
            ),
            PreferenceDescriptor::new(
                "roundedwindows",
                "Rounded Windows",
                "Make certain windows rounded",
                "0",
                field!(roundedwindows),
            ),
            PreferenceDescriptor::new("windowcolor", "Window Color", "", "1A2033", field!(windowcolor))
                .hidden_from_toggles(),
            PreferenceDescriptor::new(
                "consoleclockformat",
                "Console Clock Format",
                "",
                "EEEEEEEEE h:mmaa",
                field!(consoleclockformat),
            )
            .hidden_from_toggles(),
            PreferenceDescriptor::new(
                "youtubeuuid",
                "YouTube UUID",
                "",
                "aaaaaaaaaaa",
                field!(youtubeuuid),
            )
            .hidden_from_toggles(),
            PreferenceDescriptor::new("ipkey", "IP Key", "", "", field!(ipkey)).hidden_from_toggles(),
            PreferenceDescriptor::new("weatherkey", "Weather Key", "", "", field!(weatherkey))
                .hidden_from_toggles(),
            PreferenceDescriptor::new(
                "youtubeapi3key",
                "YouTube API 3 Key",
                "",
                "",
                field!(youtubeapi3key),
            )
            .hidden_from_toggles(),
            PreferenceDescriptor::new(
                "capsmode",
                "Capital Letters Mode",
                "Capitalize all console output",
                "0",
                field!(capsmode),
            ),
            PreferenceDescriptor::new("loggedin", "Logged In", "", "0", field!(loggedin))
                .hidden_from_toggles(),
            PreferenceDescriptor::new(
                "audiolength",
                "Show Audio Total Length",
                "Show the total audio time instead of the time remaining",
                "1",
                field!(audiolength),
            ),
            PreferenceDescriptor::new(
                "persistentnotifications",
                "Persistent Notifications",
                "Notifications stay on screen until manually dismissed",
                "0",
                field!(persistentnotifications),
            ),
            PreferenceDescriptor::new(
                "doanimations",
                "Do Animations",
                "Use animations for things such as frame movement and notifications",
                "1",
                field!(doanimations),
            ),
            PreferenceDescriptor::new(
                "compacttextmode",
                "Compact Text",
                "Compact the text/components in supported text panes",
                "0",
                field!(compacttextmode),
            ),
            PreferenceDescriptor::new("fontmetric", "Font Metric", "", "1", field!(fontmetric))
                .hidden_from_toggles(),
            PreferenceDescriptor::new("fontsize", "Font Size", "", "30", field!(fontsize))
                .hidden_from_toggles(),
            PreferenceDescriptor::new(
                "wrapshell",
                "Wrap Shell",
                "Pass unrecognized commands to the native shell",
                "0",
                field!(wrapshell),
            ),
            PreferenceDescriptor::new(
                "darkmode",
                "Dark Mode",
                "Activate a pleasant dark mode",
                "0",
                field!(darkmode),
            ),
            PreferenceDescriptor::new(
                "weathermap",
                "Weather Map",
                "Show a map of the location's area in the weather widget background",
                "1",
                field!(weathermap),
            ),
        ])
    }

    /// Attach a UI side effect to one preference.
    pub fn with_hook(mut self, id: &str, hook: ChangeHook) -> Result<Self> {
        let idx = *self
            .index
            .get(id)
            .ok_or_else(|| ProfileError::PreferenceNotFound(id.to_string()))?;
        self.descriptors[idx].on_change = Some(hook);
        Ok(self)
    }

    /// Hook that runs after every preference hook, e.g. to refresh an open editor.
    pub fn with_post_change_hook(mut self, hook: ChangeHook) -> Self {
        self.post_change = Some(hook);
        self
    }

    pub fn lookup(&self, id: &str) -> Result<&PreferenceDescriptor> {
        self.index
            .get(id)
            .map(|&idx| &self.descriptors[idx])
            .ok_or_else(|| ProfileError::PreferenceNotFound(id.to_string()))
    }

    pub fn all(&self) -> &[PreferenceDescriptor] {
        &self.descriptors
    }

    /// Descriptors shown as switches in the editor, in registration order.
    pub fn toggles(&self) -> impl Iterator<Item = &PreferenceDescriptor> {
        self.descriptors.iter().filter(|d| !d.ignore_for_toggle_ui)
    }

    /// Descriptors whose default is written into a freshly created profile.
    pub fn creation_defaults(&self) -> impl Iterator<Item = &PreferenceDescriptor> {
        self.descriptors
            .iter()
            .filter(|d| !d.ignore_for_profile_creation)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Run the preference's hook, then the post-change hook.
    ///
    /// An unknown id is logged and otherwise ignored so a stale reference in
    /// the UI can never abort the save that triggered it.
    pub fn invoke_on_change(&self, id: &str, profile: &Profile) {
        let Ok(descriptor) = self.lookup(id) else {
            warn!(id, "failed to invoke preference refresh: unknown id");
            return;
        };

        match &descriptor.on_change {
            Some(hook) => hook(profile),
            None => debug!(id, "preference refreshed"),
        }

        if let Some(post) = &self.post_change {
            post(profile);
        }
    }

    pub fn build_default_profile(&self) -> Profile {
        let mut profile = Profile::default();
        self.reset(&mut profile);
        profile.screenstat = Some(ScreenStat::UNPLACED);
        profile.executables = Some(MappedExecutables::new());
        profile
    }

    /// Overwrite every defaultable field; credentials and composites are kept.
    pub fn reset(&self, profile: &mut Profile) {
        for descriptor in self.creation_defaults() {
            descriptor.apply_default(profile);
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("descriptors", &self.descriptors.len())
            .field("has_post_change_hook", &self.post_change.is_some())
            .finish()
    }
}
