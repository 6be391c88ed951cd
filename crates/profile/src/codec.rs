use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{ProfileError, Result};
use crate::schema::{EXECUTABLES_KEY, MappedExecutable, Profile, SCREEN_STAT_KEY, ScreenStat};

/// Turns a [`Profile`] into its on-disk text form and back.
pub trait ProfileCodec: Send + Sync {
    fn serialize(&self, profile: &Profile) -> Result<String>;

    fn deserialize(&self, text: &str) -> Result<Profile>;
}

/// Single-line JSON, one key per preference id.
///
/// Reading is lenient per field: a value of the wrong shape is read as absent
/// so the validator can heal it. Only text that is not a JSON object fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ProfileCodec for JsonCodec {
    fn serialize(&self, profile: &Profile) -> Result<String> {
        serde_json::to_string(profile).map_err(|e| ProfileError::Parse(e.to_string()))
    }

    fn deserialize(&self, text: &str) -> Result<Profile> {
        if text.trim().is_empty() {
            return Err(ProfileError::Parse("profile data is empty".to_string()));
        }

        let value: Value =
            serde_json::from_str(text).map_err(|e| ProfileError::Parse(e.to_string()))?;
        let Value::Object(mut fields) = value else {
            return Err(ProfileError::Parse(
                "profile data is not a JSON object".to_string(),
            ));
        };

        blank_malformed_fields(&mut fields);
        serde_json::from_value(Value::Object(fields)).map_err(|e| ProfileError::Parse(e.to_string()))
    }
}

fn blank_malformed_fields(fields: &mut Map<String, Value>) {
    for (key, value) in fields.iter_mut() {
        if value.is_null() {
            continue;
        }

        let well_formed = match key.as_str() {
            SCREEN_STAT_KEY => serde_json::from_value::<ScreenStat>(value.clone()).is_ok(),
            EXECUTABLES_KEY => {
                serde_json::from_value::<Vec<MappedExecutable>>(value.clone()).is_ok()
            }
            _ => value.is_string(),
        };

        if !well_formed {
            warn!(field = %key, "malformed profile field read as missing");
            *value = Value::Null;
        }
    }
}
