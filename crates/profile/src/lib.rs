pub mod backup;
pub mod codec;
pub mod distance;
pub mod error;
pub mod fs;
pub mod gate;
pub mod layout;
pub mod manager;
pub mod recovery;
pub mod registry;
pub mod schema;
pub mod store;
pub mod validate;

pub use error::{ProfileError, Result};
pub use manager::{ProfileManager, SweepReport, ValidationStatus, hash_password};
pub use recovery::QuarantineReport;
pub use registry::{ChangeHook, PreferenceDescriptor, Registry};
pub use schema::{MappedExecutable, MappedExecutables, Orientation, Profile, ScreenStat};
pub use store::{Modified, SaveOutcome};
