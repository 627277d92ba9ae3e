//! Persisted settings: the rule collection and scan configuration.
//!
//! Settings are stored as a JSON record. Loading always runs the schema
//! migrator on the raw record first, so older rule shapes are upgraded
//! before they are typed.

mod record;
mod schema;

pub use record::{ScanMode, ScanScope, Settings, SettingsError};
pub use schema::{is_valid_settings, validate_settings_schema};
