//! Settings record parsing and persistence.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::migration::{migrate, MigrationError, MigrationReport};
use crate::placeholder::DEFAULT_DATE_FORMAT;
use crate::rules::{parse_rules, Rule};

/// Minimum scheduler interval in minutes.
pub const MIN_SCAN_INTERVAL_MINUTES: u32 = 5;

/// Bounds for the latest-N scan scopes.
pub const MIN_SCAN_COUNT: u32 = 1;
pub const MAX_SCAN_COUNT: u32 = 1000;

const DEFAULT_SCAN_COUNT: u32 = 15;

/// Errors that can occur when loading or saving settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Settings migration failed: {0}")]
    MigrationError(#[from] MigrationError),

    #[error("Settings validation failed: {0}")]
    ValidationError(String),
}

/// Which notes a scan visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScanMode {
    /// The N most recently created notes
    #[default]
    LatestCreated,

    /// The N most recently modified notes
    LatestModified,

    /// Every note; the count is ignored
    EntireVault,
}

/// Scope handed to a document selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanScope {
    pub mode: ScanMode,

    /// Always at least 1
    pub count: usize,
}

impl ScanScope {
    pub fn new(mode: ScanMode, count: u32) -> Self {
        Self {
            mode,
            count: clamp_scan_count(count) as usize,
        }
    }

    pub fn entire_vault() -> Self {
        Self::new(ScanMode::EntireVault, MAX_SCAN_COUNT)
    }
}

/// Persisted settings record.
///
/// The engine only reads and writes `rules` and `schema_version`; the
/// remaining fields configure the outer scan loop. Unknown fields are
/// kept in `extra` and written back untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Current-shape rules, evaluated in order
    #[serde(default)]
    pub rules: Vec<Rule>,

    /// Migration gate
    #[serde(default)]
    pub schema_version: u32,

    /// Minutes between scheduled scans
    #[serde(default = "default_scan_interval")]
    pub scan_interval_minutes: u32,

    #[serde(default)]
    pub scan_scope: ScanMode,

    /// Notes visited by the latest-N scopes
    #[serde(default = "default_scan_count")]
    pub scan_count: u32,

    /// When the last full scan completed
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,

    /// Default pattern for `{date}`
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// Fall back to the file name when a note has no heading
    #[serde(default)]
    pub use_inline_title: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_scan_interval() -> u32 {
    MIN_SCAN_INTERVAL_MINUTES
}

fn default_scan_count() -> u32 {
    DEFAULT_SCAN_COUNT
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

fn clamp_scan_count(count: u32) -> u32 {
    count.clamp(MIN_SCAN_COUNT, MAX_SCAN_COUNT)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            schema_version: 0,
            scan_interval_minutes: default_scan_interval(),
            scan_scope: ScanMode::default(),
            scan_count: default_scan_count(),
            last_run: None,
            date_format: default_date_format(),
            use_inline_title: false,
            extra: Map::new(),
        }
    }
}

impl Settings {
    /// Parse settings from a JSON string, migrating legacy shapes.
    pub fn from_json(json: &str) -> Result<(Self, MigrationReport), SettingsError> {
        let raw: Value = serde_json::from_str(json)?;
        Self::from_value(raw)
    }

    /// Parse settings from a YAML string, migrating legacy shapes.
    pub fn from_yaml(yaml: &str) -> Result<(Self, MigrationReport), SettingsError> {
        let raw: Value = serde_yaml::from_str(yaml)?;
        Self::from_value(raw)
    }

    /// Parse settings from a JSON file.
    pub fn from_json_file(
        path: impl AsRef<Path>,
    ) -> Result<(Self, MigrationReport), SettingsError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse settings from a YAML file.
    pub fn from_yaml_file(
        path: impl AsRef<Path>,
    ) -> Result<(Self, MigrationReport), SettingsError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse a settings file, YAML for `.yaml`/`.yml` and JSON otherwise.
    /// The file is never written.
    pub fn from_file(path: impl AsRef<Path>) -> Result<(Self, MigrationReport), SettingsError> {
        let path = path.as_ref();
        if is_yaml_path(path) {
            Self::from_yaml_file(path)
        } else {
            Self::from_json_file(path)
        }
    }

    /// Migrate a raw record and type it.
    ///
    /// Rules are typed one at a time so a single malformed rule is dropped
    /// rather than failing the whole record.
    pub fn from_value(raw: Value) -> Result<(Self, MigrationReport), SettingsError> {
        let (migrated, report) = migrate(raw)?;
        let Value::Object(mut record) = migrated else {
            return Err(SettingsError::ValidationError(
                "settings record is not an object".to_string(),
            ));
        };

        let rules = match record.remove("rules") {
            Some(Value::Array(rules)) => rules,
            _ => Vec::new(),
        };

        let mut settings: Settings = serde_json::from_value(Value::Object(record))?;
        settings.rules = parse_rules(rules);
        settings.normalize();

        Ok((settings, report))
    }

    /// Load settings from `path`, or start fresh when the file does not
    /// exist. Persists the record again when migration advanced it.
    pub fn load(path: impl AsRef<Path>) -> Result<(Self, MigrationReport), SettingsError> {
        let path = path.as_ref();

        let (settings, report) = if path.exists() {
            Self::from_file(path)?
        } else {
            debug!(path = %path.display(), "no settings file, starting fresh");
            Self::from_value(Value::Object(Map::new()))?
        };

        if report.advanced() {
            settings.save(path)?;
            info!(
                path = %path.display(),
                version = settings.schema_version,
                "saved migrated settings"
            );
        }
        Ok((settings, report))
    }

    /// Write settings to `path` (YAML for `.yaml`/`.yml`, JSON otherwise).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let contents = if is_yaml_path(path) {
            serde_yaml::to_string(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        fs::write(path, contents)?;
        Ok(())
    }

    /// Scope for the next scan, from the configured mode and count.
    pub fn scan_scope(&self) -> ScanScope {
        ScanScope::new(self.scan_scope, self.scan_count)
    }

    /// Record the completion time of a full scan.
    pub fn touch_last_run(&mut self, now: DateTime<Utc>) {
        self.last_run = Some(now);
    }

    /// Clamp numeric fields into their allowed ranges.
    fn normalize(&mut self) {
        self.scan_interval_minutes = self.scan_interval_minutes.max(MIN_SCAN_INTERVAL_MINUTES);
        self.scan_count = clamp_scan_count(self.scan_count);
        if self.date_format.trim().is_empty() {
            self.date_format = default_date_format();
        }
    }
}

fn is_yaml_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::CURRENT_SCHEMA_VERSION;
    use crate::rules::{Action, Operator};

    #[test]
    fn test_defaults_for_empty_record() {
        let (settings, report) = Settings::from_json("{}").unwrap();
        assert_eq!(settings.schema_version, CURRENT_SCHEMA_VERSION);
        assert_eq!(settings.scan_interval_minutes, 5);
        assert_eq!(settings.scan_scope, ScanMode::LatestCreated);
        assert_eq!(settings.scan_count, 15);
        assert_eq!(settings.date_format, "YYYY-MM-DD");
        assert!(settings.rules.is_empty());
        assert!(report.advanced());
    }

    #[test]
    fn test_clamps_interval_and_count() {
        let (settings, _) = Settings::from_json(
            r#"{ "scanIntervalMinutes": 1, "scanCount": 5000, "schemaVersion": 2 }"#,
        )
        .unwrap();
        assert_eq!(settings.scan_interval_minutes, 5);
        assert_eq!(settings.scan_count, 1000);

        let (settings, _) = Settings::from_json(r#"{ "scanCount": 0 }"#).unwrap();
        assert_eq!(settings.scan_scope().count, 1);
    }

    #[test]
    fn test_legacy_record_is_migrated_and_typed() {
        let (settings, report) = Settings::from_json(
            r#"{
                "rules": [{ "ifProp": "status", "ifValue": "done", "op": "contains",
                            "thenProp": "archived", "thenValue": "true" }],
                "scanScope": "latestModified",
                "lastRun": null
            }"#,
        )
        .unwrap();

        assert_eq!(report.from_version, 0);
        assert_eq!(settings.scan_scope, ScanMode::LatestModified);
        assert_eq!(
            settings.rules,
            vec![Rule::property("status", Operator::Exactly, "done")
                .then(Action::add("archived", "true"))]
        );
    }

    #[test]
    fn test_malformed_current_rule_is_dropped() {
        let (settings, _) = Settings::from_json(
            r#"{ "schemaVersion": 2, "rules": [
                { "ifProp": "a", "op": "exactly", "thenActions": [] },
                { "ifProp": "b", "op": "whatever" }
            ] }"#,
        )
        .unwrap();
        assert_eq!(settings.rules.len(), 1);
    }

    #[test]
    fn test_yaml_settings() {
        let (settings, _) = Settings::from_yaml(
            r#"
schemaVersion: 2
scanScope: entireVault
dateFormat: "DD.MM.YYYY"
rules:
  - ifType: HEADING_FIRST_LEVEL
    op: notExists
    thenActions:
      - type: title
        modification: overwrite
        text: Untitled
"#,
        )
        .unwrap();
        assert_eq!(settings.scan_scope, ScanMode::EntireVault);
        assert_eq!(settings.date_format, "DD.MM.YYYY");
        assert_eq!(settings.rules.len(), 1);
    }

    #[test]
    fn test_load_persists_migrated_file_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let legacy = r#"{ "rules": [{ "ifProp": "status", "ifValue": "done",
                                   "thenProp": "tags", "thenValue": "x" }] }"#;
        fs::write(&path, legacy).unwrap();

        let (settings, report) = Settings::load(&path).unwrap();
        assert!(report.advanced());
        assert_eq!(settings.rules.len(), 1);

        let (reloaded, report) = Settings::from_file(&path).unwrap();
        assert!(!report.advanced());
        assert_eq!(reloaded.rules, settings.rules);
    }

    #[test]
    fn test_load_reads_yaml_by_extension() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("settings.yml");
        fs::write(&path, "schemaVersion: 2\nscanCount: 7\nrules: []\n").unwrap();

        let (settings, report) = Settings::load(&path).unwrap();
        assert!(!report.advanced());
        assert_eq!(settings.scan_count, 7);

        let missing = dir.path().join("missing.json");
        let (settings, _) = Settings::load(&missing).unwrap();
        assert!(settings.rules.is_empty());
    }

    #[test]
    fn test_unknown_fields_round_trip() {
        let (settings, _) =
            Settings::from_json(r#"{ "schemaVersion": 2, "theme": "dark" }"#).unwrap();
        let value = serde_json::to_value(&settings).unwrap();
        assert_eq!(value["theme"], "dark");
        assert_eq!(value["schemaVersion"], 2);
    }

    #[test]
    fn test_scan_scope() {
        let settings = Settings {
            scan_scope: ScanMode::EntireVault,
            ..Default::default()
        };
        assert_eq!(settings.scan_scope().mode, ScanMode::EntireVault);
        assert_eq!(ScanScope::new(ScanMode::LatestCreated, 0).count, 1);
    }

    #[test]
    fn test_touch_last_run() {
        let mut settings = Settings::default();
        let now = Utc::now();
        settings.touch_last_run(now);
        assert_eq!(settings.last_run, Some(now));
    }
}
