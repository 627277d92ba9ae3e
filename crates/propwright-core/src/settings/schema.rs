//! JSON Schema validation for settings records.
//!
//! The schema at schema/settings.schema.json describes the current record
//! shape. Validate after migration; legacy records fail it by definition.

use std::sync::OnceLock;

use super::SettingsError;

/// Embedded settings schema (loaded at compile time).
const SETTINGS_SCHEMA_JSON: &str = include_str!("../../../../schema/settings.schema.json");

/// Compiled validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn get_validator() -> Result<&'static jsonschema::Validator, SettingsError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(SETTINGS_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result
        .as_ref()
        .map_err(|e| SettingsError::ValidationError(e.clone()))
}

/// Validate a settings record against the schema.
///
/// Returns every violation as `"<message> at <instance path>"`.
pub fn validate_settings_schema(record: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e.to_string()])?;

    let errors: Vec<String> = validator
        .iter_errors(record)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check if a settings record is valid against the schema.
pub fn is_valid_settings(record: &serde_json::Value) -> bool {
    get_validator()
        .map(|v| v.is_valid(record))
        .unwrap_or(false)
}
