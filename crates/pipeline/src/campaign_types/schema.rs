//! Argument schemas, one per campaign type.

use armada_core::error::MultiError;
use jsonschema::JSONSchema;
use serde_json::Value;

use super::CampaignTypeError;

const COMBY_SCHEMA: &str = r#"{
    "$schema": "http://json-schema.org/draft-07/schema#",
    "type": "object",
    "properties": {
        "scopeQuery": { "type": "string", "minLength": 1 },
        "matchTemplate": { "type": "string", "minLength": 1 },
        "rewriteTemplate": { "type": "string" }
    },
    "required": ["scopeQuery", "matchTemplate", "rewriteTemplate"],
    "additionalProperties": false
}"#;

const CREDENTIALS_SCHEMA: &str = r#"{
    "$schema": "http://json-schema.org/draft-07/schema#",
    "type": "object",
    "properties": {
        "scopeQuery": { "type": "string", "minLength": 1 },
        "matchers": {
            "type": "array",
            "minItems": 1,
            "items": {
                "type": "object",
                "properties": {
                    "type": { "type": "string", "enum": ["npm"] }
                },
                "required": ["type"],
                "additionalProperties": false
            }
        }
    },
    "required": ["scopeQuery", "matchers"],
    "additionalProperties": false
}"#;

/// Raw schema for a (lowercase) campaign type name.
pub fn schema_for(campaign_type: &str) -> Option<&'static str> {
    match campaign_type {
        "comby" => Some(COMBY_SCHEMA),
        "credentials" => Some(CREDENTIALS_SCHEMA),
        _ => None,
    }
}

/// Validate `arguments` against the schema of `campaign_type`.
///
/// Every violation is reported, sorted by instance path.
pub fn validate_arguments(campaign_type: &str, arguments: &Value) -> Result<(), CampaignTypeError> {
    let raw = schema_for(campaign_type)
        .ok_or_else(|| CampaignTypeError::Unknown(campaign_type.to_string()))?;
    let schema: Value = serde_json::from_str(raw)
        .map_err(|e| CampaignTypeError::Schema(format!("{campaign_type}: {e}")))?;
    let compiled = JSONSchema::options()
        .compile(&schema)
        .map_err(|e| CampaignTypeError::Schema(format!("{campaign_type}: {e}")))?;

    let mut violations: Vec<(String, String)> = match compiled.validate(arguments) {
        Ok(()) => return Ok(()),
        Err(errors) => errors
            .map(|error| {
                let path = error.instance_path.to_string();
                let path = if path.is_empty() { "/".to_string() } else { path };
                (path, error.to_string())
            })
            .collect(),
    };
    violations.sort();

    let errors: MultiError = violations
        .into_iter()
        .map(|(path, message)| format!("{path}: {message}"))
        .collect();
    Err(CampaignTypeError::InvalidArguments {
        campaign_type: campaign_type.to_string(),
        errors,
    })
}
