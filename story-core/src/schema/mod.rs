//! Structural validation of JSON documents.
//!
//! Every document that crosses a trust boundary (incoming story profiles,
//! provider output) goes through [`validate`] before the engine reads it.

pub mod definitions;

use jsonschema::{Draft, JSONSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One validation failure, located by a JSON pointer into the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// JSON pointer (`/choices/0/choice_id`); empty for the document root.
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = if self.path.is_empty() {
            "(root)"
        } else {
            self.path.as_str()
        };
        write!(f, "{path} {}", self.message)
    }
}

/// Outcome of validating a value against a schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    pub errors: Vec<ErrorDetail>,
}

impl Validation {
    /// Errors rendered as `"<path> <message>"` lines.
    pub fn messages(&self) -> Vec<String> {
        format_errors(&self.errors)
    }
}

/// Validate `value` against a draft-7 `schema`, collecting every error.
///
/// A schema that cannot be compiled is reported as a single root error so
/// callers always get a flat list back.
pub fn validate(schema: &Value, value: &Value) -> Validation {
    let compiled = match JSONSchema::options()
        .with_draft(Draft::Draft7)
        .compile(schema)
    {
        Ok(compiled) => compiled,
        Err(e) => {
            return Validation {
                valid: false,
                errors: vec![ErrorDetail {
                    path: String::new(),
                    message: format!("schema is unusable: {e}"),
                }],
            };
        }
    };

    let errors: Vec<ErrorDetail> = match compiled.validate(value) {
        Ok(()) => Vec::new(),
        Err(iter) => iter
            .map(|e| ErrorDetail {
                path: e.instance_path.to_string(),
                message: e.to_string(),
            })
            .collect(),
    };

    Validation {
        valid: errors.is_empty(),
        errors,
    }
}

/// Length and size bounds the provider's strict mode does not accept.
///
/// They stay in the schema [`validate`] checks against; only the copy sent
/// to the provider drops them.
const VALIDATOR_ONLY_KEYWORDS: &[&str] = &[
    "minLength",
    "maxLength",
    "pattern",
    "format",
    "minItems",
    "maxItems",
];

/// Copy of `schema` suitable for the provider's strict structured output.
pub fn provider_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !VALIDATOR_ONLY_KEYWORDS.contains(&key.as_str()))
                .map(|(key, value)| {
                    let value = if key == "properties" {
                        // Keys here are property names, not keywords.
                        match value {
                            Value::Object(props) => Value::Object(
                                props
                                    .iter()
                                    .map(|(name, prop)| (name.clone(), provider_schema(prop)))
                                    .collect(),
                            ),
                            other => other.clone(),
                        }
                    } else {
                        provider_schema(value)
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(provider_schema).collect()),
        other => other.clone(),
    }
}

/// Render errors as flat diagnostic strings.
pub fn format_errors(errors: &[ErrorDetail]) -> Vec<String> {
    errors.iter().map(|e| e.to_string()).collect()
}
