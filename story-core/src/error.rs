//! Engine error taxonomy.
//!
//! Every failure carries a machine-readable [`ErrorKind`] and a flat list of
//! human-readable details so callers never have to parse free text.

use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the engine's flows.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing credentials or unusable settings. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed request or a story profile that fails its schema.
    #[error("{message}")]
    InputValidation {
        message: String,
        details: Vec<String>,
    },

    /// Transport, HTTP, refusal or payload failure from the provider.
    #[error("{context}: {source}")]
    Provider {
        context: String,
        #[source]
        source: openai::Error,
    },

    /// Generated value does not match its schema.
    #[error("{context} failed schema validation")]
    OutputSchema {
        context: String,
        details: Vec<String>,
    },

    /// Safety or continuity issues remained after every repair attempt.
    #[error("{context} failed safety checks")]
    Rejected {
        context: String,
        issues: Vec<String>,
    },

    /// Another transition already moved the session or profile forward.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Store failure. Earlier writes of the same flow are not rolled back
    /// unless the store commits the flow atomically.
    #[error("{context}: {source}")]
    Persistence {
        context: String,
        #[source]
        source: StoreError,
    },
}

/// Machine-readable error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    InputValidation,
    Provider,
    OutputSchema,
    Rejected,
    Conflict,
    Persistence,
}

impl EngineError {
    /// Input validation failure without details.
    pub fn input(message: impl Into<String>) -> Self {
        EngineError::InputValidation {
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// Wrap a provider failure; a missing credential becomes a configuration error.
    pub fn provider(context: impl Into<String>, source: openai::Error) -> Self {
        match source {
            openai::Error::NoApiKey => EngineError::Configuration(source.to_string()),
            source => EngineError::Provider {
                context: context.into(),
                source,
            },
        }
    }

    /// Wrap a store failure; version/uniqueness races become conflicts.
    pub fn store(context: impl Into<String>, source: StoreError) -> Self {
        match source {
            StoreError::Conflict(message) => EngineError::Conflict(message),
            source => EngineError::Persistence {
                context: context.into(),
                source,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Configuration(_) => ErrorKind::Configuration,
            EngineError::InputValidation { .. } => ErrorKind::InputValidation,
            EngineError::Provider { .. } => ErrorKind::Provider,
            EngineError::OutputSchema { .. } => ErrorKind::OutputSchema,
            EngineError::Rejected { .. } => ErrorKind::Rejected,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Persistence { .. } => ErrorKind::Persistence,
        }
    }

    /// Flat diagnostic lines for the caller.
    pub fn details(&self) -> Vec<String> {
        match self {
            EngineError::InputValidation { details, .. }
            | EngineError::OutputSchema { details, .. } => details.clone(),
            EngineError::Rejected { issues, .. } => issues.clone(),
            EngineError::Provider { source, .. } => vec![source.to_string()],
            EngineError::Persistence { source, .. } => vec![source.to_string()],
            EngineError::Configuration(message) | EngineError::Conflict(message) => {
                vec![message.clone()]
            }
        }
    }

    /// HTTP status the request boundary reports for this error.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::InputValidation => 400,
            ErrorKind::Conflict => 409,
            _ => 500,
        }
    }

    /// Whether the failure happened before anything reached the provider.
    pub fn is_fatal_configuration(&self) -> bool {
        matches!(self, EngineError::Configuration(_))
    }
}

/// Serializable error payload returned across the request boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub error: String,
    pub details: Vec<String>,
}

impl From<&EngineError> for ErrorBody {
    fn from(err: &EngineError) -> Self {
        Self {
            kind: err.kind(),
            error: err.to_string(),
            details: err.details(),
        }
    }
}
