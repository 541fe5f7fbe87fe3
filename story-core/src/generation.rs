//! Structured generation seam.
//!
//! The engine talks to the model only through [`StructuredGenerator`], so the
//! provider can be swapped for a scripted double in tests.

use crate::config::GenerationSettings;
use crate::schema::provider_schema;
use async_trait::async_trait;
use openai::{OpenAi, StructuredRequest};
use serde_json::Value;
use std::sync::Arc;

/// Produces a JSON value for a schema-constrained request.
///
/// The returned value is not validated; that is the caller's job.
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    async fn generate(&self, request: StructuredRequest) -> Result<Value, openai::Error>;
}

#[async_trait]
impl StructuredGenerator for OpenAi {
    async fn generate(&self, request: StructuredRequest) -> Result<Value, openai::Error> {
        self.structured(request).await
    }
}

#[async_trait]
impl<T: StructuredGenerator + ?Sized> StructuredGenerator for Arc<T> {
    async fn generate(&self, request: StructuredRequest) -> Result<Value, openai::Error> {
        (**self).generate(request).await
    }
}

/// Build a request carrying the given settings.
///
/// The provider receives [`provider_schema`] of `schema`; callers still
/// validate the reply against the full `schema`.
pub fn request(
    settings: &GenerationSettings,
    system: impl Into<String>,
    user: impl Into<String>,
    schema_name: &str,
    schema: &Value,
) -> StructuredRequest {
    StructuredRequest::new(system, user, provider_schema(schema))
        .with_model(settings.model.clone())
        .with_schema_name(schema_name)
        .with_temperature(settings.temperature)
        .with_max_output_tokens(settings.max_output_tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_carries_settings() {
        let settings = GenerationSettings::new("gpt-4o-mini")
            .with_temperature(0.7)
            .with_max_output_tokens(3000);
        let request = request(&settings, "sys", "user", "story_create", &json!({"type": "object"}));
        assert_eq!(request.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(request.schema_name, "story_create");
        assert_eq!(request.max_output_tokens, 3000);
        assert!((request.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_request_sends_schema_without_length_bounds() {
        let settings = GenerationSettings::new("gpt-4o-mini");
        let request = request(
            &settings,
            "sys",
            "user",
            "story_create_output",
            &crate::schema::definitions::STORY_CREATE_OUTPUT,
        );
        let sent = request.schema.to_string();
        assert!(!sent.contains("minLength"));
        assert!(!sent.contains("minItems"));
        assert!(sent.contains("episode_text"));
    }
}
