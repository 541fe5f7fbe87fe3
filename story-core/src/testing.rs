//! Testing utilities for the story engine.
//!
//! This module provides tools for integration testing:
//! - `ScriptedGenerator` for deterministic testing without API calls
//! - Fixtures for well-formed model outputs

use crate::generation::StructuredGenerator;
use async_trait::async_trait;
use openai::StructuredRequest;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A generator that returns scripted responses in order.
///
/// Every request is recorded so tests can inspect prompts and settings.
/// Clones share the same script and log.
#[derive(Clone, Default)]
pub struct ScriptedGenerator {
    responses: Arc<Mutex<VecDeque<Result<Value, openai::Error>>>>,
    requests: Arc<Mutex<Vec<StructuredRequest>>>,
}

impl ScriptedGenerator {
    /// Create a generator that returns `responses` in order.
    pub fn new(responses: Vec<Value>) -> Self {
        let generator = Self::default();
        for response in responses {
            generator.queue(response);
        }
        generator
    }

    /// Add a successful response to the queue.
    pub fn queue(&self, response: Value) {
        self.push(Ok(response));
    }

    /// Add a provider failure to the queue.
    pub fn queue_error(&self, error: openai::Error) {
        self.push(Err(error));
    }

    fn push(&self, response: Result<Value, openai::Error>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(response);
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<StructuredRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.responses.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl StructuredGenerator for ScriptedGenerator {
    async fn generate(&self, request: StructuredRequest) -> Result<Value, openai::Error> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let next = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| responses.pop_front());
        next.unwrap_or(Err(openai::Error::EmptyOutput))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn choices() -> Value {
    json!([
        {
            "choice_id": "A",
            "text": "Follow the glowing lines on the map",
            "intent": "explore",
            "risk_level": "medium",
            "leads_to": "the flooded archive"
        },
        {
            "choice_id": "B",
            "text": "Ask the harbor master about the relic",
            "intent": "investigate",
            "risk_level": "low",
            "leads_to": "the harbor office"
        }
    ])
}

/// A clean story-create output.
pub fn story_create_output() -> Value {
    json!({
        "title": "The Lantern Tide",
        "logline": "A traveler follows a moonlit map through a harbor that remembers everything.",
        "episode_title": "Salt and Silver",
        "episode_text": "The tide came in quiet that night. Aylin pressed the map flat against the pier.",
        "choices": choices()
    })
}

/// A clean episode draft with the given body text.
pub fn episode_draft(episode_id: &str, text: &str) -> Value {
    json!({
        "episode_id": episode_id,
        "segment": {
            "title": "The Flooded Archive",
            "text": text,
            "word_count": text.split_whitespace().count()
        },
        "choices": choices(),
        "state_update": {
            "time": "Midnight",
            "location_id": "flooded_archive",
            "characters_present": null,
            "inventory_delta": [
                { "op": "add", "owner_id": "Aylin", "item": "brass key", "notes": null }
            ],
            "open_threads_delta": { "add": ["Who flooded the archive?"], "resolve": [] }
        },
        "ledger_updates": [],
        "continuity_checks": [
            { "rule": "Story Bible compliance", "result": "pass", "note": "World rules respected." }
        ],
        "assumptions": []
    })
}

/// An episode draft whose own continuity check flags `note`.
pub fn episode_draft_with_warning(episode_id: &str, note: &str) -> Value {
    let mut draft = episode_draft(episode_id, "Aylin waded between the drowned shelves.");
    draft["continuity_checks"] = json!([
        { "rule": "Facts Ledger compliance", "result": "warn", "note": note }
    ]);
    draft
}

/// A finalizer output reinforcing the given canon hits.
pub fn finalizer_output(hits: Value, facts: Value) -> Value {
    json!({
        "summary_bullets": ["Aylin found a brass key in the archive."],
        "open_threads": ["Who flooded the archive?"],
        "state_snapshot": {
            "time": "Midnight",
            "location_id": "flooded_archive",
            "characters_present": ["Aylin"],
            "inventory": ["field notebook", "brass key"]
        },
        "new_persistent_facts": facts,
        "flexible_canon_hits": hits
    })
}
