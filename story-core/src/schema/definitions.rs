//! Built-in schemas for story profiles and provider output.
//!
//! Output schemas follow the provider's strict mode: every property is
//! required and objects are closed. Optional values are nullable instead.

use serde_json::{json, Value};

fn string_array() -> Value {
    json!({ "type": "array", "items": { "type": "string" } })
}

fn flexible_item() -> Value {
    json!({
        "type": "object",
        "required": ["value", "status", "evidence"],
        "properties": {
            "value": { "type": "string", "minLength": 1 },
            "status": { "type": "string", "enum": ["tentative", "confirmed", "locked"] },
            "evidence": string_array()
        }
    })
}

fn choices() -> Value {
    json!({
        "type": "array",
        "minItems": 2,
        "maxItems": 2,
        "items": {
            "type": "object",
            "additionalProperties": false,
            "required": ["choice_id", "text", "intent", "risk_level", "leads_to"],
            "properties": {
                "choice_id": { "type": "string", "enum": ["A", "B"] },
                "text": { "type": "string" },
                "intent": { "type": "string" },
                "risk_level": { "type": "string", "enum": ["low", "medium", "high"] },
                "leads_to": { "type": "string" }
            }
        }
    })
}

lazy_static::lazy_static! {
    /// Story profile document accepted from callers and stored per version.
    pub static ref STORY_PROFILE: Value = json!({
        "type": "object",
        "required": ["version", "language", "genre", "content_rating", "canon", "flow"],
        "properties": {
            "version": { "type": "integer", "minimum": 1 },
            "language": { "type": "string", "minLength": 1 },
            "genre": { "type": "string", "minLength": 1 },
            "content_rating": { "type": "string", "enum": ["PG", "PG-13", "ADULT"] },
            "canon": {
                "type": "object",
                "required": ["locked", "flexible"],
                "properties": {
                    "locked": {
                        "type": "object",
                        "required": [
                            "world_rules",
                            "main_characters",
                            "narrative_style",
                            "theme_tone",
                            "hard_forbidden_topics"
                        ],
                        "properties": {
                            "world_rules": string_array(),
                            "main_characters": {
                                "type": "array",
                                "minItems": 1,
                                "items": {
                                    "type": "object",
                                    "required": ["name", "identity", "traits", "motivation", "fear"],
                                    "properties": {
                                        "name": { "type": "string", "minLength": 1 },
                                        "identity": { "type": "string" },
                                        "traits": string_array(),
                                        "motivation": { "type": "string" },
                                        "fear": { "type": "string" }
                                    }
                                }
                            },
                            "narrative_style": {
                                "type": "object",
                                "required": ["pov", "tense", "reading_level", "tone_keywords"],
                                "properties": {
                                    "pov": { "type": "string" },
                                    "tense": { "type": "string" },
                                    "reading_level": { "type": "string" },
                                    "tone_keywords": string_array()
                                }
                            },
                            "theme_tone": { "type": "string" },
                            "hard_forbidden_topics": string_array()
                        }
                    },
                    "flexible": {
                        "type": "object",
                        "required": [
                            "supporting_roles",
                            "core_conflict",
                            "locations_seed",
                            "key_items_or_secrets"
                        ],
                        "properties": {
                            "supporting_roles": { "type": "array", "items": flexible_item() },
                            "core_conflict": flexible_item(),
                            "locations_seed": { "type": "array", "items": flexible_item() },
                            "key_items_or_secrets": { "type": "array", "items": flexible_item() }
                        }
                    }
                }
            },
            "flow": {
                "type": "object",
                "required": ["dynamic_state"],
                "properties": {
                    "dynamic_state": {
                        "type": "object",
                        "required": [
                            "current_time",
                            "current_location_id",
                            "characters_present",
                            "inventory",
                            "open_threads",
                            "segment_goal"
                        ],
                        "properties": {
                            "current_time": { "type": "string" },
                            "current_location_id": { "type": "string" },
                            "characters_present": string_array(),
                            "inventory": string_array(),
                            "open_threads": string_array(),
                            "segment_goal": { "type": "string" },
                            "cliffhanger_seed": { "type": ["string", "null"] }
                        }
                    }
                }
            }
        }
    });

    /// Story title, logline and the opening episode.
    pub static ref STORY_CREATE_OUTPUT: Value = json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["title", "logline", "episode_title", "episode_text", "choices"],
        "properties": {
            "title": { "type": "string", "minLength": 1 },
            "logline": { "type": "string" },
            "episode_title": { "type": "string" },
            "episode_text": { "type": "string", "minLength": 1 },
            "choices": choices()
        }
    });

    /// A continuation episode with its state delta and self-reported checks.
    pub static ref EPISODE_GENERATE_OUTPUT: Value = json!({
        "type": "object",
        "additionalProperties": false,
        "required": [
            "episode_id",
            "segment",
            "choices",
            "state_update",
            "ledger_updates",
            "continuity_checks",
            "assumptions"
        ],
        "properties": {
            "episode_id": { "type": "string" },
            "segment": {
                "type": "object",
                "additionalProperties": false,
                "required": ["title", "text", "word_count"],
                "properties": {
                    "title": { "type": "string" },
                    "text": { "type": "string", "minLength": 1 },
                    "word_count": { "type": "integer", "minimum": 0 }
                }
            },
            "choices": choices(),
            "state_update": {
                "type": "object",
                "additionalProperties": false,
                "required": [
                    "time",
                    "location_id",
                    "characters_present",
                    "inventory_delta",
                    "open_threads_delta"
                ],
                "properties": {
                    "time": { "type": ["string", "null"] },
                    "location_id": { "type": ["string", "null"] },
                    "characters_present": {
                        "type": ["array", "null"],
                        "items": { "type": "string" }
                    },
                    "inventory_delta": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "additionalProperties": false,
                            "required": ["op", "owner_id", "item", "notes"],
                            "properties": {
                                "op": { "type": "string", "enum": ["add", "remove", "update"] },
                                "owner_id": { "type": "string" },
                                "item": { "type": "string" },
                                "notes": { "type": ["string", "null"] }
                            }
                        }
                    },
                    "open_threads_delta": {
                        "type": "object",
                        "additionalProperties": false,
                        "required": ["add", "resolve"],
                        "properties": {
                            "add": string_array(),
                            "resolve": string_array()
                        }
                    }
                }
            },
            "ledger_updates": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["key", "value", "introduced_in", "status"],
                    "properties": {
                        "key": { "type": "string" },
                        "value": { "type": "string" },
                        "introduced_in": { "type": "string" },
                        "status": { "type": "string", "enum": ["active", "resolved"] }
                    }
                }
            },
            "continuity_checks": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["rule", "result", "note"],
                    "properties": {
                        "rule": { "type": "string" },
                        "result": { "type": "string", "enum": ["pass", "warn"] },
                        "note": { "type": "string" }
                    }
                }
            },
            "assumptions": string_array()
        }
    });

    /// Recap, extracted state and canon reinforcement for a finished episode.
    pub static ref EPISODE_FINALIZE_OUTPUT: Value = json!({
        "type": "object",
        "additionalProperties": false,
        "required": [
            "summary_bullets",
            "open_threads",
            "state_snapshot",
            "new_persistent_facts",
            "flexible_canon_hits"
        ],
        "properties": {
            "summary_bullets": string_array(),
            "open_threads": string_array(),
            "state_snapshot": {
                "type": "object",
                "additionalProperties": false,
                "required": ["time", "location_id", "characters_present", "inventory"],
                "properties": {
                    "time": { "type": ["string", "null"] },
                    "location_id": { "type": "string" },
                    "characters_present": string_array(),
                    "inventory": string_array()
                }
            },
            "new_persistent_facts": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["key", "value"],
                    "properties": {
                        "key": { "type": "string", "minLength": 1 },
                        "value": { "type": "string" }
                    }
                }
            },
            "flexible_canon_hits": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["category", "value", "evidence"],
                    "properties": {
                        "category": {
                            "type": "string",
                            "enum": [
                                "supporting_roles",
                                "core_conflict",
                                "locations_seed",
                                "key_items_or_secrets"
                            ]
                        },
                        "value": { "type": "string", "minLength": 1 },
                        "evidence": { "type": "string" }
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::validate;

    #[test]
    fn test_output_schemas_compile() {
        for schema in [
            &*STORY_PROFILE,
            &*STORY_CREATE_OUTPUT,
            &*EPISODE_GENERATE_OUTPUT,
            &*EPISODE_FINALIZE_OUTPUT,
        ] {
            // An object never matches these schemas, but it must not be
            // reported as an unusable schema either.
            let result = validate(schema, &json!({}));
            assert!(!result.valid);
            assert!(!result.errors[0].message.starts_with("schema is unusable"));
        }
    }

    #[test]
    fn test_choices_must_be_exactly_two() {
        let value = json!({
            "title": "The Glowing Map",
            "logline": "A map that only shows the way at night.",
            "episode_title": "Low Tide",
            "episode_text": "Fog rolled over the harbor.",
            "choices": [
                { "choice_id": "A", "text": "Run", "intent": "escape", "risk_level": "low", "leads_to": "the docks" }
            ]
        });
        let result = validate(&STORY_CREATE_OUTPUT, &value);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.path == "/choices"));
    }

    #[test]
    fn test_finalize_rejects_unknown_category() {
        let value = json!({
            "summary_bullets": [],
            "open_threads": [],
            "state_snapshot": {
                "time": null,
                "location_id": "old_harbor",
                "characters_present": [],
                "inventory": []
            },
            "new_persistent_facts": [],
            "flexible_canon_hits": [
                { "category": "villains", "value": "The Tide King", "evidence": "appears" }
            ]
        });
        let result = validate(&EPISODE_FINALIZE_OUTPUT, &value);
        assert!(!result.valid);
        assert!(result
            .errors
            .iter()
            .any(|e| e.path == "/flexible_canon_hits/0/category"));
    }
}
