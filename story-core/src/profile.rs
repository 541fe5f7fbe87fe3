//! Story profile documents.
//!
//! A profile holds the locked canon (never edited after creation), the
//! flexible canon (evolved by [`crate::canon`]) and the dynamic narrative
//! state. Profiles are versioned: every finalize appends a new version.

use crate::error::EngineError;
use crate::schema::{self, definitions};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Segment goal used when neither the request nor the profile names one.
pub const DEFAULT_SEGMENT_GOAL: &str = "Advance the plot";

/// Audience rating tiers, most restrictive first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentRating {
    #[serde(rename = "PG")]
    Pg,
    #[serde(rename = "PG-13")]
    Pg13,
    #[serde(rename = "ADULT")]
    Adult,
}

impl ContentRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentRating::Pg => "PG",
            ContentRating::Pg13 => "PG-13",
            ContentRating::Adult => "ADULT",
        }
    }

    /// The two tiers that forbid explicit sexual content and graphic violence.
    pub fn is_restrictive(&self) -> bool {
        matches!(self, ContentRating::Pg | ContentRating::Pg13)
    }

    /// Instruction given to the model for this tier.
    pub fn guidance(&self) -> &'static str {
        match self {
            ContentRating::Pg => {
                "Keep content family-friendly. No violence, no explicit themes, no dark content."
            }
            ContentRating::Pg13 => {
                "Mild tension and conflict allowed. No graphic violence or explicit themes."
            }
            ContentRating::Adult => {
                "Mature themes allowed, but no hate speech, sexual violence, or self-harm."
            }
        }
    }
}

impl fmt::Display for ContentRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentRating {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PG" => Ok(ContentRating::Pg),
            "PG-13" => Ok(ContentRating::Pg13),
            "ADULT" => Ok(ContentRating::Adult),
            other => Err(EngineError::InputValidation {
                message: "Invalid content_rating".to_string(),
                details: vec![format!("expected one of PG, PG-13, ADULT; got {other:?}")],
            }),
        }
    }
}

/// Lifecycle status of a flexible canon item. Ordered: status only moves up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonStatus {
    Tentative,
    Confirmed,
    Locked,
}

/// An evidence-tracked fact in the flexible canon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlexibleCanonItem {
    pub value: String,
    pub status: CanonStatus,
    #[serde(default)]
    pub evidence: Vec<String>,
}

impl FlexibleCanonItem {
    pub fn tentative(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            status: CanonStatus::Tentative,
            evidence: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainCharacter {
    pub name: String,
    pub identity: String,
    pub traits: Vec<String>,
    pub motivation: String,
    pub fear: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeStyle {
    pub pov: String,
    pub tense: String,
    pub reading_level: String,
    pub tone_keywords: Vec<String>,
}

/// Canon fixed at story creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedCanon {
    pub world_rules: Vec<String>,
    pub main_characters: Vec<MainCharacter>,
    pub narrative_style: NarrativeStyle,
    pub theme_tone: String,
    pub hard_forbidden_topics: Vec<String>,
}

/// Canon that evolves as episodes corroborate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlexibleCanon {
    pub supporting_roles: Vec<FlexibleCanonItem>,
    pub core_conflict: FlexibleCanonItem,
    pub locations_seed: Vec<FlexibleCanonItem>,
    pub key_items_or_secrets: Vec<FlexibleCanonItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Canon {
    pub locked: LockedCanon,
    pub flexible: FlexibleCanon,
}

/// Narrative state after the latest finalized episode, plus the next goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicState {
    pub current_time: String,
    pub current_location_id: String,
    pub characters_present: Vec<String>,
    pub inventory: Vec<String>,
    pub open_threads: Vec<String>,
    pub segment_goal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cliffhanger_seed: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    pub dynamic_state: DynamicState,
}

/// A versioned story profile document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryProfile {
    pub version: u32,
    pub language: String,
    pub genre: String,
    pub content_rating: ContentRating,
    pub canon: Canon,
    pub flow: Flow,
}

impl StoryProfile {
    /// Build the version-1 profile for a new story.
    pub fn initial(genre: &str, content_rating: ContentRating, language: &str) -> Self {
        let main_character_name = if genre.to_lowercase().contains("noir") {
            "Kerem"
        } else {
            "Aylin"
        };

        Self {
            version: 1,
            language: language.to_string(),
            genre: genre.to_string(),
            content_rating,
            canon: Canon {
                locked: LockedCanon {
                    world_rules: vec![
                        "Death is permanent; resurrection is impossible.".to_string(),
                        "Time travel is impossible.".to_string(),
                    ],
                    main_characters: vec![MainCharacter {
                        name: main_character_name.to_string(),
                        identity: "A resourceful traveler surviving through wit and courage."
                            .to_string(),
                        traits: vec![
                            "brave".to_string(),
                            "curious".to_string(),
                            "stubborn".to_string(),
                        ],
                        motivation: "Protect loved ones.".to_string(),
                        fear: "Losing control.".to_string(),
                    }],
                    narrative_style: NarrativeStyle {
                        pov: "third".to_string(),
                        tense: "past".to_string(),
                        reading_level: "young_adult".to_string(),
                        tone_keywords: vec!["immersive".to_string(), "emotional".to_string()],
                    },
                    theme_tone: format!("{genre} adventure"),
                    hard_forbidden_topics: vec![
                        "hate".to_string(),
                        "sexual violence".to_string(),
                        "self-harm".to_string(),
                    ],
                },
                flexible: FlexibleCanon {
                    supporting_roles: vec![
                        FlexibleCanonItem::tentative("mentor"),
                        FlexibleCanonItem::tentative("rival"),
                    ],
                    core_conflict: FlexibleCanonItem::tentative("Find a lost relic"),
                    locations_seed: vec![
                        FlexibleCanonItem::tentative("Old Harbor"),
                        FlexibleCanonItem::tentative("Shadow Bazaar"),
                    ],
                    key_items_or_secrets: vec![FlexibleCanonItem::tentative(
                        "A map that glows in moonlight",
                    )],
                },
            },
            flow: Flow {
                dynamic_state: DynamicState {
                    current_time: "Night".to_string(),
                    current_location_id: "old_harbor".to_string(),
                    characters_present: vec![main_character_name.to_string()],
                    inventory: vec!["field notebook".to_string()],
                    open_threads: vec!["Who stole the relic?".to_string()],
                    segment_goal: "Find the first clue".to_string(),
                    cliffhanger_seed: Some("A hidden sigil appears on the map".to_string()),
                },
            },
        }
    }

    /// Decode a caller-supplied document: migrate, validate, then type it.
    pub fn from_document(document: &Value) -> Result<Self, EngineError> {
        let migrated = migrate(document.clone());

        let validation = schema::validate(&definitions::STORY_PROFILE, &migrated);
        if !validation.valid {
            return Err(EngineError::InputValidation {
                message: "story_profile schema validation failed".to_string(),
                details: validation.messages(),
            });
        }

        serde_json::from_value(migrated).map_err(|e| EngineError::InputValidation {
            message: "story_profile could not be decoded".to_string(),
            details: vec![e.to_string()],
        })
    }

    /// Serialize back into a document.
    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Check this profile against the profile schema.
    pub fn validate(&self) -> schema::Validation {
        schema::validate(&definitions::STORY_PROFILE, &self.to_document())
    }

    /// Name of the first main character, if any.
    pub fn protagonist(&self) -> Option<&MainCharacter> {
        self.canon.locked.main_characters.first()
    }

    /// Segment goal from the request, else the profile, else the default.
    pub fn segment_goal_or<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .filter(|g| !g.trim().is_empty())
            .or_else(|| {
                let goal = self.flow.dynamic_state.segment_goal.as_str();
                (!goal.trim().is_empty()).then_some(goal)
            })
            .unwrap_or(DEFAULT_SEGMENT_GOAL)
    }
}

/// Normalise older profile documents into the current shape.
///
/// - a missing `version` becomes 1
/// - finalized states written with `time`/`location_id` are renamed to
///   `current_time`/`current_location_id`
/// - missing `open_threads` and `segment_goal` get defaults
///
/// Anything else is left untouched for schema validation to judge.
pub fn migrate(mut document: Value) -> Value {
    let Some(root) = document.as_object_mut() else {
        return document;
    };

    root.entry("version").or_insert_with(|| Value::from(1));

    let state = root
        .get_mut("flow")
        .and_then(|flow| flow.get_mut("dynamic_state"))
        .and_then(Value::as_object_mut);

    if let Some(state) = state {
        for (legacy, current) in [
            ("time", "current_time"),
            ("location_id", "current_location_id"),
        ] {
            if let Some(value) = state.remove(legacy) {
                if !state.contains_key(current) && !value.is_null() {
                    state.insert(current.to_string(), value);
                }
            }
        }
        state
            .entry("open_threads")
            .or_insert_with(|| Value::Array(Vec::new()));
        state
            .entry("segment_goal")
            .or_insert_with(|| Value::from(DEFAULT_SEGMENT_GOAL));
    }

    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_initial_profile_is_valid() {
        let profile = StoryProfile::initial("fantasy", ContentRating::Pg13, "en");
        let validation = profile.validate();
        assert!(validation.valid, "{:?}", validation.messages());
        assert_eq!(profile.version, 1);
        assert_eq!(profile.protagonist().unwrap().name, "Aylin");
        assert_eq!(profile.canon.locked.theme_tone, "fantasy adventure");
        assert_eq!(
            profile.canon.flexible.core_conflict.status,
            CanonStatus::Tentative
        );
    }

    #[test]
    fn test_noir_protagonist() {
        let profile = StoryProfile::initial("Neo-Noir", ContentRating::Adult, "tr");
        assert_eq!(profile.protagonist().unwrap().name, "Kerem");
        assert_eq!(
            profile.flow.dynamic_state.characters_present,
            vec!["Kerem".to_string()]
        );
    }

    #[test]
    fn test_document_round_trip() {
        let profile = StoryProfile::initial("mystery", ContentRating::Pg, "en");
        let document = profile.to_document();
        assert_eq!(document["content_rating"], "PG");
        assert_eq!(document["canon"]["flexible"]["core_conflict"]["status"], "tentative");
        assert_eq!(StoryProfile::from_document(&document).unwrap(), profile);
    }

    #[test]
    fn test_invalid_document_reports_paths() {
        let mut document = StoryProfile::initial("mystery", ContentRating::Pg, "en").to_document();
        document["content_rating"] = json!("R");
        document["canon"]["flexible"]["core_conflict"]["status"] = json!("canon");

        let err = StoryProfile::from_document(&document).unwrap_err();
        assert_eq!(err.status_code(), 400);
        let details = err.details();
        assert!(details.iter().any(|d| d.starts_with("/content_rating")));
        assert!(details
            .iter()
            .any(|d| d.starts_with("/canon/flexible/core_conflict/status")));
    }

    #[test]
    fn test_migrate_legacy_state_keys() {
        let mut document = StoryProfile::initial("mystery", ContentRating::Pg, "en").to_document();
        let state = document["flow"]["dynamic_state"].as_object_mut().unwrap();
        state.remove("current_time");
        state.remove("open_threads");
        state.insert("time".to_string(), json!("Dawn"));
        document.as_object_mut().unwrap().remove("version");

        let profile = StoryProfile::from_document(&document).unwrap();
        assert_eq!(profile.version, 1);
        assert_eq!(profile.flow.dynamic_state.current_time, "Dawn");
        assert!(profile.flow.dynamic_state.open_threads.is_empty());
    }

    #[test]
    fn test_migrate_keeps_current_key() {
        let migrated = migrate(json!({
            "flow": { "dynamic_state": { "current_time": "Noon", "time": "Dusk" } }
        }));
        assert_eq!(migrated["flow"]["dynamic_state"]["current_time"], "Noon");
        assert!(migrated["flow"]["dynamic_state"].get("time").is_none());
    }

    #[test]
    fn test_segment_goal_fallbacks() {
        let mut profile = StoryProfile::initial("mystery", ContentRating::Pg, "en");
        assert_eq!(profile.segment_goal_or(Some("Escape")), "Escape");
        assert_eq!(profile.segment_goal_or(None), "Find the first clue");
        profile.flow.dynamic_state.segment_goal.clear();
        assert_eq!(profile.segment_goal_or(Some("  ")), DEFAULT_SEGMENT_GOAL);
    }

    #[test]
    fn test_rating_parse() {
        assert_eq!("PG-13".parse::<ContentRating>().unwrap(), ContentRating::Pg13);
        assert!("pg".parse::<ContentRating>().is_err());
        assert!(ContentRating::Pg.is_restrictive());
        assert!(!ContentRating::Adult.is_restrictive());
    }

    #[test]
    fn test_status_ordering() {
        assert!(CanonStatus::Tentative < CanonStatus::Confirmed);
        assert!(CanonStatus::Confirmed < CanonStatus::Locked);
    }
}
