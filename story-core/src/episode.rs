//! Episodes, choices and the structured outputs the model produces for them.

use crate::canon::CanonHit;
use crate::continuity::NewFact;
use crate::safety;
use crate::state::{StateSnapshot, StateUpdate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChoiceId {
    A,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// One of the two branches offered at the end of an episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub choice_id: ChoiceId,
    pub text: String,
    pub intent: String,
    pub risk_level: RiskLevel,
    /// Free-text hint about where the branch goes; not checked by the engine.
    pub leads_to: String,
}

/// Check that exactly two choices are present, tagged A and B.
pub fn choices_are_paired(choices: &[Choice]) -> bool {
    matches!(
        choices,
        [first, second]
            if first.choice_id != second.choice_id
    )
}

/// Recap written onto an episode when it is finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recap {
    pub summary_bullets: Vec<String>,
    pub open_threads: Vec<String>,
}

/// A persisted episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub id: Uuid,
    pub story_id: Uuid,
    pub episode_number: u32,
    pub title: String,
    pub text: String,
    pub choices: Vec<Choice>,
    /// Set once, by finalize.
    pub recap: Option<Recap>,
    pub state_snapshot: StateSnapshot,
}

impl Episode {
    pub fn is_finalized(&self) -> bool {
        self.recap.is_some()
    }

    /// Identifier handed to the model: `"<story_id>-<episode_number>"`.
    pub fn generation_id(story_id: Uuid, episode_number: u32) -> String {
        format!("{story_id}-{episode_number}")
    }
}

// ============================================================================
// Model outputs
// ============================================================================

/// Title, logline and opening episode for a new story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryCreateOutput {
    pub title: String,
    pub logline: String,
    pub episode_title: String,
    pub episode_text: String,
    pub choices: Vec<Choice>,
}

impl StoryCreateOutput {
    /// All model-written free text, for the safety scan.
    pub fn corpus(&self) -> String {
        let mut parts = vec![
            self.title.as_str(),
            self.logline.as_str(),
            self.episode_title.as_str(),
            self.episode_text.as_str(),
        ];
        for choice in &self.choices {
            parts.extend([
                choice.text.as_str(),
                choice.intent.as_str(),
                choice.leads_to.as_str(),
            ]);
        }
        safety::corpus(parts)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub title: String,
    pub text: String,
    pub word_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckResult {
    Pass,
    Warn,
}

/// A continuity check the model ran on its own draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuityCheck {
    pub rule: String,
    pub result: CheckResult,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerUpdate {
    pub key: String,
    pub value: String,
    pub introduced_in: String,
    pub status: crate::continuity::NoteStatus,
}

/// A generated continuation episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeDraft {
    pub episode_id: String,
    pub segment: Segment,
    pub choices: Vec<Choice>,
    pub state_update: StateUpdate,
    #[serde(default)]
    pub ledger_updates: Vec<LedgerUpdate>,
    #[serde(default)]
    pub continuity_checks: Vec<ContinuityCheck>,
    #[serde(default)]
    pub assumptions: Vec<String>,
}

impl EpisodeDraft {
    /// Notes of every check the model flagged as `warn`.
    pub fn continuity_warnings(&self) -> Vec<String> {
        self.continuity_checks
            .iter()
            .filter(|c| c.result == CheckResult::Warn)
            .map(|c| c.note.clone())
            .collect()
    }

    /// Title, body, every choice's text/intent/leads_to and the assumptions.
    pub fn corpus(&self) -> String {
        let mut parts = vec![self.segment.title.as_str(), self.segment.text.as_str()];
        for choice in &self.choices {
            parts.extend([
                choice.text.as_str(),
                choice.intent.as_str(),
                choice.leads_to.as_str(),
            ]);
        }
        parts.extend(self.assumptions.iter().map(String::as_str));
        safety::corpus(parts)
    }
}

/// State extracted by the finalizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedState {
    pub time: Option<String>,
    pub location_id: String,
    pub characters_present: Vec<String>,
    pub inventory: Vec<String>,
}

/// Recap, state extraction and canon reinforcement for a finished episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizerOutput {
    pub summary_bullets: Vec<String>,
    pub open_threads: Vec<String>,
    pub state_snapshot: ExtractedState,
    pub new_persistent_facts: Vec<NewFact>,
    pub flexible_canon_hits: Vec<CanonHit>,
}

impl FinalizerOutput {
    pub fn recap(&self) -> Recap {
        Recap {
            summary_bullets: self.summary_bullets.clone(),
            open_threads: self.open_threads.clone(),
        }
    }

    /// The snapshot stored on the episode; a missing time falls back to `previous`.
    pub fn snapshot(&self, previous: &StateSnapshot) -> StateSnapshot {
        StateSnapshot {
            time: self
                .state_snapshot
                .time
                .clone()
                .unwrap_or_else(|| previous.time.clone()),
            location_id: self.state_snapshot.location_id.clone(),
            characters_present: self.state_snapshot.characters_present.clone(),
            inventory: self.state_snapshot.inventory.clone(),
            open_threads: self.open_threads.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn choice(id: ChoiceId, text: &str) -> Choice {
        Choice {
            choice_id: id,
            text: text.to_string(),
            intent: "explore".to_string(),
            risk_level: RiskLevel::Low,
            leads_to: "the docks".to_string(),
        }
    }

    #[test]
    fn test_choices_are_paired() {
        assert!(choices_are_paired(&[choice(ChoiceId::A, "a"), choice(ChoiceId::B, "b")]));
        assert!(choices_are_paired(&[choice(ChoiceId::B, "b"), choice(ChoiceId::A, "a")]));
        assert!(!choices_are_paired(&[choice(ChoiceId::A, "a"), choice(ChoiceId::A, "b")]));
        assert!(!choices_are_paired(&[choice(ChoiceId::A, "a")]));
    }

    #[test]
    fn test_draft_decoding_and_warnings() {
        let draft: EpisodeDraft = serde_json::from_value(json!({
            "episode_id": "s-2",
            "segment": { "title": "Low Tide", "text": "Fog.", "word_count": 1 },
            "choices": [
                { "choice_id": "A", "text": "Dive", "intent": "risk", "risk_level": "high", "leads_to": "reef" },
                { "choice_id": "B", "text": "Wait", "intent": "patience", "risk_level": "low", "leads_to": "dawn" }
            ],
            "state_update": {
                "time": null,
                "location_id": "reef",
                "characters_present": null,
                "inventory_delta": [
                    { "op": "add", "owner_id": "Aylin", "item": "rope", "notes": null }
                ],
                "open_threads_delta": { "add": [], "resolve": [] }
            },
            "ledger_updates": [],
            "continuity_checks": [
                { "rule": "Story Bible compliance", "result": "pass", "note": "ok" },
                { "rule": "Facts Ledger compliance", "result": "warn", "note": "lantern reappeared" }
            ],
            "assumptions": ["Aylin can swim"]
        }))
        .unwrap();

        assert_eq!(draft.continuity_warnings(), vec!["lantern reappeared"]);
        assert!(draft.state_update.time.is_none());
        assert_eq!(draft.state_update.location_id.as_deref(), Some("reef"));

        let corpus = draft.corpus();
        assert!(corpus.starts_with("Low Tide Fog."));
        assert!(corpus.contains("reef"));
        assert!(corpus.ends_with("Aylin can swim"));
    }

    #[test]
    fn test_finalizer_snapshot_fallback() {
        let output = FinalizerOutput {
            summary_bullets: vec!["Aylin found the sigil".to_string()],
            open_threads: vec!["What does the sigil open?".to_string()],
            state_snapshot: ExtractedState {
                time: None,
                location_id: "shadow_bazaar".to_string(),
                characters_present: vec!["Aylin".to_string()],
                inventory: vec!["map".to_string()],
            },
            new_persistent_facts: vec![],
            flexible_canon_hits: vec![],
        };
        let previous = StateSnapshot {
            time: "Night".to_string(),
            ..Default::default()
        };
        let snapshot = output.snapshot(&previous);
        assert_eq!(snapshot.time, "Night");
        assert_eq!(snapshot.location_id, "shadow_bazaar");
        assert_eq!(snapshot.open_threads, vec!["What does the sigil open?"]);
        assert_eq!(output.recap().summary_bullets.len(), 1);
    }

    #[test]
    fn test_generation_id() {
        let id = Uuid::nil();
        assert_eq!(
            Episode::generation_id(id, 3),
            "00000000-0000-0000-0000-000000000000-3"
        );
    }
}
