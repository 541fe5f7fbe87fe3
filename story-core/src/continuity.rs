//! Continuity notes: the per-story ledger of established facts.
//!
//! Active notes are keyed; a story never holds two active notes with the
//! same key. New facts for a key that is already active are dropped rather
//! than overwriting the existing value.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    Active,
    Resolved,
}

/// A persisted ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuityNote {
    pub id: Uuid,
    pub story_id: Uuid,
    pub key: String,
    pub value: String,
    pub status: NoteStatus,
    pub introduced_in_episode: u32,
}

impl ContinuityNote {
    pub fn active(
        story_id: Uuid,
        key: impl Into<String>,
        value: impl Into<String>,
        episode: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            story_id,
            key: key.into(),
            value: value.into(),
            status: NoteStatus::Active,
            introduced_in_episode: episode,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == NoteStatus::Active
    }
}

/// A fact proposed by the finalizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFact {
    pub key: String,
    pub value: String,
}

/// Notes seeded from the locked world rules at story creation.
pub fn world_rule_notes(story_id: Uuid, world_rules: &[String]) -> Vec<ContinuityNote> {
    world_rules
        .iter()
        .enumerate()
        .map(|(index, rule)| {
            ContinuityNote::active(story_id, format!("world_rule_{}", index + 1), rule.clone(), 1)
        })
        .collect()
}

/// Keys of the active notes in `notes`.
pub fn active_keys(notes: &[ContinuityNote]) -> HashSet<&str> {
    notes
        .iter()
        .filter(|n| n.is_active())
        .map(|n| n.key.as_str())
        .collect()
}

/// Turn new facts into notes, skipping keys that are already active and
/// repeated keys within the batch (the first occurrence wins).
pub fn notes_for_new_facts(
    story_id: Uuid,
    existing: &[ContinuityNote],
    facts: &[NewFact],
    episode_number: u32,
) -> Vec<ContinuityNote> {
    let mut seen: HashSet<&str> = active_keys(existing);
    let mut notes = Vec::new();
    for fact in facts {
        if fact.key.is_empty() || !seen.insert(fact.key.as_str()) {
            continue;
        }
        notes.push(ContinuityNote::active(
            story_id,
            fact.key.clone(),
            fact.value.clone(),
            episode_number,
        ));
    }
    notes
}

/// Compact `{key, value, status}` view used in prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteView {
    pub key: String,
    pub value: String,
    pub status: NoteStatus,
}

impl From<&ContinuityNote> for NoteView {
    fn from(note: &ContinuityNote) -> Self {
        Self {
            key: note.key.clone(),
            value: note.value.clone(),
            status: note.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(key: &str, value: &str) -> NewFact {
        NewFact {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_world_rule_notes() {
        let story = Uuid::new_v4();
        let notes = world_rule_notes(
            story,
            &["Death is permanent.".to_string(), "No time travel.".to_string()],
        );
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].key, "world_rule_1");
        assert_eq!(notes[1].key, "world_rule_2");
        assert!(notes.iter().all(|n| n.introduced_in_episode == 1 && n.is_active()));
    }

    #[test]
    fn test_dedup_by_key_not_value() {
        let story = Uuid::new_v4();
        let existing = vec![ContinuityNote::active(story, "mentor_name", "Old Sefa", 1)];
        let notes = notes_for_new_facts(
            story,
            &existing,
            &[
                fact("mentor_name", "Someone else"),
                fact("harbor_bell", "cracked"),
                fact("other_key", "Old Sefa"),
            ],
            3,
        );
        let keys: Vec<&str> = notes.iter().map(|n| n.key.as_str()).collect();
        assert_eq!(keys, vec!["harbor_bell", "other_key"]);
        assert!(notes.iter().all(|n| n.introduced_in_episode == 3));
    }

    #[test]
    fn test_resolved_key_can_be_reintroduced() {
        let story = Uuid::new_v4();
        let mut old = ContinuityNote::active(story, "relic_location", "vault", 1);
        old.status = NoteStatus::Resolved;
        let notes = notes_for_new_facts(story, &[old], &[fact("relic_location", "tower")], 4);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].value, "tower");
    }

    #[test]
    fn test_batch_duplicates_first_wins() {
        let story = Uuid::new_v4();
        let notes = notes_for_new_facts(
            story,
            &[],
            &[fact("k", "first"), fact("k", "second"), fact("", "blank")],
            2,
        );
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].value, "first");
    }
}
