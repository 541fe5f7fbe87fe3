//! Flexible canon lifecycle.
//!
//! Facts in the flexible canon start `tentative` and are promoted as
//! finalized episodes corroborate them: two distinct pieces of evidence
//! confirm a fact, three lock it. Locked facts are presented to later
//! generations as settled truth.

use crate::profile::{CanonStatus, FlexibleCanon, FlexibleCanonItem, StoryProfile};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Distinct evidence needed to move tentative → confirmed.
pub const CONFIRM_THRESHOLD: usize = 2;

/// Distinct evidence needed to move confirmed → locked.
pub const LOCK_THRESHOLD: usize = 3;

/// Flexible canon categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonCategory {
    SupportingRoles,
    CoreConflict,
    LocationsSeed,
    KeyItemsOrSecrets,
}

impl CanonCategory {
    pub fn name(&self) -> &'static str {
        match self {
            CanonCategory::SupportingRoles => "supporting_roles",
            CanonCategory::CoreConflict => "core_conflict",
            CanonCategory::LocationsSeed => "locations_seed",
            CanonCategory::KeyItemsOrSecrets => "key_items_or_secrets",
        }
    }
}

/// A canon element reinforced by an episode, as reported by the finalizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonHit {
    pub category: CanonCategory,
    pub value: String,
    pub evidence: String,
}

impl FlexibleCanonItem {
    /// Number of distinct evidence strings.
    pub fn distinct_evidence(&self) -> usize {
        self.evidence.iter().collect::<HashSet<_>>().len()
    }

    /// Record evidence from an episode and promote at most one step.
    ///
    /// Returns true when the status changed.
    pub fn touch(&mut self, episode_number: u32, evidence: &str) -> bool {
        let entry = format!("episode:{episode_number} {evidence}");
        if !self.evidence.contains(&entry) {
            self.evidence.push(entry);
        }

        let distinct = self.distinct_evidence();
        let next = match self.status {
            CanonStatus::Tentative if distinct >= CONFIRM_THRESHOLD => CanonStatus::Confirmed,
            CanonStatus::Confirmed if distinct >= LOCK_THRESHOLD => CanonStatus::Locked,
            status => status,
        };

        let promoted = next != self.status;
        self.status = next;
        promoted
    }
}

impl FlexibleCanon {
    fn list_mut(&mut self, category: CanonCategory) -> Option<&mut Vec<FlexibleCanonItem>> {
        match category {
            CanonCategory::SupportingRoles => Some(&mut self.supporting_roles),
            CanonCategory::LocationsSeed => Some(&mut self.locations_seed),
            CanonCategory::KeyItemsOrSecrets => Some(&mut self.key_items_or_secrets),
            CanonCategory::CoreConflict => None,
        }
    }

    /// Apply one hit in place.
    pub fn apply_hit(&mut self, hit: &CanonHit, episode_number: u32) {
        let Some(list) = self.list_mut(hit.category) else {
            self.apply_core_conflict(hit, episode_number);
            return;
        };

        let index = match list.iter().position(|item| item.value == hit.value) {
            Some(index) => index,
            None => {
                list.push(FlexibleCanonItem::tentative(hit.value.clone()));
                list.len() - 1
            }
        };

        if list[index].touch(episode_number, &hit.evidence) {
            tracing::debug!(
                category = hit.category.name(),
                value = %hit.value,
                status = ?list[index].status,
                "flexible canon promoted"
            );
        }
    }

    fn apply_core_conflict(&mut self, hit: &CanonHit, episode_number: u32) {
        let core = &mut self.core_conflict;

        if core.value != hit.value {
            if core.status == CanonStatus::Locked {
                tracing::debug!(
                    proposed = %hit.value,
                    "ignoring hit against locked core conflict"
                );
                return;
            }
            core.value = hit.value.clone();
            core.status = CanonStatus::Tentative;
            core.evidence.clear();
        }

        core.touch(episode_number, &hit.evidence);
    }
}

/// Apply a batch of hits to a copy of `profile`'s flexible canon.
///
/// The input profile is left untouched; locked canon and version are carried
/// over unchanged.
pub fn apply_canon_hits(
    profile: &StoryProfile,
    hits: &[CanonHit],
    episode_number: u32,
) -> StoryProfile {
    let mut updated = profile.clone();
    for hit in hits {
        updated.canon.flexible.apply_hit(hit, episode_number);
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::ContentRating;

    fn profile() -> StoryProfile {
        StoryProfile::initial("fantasy", ContentRating::Pg13, "en")
    }

    fn hit(category: CanonCategory, value: &str, evidence: &str) -> CanonHit {
        CanonHit {
            category,
            value: value.to_string(),
            evidence: evidence.to_string(),
        }
    }

    #[test]
    fn test_duplicate_evidence_counted_once() {
        let mut item = FlexibleCanonItem::tentative("mentor");
        item.touch(2, "guides Aylin");
        item.touch(2, "guides Aylin");
        assert_eq!(item.evidence, vec!["episode:2 guides Aylin"]);
        assert_eq!(item.distinct_evidence(), 1);
        assert_eq!(item.status, CanonStatus::Tentative);
    }

    #[test]
    fn test_same_text_different_episode_is_distinct() {
        let mut item = FlexibleCanonItem::tentative("mentor");
        item.touch(2, "guides Aylin");
        item.touch(3, "guides Aylin");
        assert_eq!(item.distinct_evidence(), 2);
        assert_eq!(item.status, CanonStatus::Confirmed);
    }

    #[test]
    fn test_promotion_never_skips() {
        let mut item = FlexibleCanonItem::tentative("rival");
        assert!(!item.touch(1, "a"));
        assert_eq!(item.status, CanonStatus::Tentative);
        assert!(item.touch(2, "b"));
        assert_eq!(item.status, CanonStatus::Confirmed);
        assert!(item.touch(3, "c"));
        assert_eq!(item.status, CanonStatus::Locked);
        assert!(!item.touch(4, "d"));
        assert_eq!(item.status, CanonStatus::Locked);
    }

    #[test]
    fn test_tentative_with_preexisting_evidence_steps_once() {
        // A document carrying three pieces of evidence but still tentative
        // moves to confirmed, not straight to locked.
        let mut item = FlexibleCanonItem {
            value: "rival".to_string(),
            status: CanonStatus::Tentative,
            evidence: vec!["episode:1 a".to_string(), "episode:2 b".to_string()],
        };
        item.touch(3, "c");
        assert_eq!(item.status, CanonStatus::Confirmed);
        item.touch(3, "c");
        assert_eq!(item.status, CanonStatus::Locked);
    }

    #[test]
    fn test_duplicate_raw_evidence_does_not_promote() {
        let mut item = FlexibleCanonItem {
            value: "rival".to_string(),
            status: CanonStatus::Tentative,
            evidence: vec!["episode:1 a".to_string(), "episode:1 a".to_string()],
        };
        item.touch(1, "a");
        assert_eq!(item.status, CanonStatus::Tentative);
    }

    #[test]
    fn test_new_list_item_created() {
        let base = profile();
        let updated = apply_canon_hits(
            &base,
            &[hit(CanonCategory::LocationsSeed, "Lighthouse", "storm shelter")],
            2,
        );
        let item = updated
            .canon
            .flexible
            .locations_seed
            .iter()
            .find(|i| i.value == "Lighthouse")
            .unwrap();
        assert_eq!(item.status, CanonStatus::Tentative);
        assert_eq!(item.evidence, vec!["episode:2 storm shelter"]);
        assert_eq!(updated.canon.flexible.locations_seed.len(), 3);
    }

    #[test]
    fn test_input_profile_not_mutated() {
        let base = profile();
        let before = base.clone();
        let _ = apply_canon_hits(
            &base,
            &[
                hit(CanonCategory::SupportingRoles, "mentor", "x"),
                hit(CanonCategory::CoreConflict, "Escape the city", "y"),
            ],
            2,
        );
        assert_eq!(base, before);
    }

    #[test]
    fn test_core_conflict_replacement_resets() {
        let mut base = profile();
        base.canon.flexible.core_conflict.status = CanonStatus::Confirmed;
        base.canon.flexible.core_conflict.evidence =
            vec!["episode:1 a".to_string(), "episode:2 b".to_string()];

        let updated = apply_canon_hits(
            &base,
            &[hit(CanonCategory::CoreConflict, "Escape the city", "gates sealed")],
            3,
        );
        let core = &updated.canon.flexible.core_conflict;
        assert_eq!(core.value, "Escape the city");
        assert_eq!(core.status, CanonStatus::Tentative);
        assert_eq!(core.evidence, vec!["episode:3 gates sealed"]);
    }

    #[test]
    fn test_locked_core_conflict_ignores_other_values() {
        let mut base = profile();
        base.canon.flexible.core_conflict.status = CanonStatus::Locked;
        base.canon.flexible.core_conflict.evidence = vec![
            "episode:1 a".to_string(),
            "episode:2 b".to_string(),
            "episode:3 c".to_string(),
        ];

        let updated = apply_canon_hits(
            &base,
            &[hit(CanonCategory::CoreConflict, "Escape the city", "gates sealed")],
            4,
        );
        assert_eq!(updated.canon.flexible.core_conflict, base.canon.flexible.core_conflict);

        let updated = apply_canon_hits(
            &base,
            &[hit(CanonCategory::CoreConflict, "Find a lost relic", "relic glimpsed")],
            4,
        );
        let core = &updated.canon.flexible.core_conflict;
        assert_eq!(core.status, CanonStatus::Locked);
        assert_eq!(core.evidence.len(), 4);
    }

    #[test]
    fn test_matching_core_conflict_accumulates() {
        let base = profile();
        let hits = [
            hit(CanonCategory::CoreConflict, "Find a lost relic", "clue one"),
            hit(CanonCategory::CoreConflict, "Find a lost relic", "clue two"),
        ];
        let updated = apply_canon_hits(&base, &hits, 2);
        assert_eq!(
            updated.canon.flexible.core_conflict.status,
            CanonStatus::Confirmed
        );
    }

    #[test]
    fn test_locked_canon_untouched() {
        let base = profile();
        let updated = apply_canon_hits(
            &base,
            &[hit(CanonCategory::KeyItemsOrSecrets, "A silver key", "found")],
            2,
        );
        assert_eq!(updated.canon.locked, base.canon.locked);
        assert_eq!(updated.version, base.version);
    }

    #[test]
    fn test_category_serde_names() {
        let parsed: CanonHit = serde_json::from_value(serde_json::json!({
            "category": "key_items_or_secrets",
            "value": "A silver key",
            "evidence": "found under the pier"
        }))
        .unwrap();
        assert_eq!(parsed.category, CanonCategory::KeyItemsOrSecrets);
        assert_eq!(parsed.category.name(), "key_items_or_secrets");
    }
}
