//! In-memory table set shared by the store implementations.

use super::{
    EpisodeCommit, FinalizationCommit, ProfileRow, SessionRow, StoreError, StoryCreation,
    StoryInputRow, StoryRow, UserRow,
};
use crate::continuity::{self, ContinuityNote};
use crate::episode::Episode;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Every table the engine reads or writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tables {
    pub users: Vec<UserRow>,
    pub story_book_inputs: Vec<StoryInputRow>,
    pub stories: Vec<StoryRow>,
    pub story_profiles: Vec<ProfileRow>,
    pub episodes: Vec<Episode>,
    pub continuity_notes: Vec<ContinuityNote>,
    pub sessions: Vec<SessionRow>,
}

impl Tables {
    pub fn upsert_user(&mut self, user: UserRow) {
        match self.users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user,
            None => self.users.push(user),
        }
    }

    pub fn insert_story_input(&mut self, input: StoryInputRow) {
        self.story_book_inputs.push(input);
    }

    pub fn apply_story_creation(&mut self, creation: StoryCreation) -> Result<(), StoreError> {
        let story_id = creation.story.id;
        if self.stories.iter().any(|s| s.id == story_id) {
            return Err(StoreError::Constraint(format!("story {story_id} already exists")));
        }
        if creation.profile.story_id != story_id
            || creation.episode.story_id != story_id
            || creation.session.story_id != story_id
            || creation.notes.iter().any(|n| n.story_id != story_id)
        {
            return Err(StoreError::Constraint(
                "story creation rows reference different stories".to_string(),
            ));
        }
        if self.sessions.iter().any(|s| s.id == creation.session.id) {
            return Err(StoreError::Constraint(format!(
                "session {} already exists",
                creation.session.id
            )));
        }

        if continuity::active_keys(&creation.notes).len()
            != creation.notes.iter().filter(|n| n.is_active()).count()
        {
            return Err(StoreError::Constraint(
                "duplicate active continuity note keys".to_string(),
            ));
        }

        self.stories.push(creation.story);
        self.story_profiles.push(creation.profile);
        self.continuity_notes.extend(creation.notes);
        self.episodes.push(creation.episode);
        self.sessions.push(creation.session);
        Ok(())
    }

    pub fn apply_episode(&mut self, commit: EpisodeCommit) -> Result<(), StoreError> {
        let episode = &commit.episode;
        if !self.stories.iter().any(|s| s.id == episode.story_id) {
            return Err(StoreError::NotFound(format!("story {}", episode.story_id)));
        }
        if self
            .episodes
            .iter()
            .any(|e| e.story_id == episode.story_id && e.episode_number == episode.episode_number)
        {
            return Err(StoreError::Conflict(format!(
                "episode {} of story {} already exists",
                episode.episode_number, episode.story_id
            )));
        }

        let session_index = match commit.session {
            Some(advance) => {
                let index = self
                    .sessions
                    .iter()
                    .position(|s| s.id == advance.session_id)
                    .ok_or_else(|| {
                        StoreError::NotFound(format!("session {}", advance.session_id))
                    })?;
                let session = &self.sessions[index];
                if session.story_id != episode.story_id {
                    return Err(StoreError::Constraint(format!(
                        "session {} belongs to another story",
                        session.id
                    )));
                }
                if session.version != advance.expected_version {
                    return Err(StoreError::Conflict(format!(
                        "session {} moved from version {} to {}",
                        session.id, advance.expected_version, session.version
                    )));
                }
                Some((index, advance.episode_number))
            }
            None => None,
        };

        self.episodes.push(commit.episode);
        if let Some((index, episode_number)) = session_index {
            let session = &mut self.sessions[index];
            session.current_episode_number = episode_number;
            session.version += 1;
            session.updated_at = Utc::now();
        }
        Ok(())
    }

    pub fn apply_finalization(&mut self, commit: FinalizationCommit) -> Result<(), StoreError> {
        let story_id = commit.story_id;
        if commit.profile.story_id != story_id {
            return Err(StoreError::Constraint(
                "profile row references a different story".to_string(),
            ));
        }
        let latest = self
            .latest_profile(story_id)
            .map(|p| p.version)
            .ok_or_else(|| StoreError::NotFound(format!("profile of story {story_id}")))?;
        if commit.profile.version != latest + 1 {
            return Err(StoreError::Conflict(format!(
                "profile version {} of story {story_id} does not follow latest version {latest}",
                commit.profile.version
            )));
        }

        let index = self
            .episodes
            .iter()
            .position(|e| e.id == commit.episode_id)
            .ok_or_else(|| StoreError::NotFound(format!("episode {}", commit.episode_id)))?;
        if self.episodes[index].story_id != story_id {
            return Err(StoreError::Constraint(format!(
                "episode {} belongs to another story",
                commit.episode_id
            )));
        }
        if self.episodes[index].is_finalized() {
            return Err(StoreError::Conflict(format!(
                "episode {} is already finalized",
                commit.episode_id
            )));
        }

        let mut active: std::collections::HashSet<String> = self
            .continuity_notes
            .iter()
            .filter(|n| n.story_id == story_id && n.is_active())
            .map(|n| n.key.clone())
            .collect();
        let notes: Vec<ContinuityNote> = commit
            .notes
            .into_iter()
            .filter(|n| n.story_id == story_id && (!n.is_active() || active.insert(n.key.clone())))
            .collect();

        self.story_profiles.push(commit.profile);
        let episode = &mut self.episodes[index];
        episode.recap = Some(commit.recap);
        episode.state_snapshot = commit.state_snapshot;
        self.continuity_notes.extend(notes);
        Ok(())
    }

    pub fn story(&self, story_id: Uuid) -> Option<&StoryRow> {
        self.stories.iter().find(|s| s.id == story_id)
    }

    pub fn profile(&self, story_id: Uuid, version: u32) -> Option<&ProfileRow> {
        self.story_profiles
            .iter()
            .find(|p| p.story_id == story_id && p.version == version)
    }

    pub fn latest_profile(&self, story_id: Uuid) -> Option<&ProfileRow> {
        self.story_profiles
            .iter()
            .filter(|p| p.story_id == story_id)
            .max_by_key(|p| p.version)
    }

    pub fn episode(&self, episode_id: Uuid) -> Option<&Episode> {
        self.episodes.iter().find(|e| e.id == episode_id)
    }

    pub fn episodes(&self, story_id: Uuid) -> Vec<Episode> {
        let mut episodes: Vec<Episode> = self
            .episodes
            .iter()
            .filter(|e| e.story_id == story_id)
            .cloned()
            .collect();
        episodes.sort_by_key(|e| e.episode_number);
        episodes
    }

    pub fn continuity_notes(&self, story_id: Uuid) -> Vec<ContinuityNote> {
        self.continuity_notes
            .iter()
            .filter(|n| n.story_id == story_id)
            .cloned()
            .collect()
    }

    pub fn session(&self, session_id: Uuid) -> Option<&SessionRow> {
        self.sessions.iter().find(|s| s.id == session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::{Choice, ChoiceId, Recap, RiskLevel};
    use crate::profile::{ContentRating, StoryProfile};
    use crate::state::StateSnapshot;
    use crate::store::{SessionAdvance, StoryStatus};

    fn episode(story_id: Uuid, number: u32) -> Episode {
        let choice = |id| Choice {
            choice_id: id,
            text: "go".to_string(),
            intent: "move".to_string(),
            risk_level: RiskLevel::Medium,
            leads_to: "onward".to_string(),
        };
        Episode {
            id: Uuid::new_v4(),
            story_id,
            episode_number: number,
            title: format!("Episode {number}"),
            text: "text".to_string(),
            choices: vec![choice(ChoiceId::A), choice(ChoiceId::B)],
            recap: None,
            state_snapshot: StateSnapshot::default(),
        }
    }

    fn seeded() -> (Tables, Uuid, Uuid, Uuid) {
        let mut tables = Tables::default();
        let story_id = Uuid::new_v4();
        let profile = StoryProfile::initial("fantasy", ContentRating::Pg, "en");
        let first = episode(story_id, 1);
        let first_id = first.id;
        let session_id = Uuid::new_v4();
        tables
            .apply_story_creation(StoryCreation {
                story: StoryRow {
                    id: story_id,
                    title: "T".to_string(),
                    logline: "L".to_string(),
                    genre: "fantasy".to_string(),
                    content_rating: ContentRating::Pg,
                    status: StoryStatus::Active,
                    created_at: Utc::now(),
                },
                notes: continuity::world_rule_notes(story_id, &profile.canon.locked.world_rules),
                profile: ProfileRow::new(story_id, profile),
                episode: first,
                session: SessionRow {
                    id: session_id,
                    user_id: "user-1".to_string(),
                    story_id,
                    current_episode_number: 1,
                    version: 0,
                    updated_at: Utc::now(),
                },
            })
            .unwrap();
        (tables, story_id, first_id, session_id)
    }

    #[test]
    fn test_story_creation_writes_everything() {
        let (tables, story_id, _, session_id) = seeded();
        assert!(tables.story(story_id).is_some());
        assert_eq!(tables.latest_profile(story_id).unwrap().version, 1);
        assert_eq!(tables.continuity_notes(story_id).len(), 2);
        assert_eq!(tables.episodes(story_id).len(), 1);
        assert_eq!(tables.session(session_id).unwrap().current_episode_number, 1);
    }

    #[test]
    fn test_session_token_guards_episode_commit() {
        let (mut tables, story_id, _, session_id) = seeded();
        let advance = SessionAdvance {
            session_id,
            expected_version: 0,
            episode_number: 2,
        };
        tables
            .apply_episode(EpisodeCommit {
                episode: episode(story_id, 2),
                session: Some(advance),
            })
            .unwrap();
        let session = tables.session(session_id).unwrap();
        assert_eq!(session.current_episode_number, 2);
        assert_eq!(session.version, 1);

        // A second transition prepared against the old token is refused and
        // leaves no episode behind.
        let err = tables
            .apply_episode(EpisodeCommit {
                episode: episode(story_id, 3),
                session: Some(SessionAdvance {
                    episode_number: 3,
                    ..advance
                }),
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(tables.episodes(story_id).len(), 2);
    }

    #[test]
    fn test_duplicate_episode_number_conflicts() {
        let (mut tables, story_id, _, _) = seeded();
        let err = tables
            .apply_episode(EpisodeCommit {
                episode: episode(story_id, 1),
                session: None,
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn test_finalization_appends_and_sets_recap_once() {
        let (mut tables, story_id, episode_id, _) = seeded();
        let mut next = tables.latest_profile(story_id).unwrap().profile.clone();
        next.version = 2;

        let commit = FinalizationCommit {
            story_id,
            episode_id,
            profile: ProfileRow::new(story_id, next.clone()),
            recap: Recap {
                summary_bullets: vec!["a".to_string()],
                open_threads: vec![],
            },
            state_snapshot: StateSnapshot::default(),
            notes: vec![
                ContinuityNote::active(story_id, "world_rule_1", "changed", 1),
                ContinuityNote::active(story_id, "bell", "cracked", 1),
            ],
        };
        tables.apply_finalization(commit.clone()).unwrap();

        assert_eq!(tables.latest_profile(story_id).unwrap().version, 2);
        assert_eq!(tables.profile(story_id, 1).unwrap().version, 1);
        assert!(tables.episode(episode_id).unwrap().is_finalized());
        let notes = tables.continuity_notes(story_id);
        assert_eq!(notes.len(), 3);
        assert!(notes.iter().any(|n| n.key == "world_rule_1" && n.value != "changed"));

        // Same version again: conflict, nothing changes.
        let before = tables.clone();
        let err = tables.apply_finalization(commit).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(tables, before);
    }

    #[test]
    fn test_finalization_of_finalized_episode_conflicts() {
        let (mut tables, story_id, episode_id, _) = seeded();
        let mut profile = tables.latest_profile(story_id).unwrap().profile.clone();
        let recap = Recap {
            summary_bullets: vec![],
            open_threads: vec![],
        };
        profile.version = 2;
        tables
            .apply_finalization(FinalizationCommit {
                story_id,
                episode_id,
                profile: ProfileRow::new(story_id, profile.clone()),
                recap: recap.clone(),
                state_snapshot: StateSnapshot::default(),
                notes: vec![],
            })
            .unwrap();

        profile.version = 3;
        let err = tables
            .apply_finalization(FinalizationCommit {
                story_id,
                episode_id,
                profile: ProfileRow::new(story_id, profile),
                recap,
                state_snapshot: StateSnapshot::default(),
                notes: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(tables.profile(story_id, 3).is_none());
    }

    #[test]
    fn test_finalization_must_follow_latest_version() {
        let (mut tables, story_id, episode_id, _) = seeded();
        let mut profile = tables.latest_profile(story_id).unwrap().profile.clone();
        profile.version = 42;

        let before = tables.clone();
        let err = tables
            .apply_finalization(FinalizationCommit {
                story_id,
                episode_id,
                profile: ProfileRow::new(story_id, profile),
                recap: Recap {
                    summary_bullets: vec![],
                    open_threads: vec![],
                },
                state_snapshot: StateSnapshot::default(),
                notes: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(tables, before);
    }
}
