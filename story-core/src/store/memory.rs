use super::{
    EpisodeCommit, FinalizationCommit, ProfileRow, SessionRow, StoreError, StoryCreation,
    StoryInputRow, StoryRow, StoryStore, Tables, UserRow,
};
use crate::continuity::ContinuityNote;
use crate::episode::Episode;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Store that keeps every table in memory.
///
/// Commits are applied to a scratch copy and swapped in only on success.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tables(tables: Tables) -> Self {
        Self {
            tables: RwLock::new(tables),
        }
    }

    /// Copy of the current tables.
    pub async fn snapshot(&self) -> Tables {
        self.tables.read().await.clone()
    }

    async fn apply<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Tables) -> Result<(), StoreError>,
    {
        let mut tables = self.tables.write().await;
        let mut scratch = tables.clone();
        f(&mut scratch)?;
        *tables = scratch;
        Ok(())
    }
}

#[async_trait]
impl StoryStore for MemoryStore {
    async fn upsert_user(&self, user: UserRow) -> Result<(), StoreError> {
        self.tables.write().await.upsert_user(user);
        Ok(())
    }

    async fn insert_story_input(&self, input: StoryInputRow) -> Result<(), StoreError> {
        self.tables.write().await.insert_story_input(input);
        Ok(())
    }

    async fn commit_story_creation(&self, creation: StoryCreation) -> Result<(), StoreError> {
        self.apply(|t| t.apply_story_creation(creation)).await
    }

    async fn commit_episode(&self, commit: EpisodeCommit) -> Result<(), StoreError> {
        self.apply(|t| t.apply_episode(commit)).await
    }

    async fn commit_finalization(&self, commit: FinalizationCommit) -> Result<(), StoreError> {
        self.apply(|t| t.apply_finalization(commit)).await
    }

    async fn story(&self, story_id: Uuid) -> Result<Option<StoryRow>, StoreError> {
        Ok(self.tables.read().await.story(story_id).cloned())
    }

    async fn profile(
        &self,
        story_id: Uuid,
        version: u32,
    ) -> Result<Option<ProfileRow>, StoreError> {
        Ok(self.tables.read().await.profile(story_id, version).cloned())
    }

    async fn latest_profile(&self, story_id: Uuid) -> Result<Option<ProfileRow>, StoreError> {
        Ok(self.tables.read().await.latest_profile(story_id).cloned())
    }

    async fn episode(&self, episode_id: Uuid) -> Result<Option<Episode>, StoreError> {
        Ok(self.tables.read().await.episode(episode_id).cloned())
    }

    async fn episodes(&self, story_id: Uuid) -> Result<Vec<Episode>, StoreError> {
        Ok(self.tables.read().await.episodes(story_id))
    }

    async fn continuity_notes(&self, story_id: Uuid) -> Result<Vec<ContinuityNote>, StoreError> {
        Ok(self.tables.read().await.continuity_notes(story_id))
    }

    async fn session(&self, session_id: Uuid) -> Result<Option<SessionRow>, StoreError> {
        Ok(self.tables.read().await.session(session_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_upsert_user_replaces() {
        let store = MemoryStore::new();
        for lang in ["en", "tr"] {
            store
                .upsert_user(UserRow {
                    id: "u1".to_string(),
                    is_anonymous: true,
                    app_lang: lang.to_string(),
                })
                .await
                .unwrap();
        }
        let tables = store.snapshot().await;
        assert_eq!(tables.users.len(), 1);
        assert_eq!(tables.users[0].app_lang, "tr");
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_tables_untouched() {
        let store = MemoryStore::new();
        let before = store.snapshot().await;
        let err = store
            .commit_finalization(FinalizationCommit {
                story_id: Uuid::new_v4(),
                episode_id: Uuid::new_v4(),
                profile: ProfileRow {
                    id: Uuid::new_v4(),
                    story_id: Uuid::nil(),
                    version: 2,
                    profile: crate::profile::StoryProfile::initial(
                        "fantasy",
                        crate::profile::ContentRating::Pg,
                        "en",
                    ),
                    created_at: Utc::now(),
                },
                recap: crate::episode::Recap {
                    summary_bullets: vec![],
                    open_threads: vec![],
                },
                state_snapshot: Default::default(),
                notes: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        assert_eq!(store.snapshot().await, before);
    }
}
