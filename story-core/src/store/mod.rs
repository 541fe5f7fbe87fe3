//! Persistent store boundary.
//!
//! The engine never writes rows one at a time. Each flow hands the store a
//! single commit that is checked in full before anything is written, so a
//! failed transition leaves no partial state behind.
//!
//! Two implementations ship with the crate:
//! - [`MemoryStore`] for tests and embedding
//! - [`FileStore`], a single JSON document on disk

mod file;
mod memory;
mod tables;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use tables::Tables;

use crate::continuity::ContinuityNote;
use crate::episode::{Episode, Recap};
use crate::profile::{ContentRating, StoryProfile};
use crate::state::StateSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A concurrent transition got there first.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    pub id: String,
    pub is_anonymous: bool,
    pub app_lang: String,
}

/// Onboarding answers. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryInputRow {
    pub id: Uuid,
    pub user_id: String,
    pub genres: Vec<String>,
    pub content_rating: ContentRating,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryRow {
    pub id: Uuid,
    pub title: String,
    pub logline: String,
    pub genre: String,
    pub content_rating: ContentRating,
    pub status: StoryStatus,
    pub created_at: DateTime<Utc>,
}

/// One stored profile version. Rows are never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRow {
    pub id: Uuid,
    pub story_id: Uuid,
    pub version: u32,
    pub profile: StoryProfile,
    pub created_at: DateTime<Utc>,
}

impl ProfileRow {
    pub fn new(story_id: Uuid, profile: StoryProfile) -> Self {
        Self {
            id: Uuid::new_v4(),
            story_id,
            version: profile.version,
            profile,
            created_at: Utc::now(),
        }
    }
}

/// A reader's position in a story.
///
/// `version` is the ownership token: every accepted transition bumps it, and
/// a transition prepared against an older token is refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: Uuid,
    pub user_id: String,
    pub story_id: Uuid,
    pub current_episode_number: u32,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Commits
// ============================================================================

/// Everything written when a story is created.
#[derive(Debug, Clone)]
pub struct StoryCreation {
    pub story: StoryRow,
    pub profile: ProfileRow,
    pub notes: Vec<ContinuityNote>,
    pub episode: Episode,
    pub session: SessionRow,
}

/// Move a session forward, guarded by the token read before generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionAdvance {
    pub session_id: Uuid,
    pub expected_version: u64,
    pub episode_number: u32,
}

/// A newly accepted episode.
#[derive(Debug, Clone)]
pub struct EpisodeCommit {
    pub episode: Episode,
    pub session: Option<SessionAdvance>,
}

/// Everything written when an episode is finalized.
#[derive(Debug, Clone)]
pub struct FinalizationCommit {
    pub story_id: Uuid,
    pub episode_id: Uuid,
    pub profile: ProfileRow,
    pub recap: Recap,
    pub state_snapshot: StateSnapshot,
    /// Notes whose key is already active are skipped, not overwritten.
    pub notes: Vec<ContinuityNote>,
}

/// Persistence operations used by the engine.
#[async_trait]
pub trait StoryStore: Send + Sync {
    async fn upsert_user(&self, user: UserRow) -> Result<(), StoreError>;

    async fn insert_story_input(&self, input: StoryInputRow) -> Result<(), StoreError>;

    /// Story, profile v1, seeded notes, episode 1 and session, all or nothing.
    async fn commit_story_creation(&self, creation: StoryCreation) -> Result<(), StoreError>;

    /// Insert an episode and optionally advance its session, all or nothing.
    async fn commit_episode(&self, commit: EpisodeCommit) -> Result<(), StoreError>;

    /// Append the next profile version, write recap and snapshot onto the
    /// episode and insert new notes, all or nothing.
    async fn commit_finalization(&self, commit: FinalizationCommit) -> Result<(), StoreError>;

    async fn story(&self, story_id: Uuid) -> Result<Option<StoryRow>, StoreError>;

    async fn profile(&self, story_id: Uuid, version: u32) -> Result<Option<ProfileRow>, StoreError>;

    async fn latest_profile(&self, story_id: Uuid) -> Result<Option<ProfileRow>, StoreError>;

    async fn episode(&self, episode_id: Uuid) -> Result<Option<Episode>, StoreError>;

    async fn episodes(&self, story_id: Uuid) -> Result<Vec<Episode>, StoreError>;

    async fn continuity_notes(&self, story_id: Uuid) -> Result<Vec<ContinuityNote>, StoreError>;

    async fn session(&self, session_id: Uuid) -> Result<Option<SessionRow>, StoreError>;
}

#[async_trait]
impl<T: StoryStore + ?Sized> StoryStore for Arc<T> {
    async fn upsert_user(&self, user: UserRow) -> Result<(), StoreError> {
        (**self).upsert_user(user).await
    }

    async fn insert_story_input(&self, input: StoryInputRow) -> Result<(), StoreError> {
        (**self).insert_story_input(input).await
    }

    async fn commit_story_creation(&self, creation: StoryCreation) -> Result<(), StoreError> {
        (**self).commit_story_creation(creation).await
    }

    async fn commit_episode(&self, commit: EpisodeCommit) -> Result<(), StoreError> {
        (**self).commit_episode(commit).await
    }

    async fn commit_finalization(&self, commit: FinalizationCommit) -> Result<(), StoreError> {
        (**self).commit_finalization(commit).await
    }

    async fn story(&self, story_id: Uuid) -> Result<Option<StoryRow>, StoreError> {
        (**self).story(story_id).await
    }

    async fn profile(
        &self,
        story_id: Uuid,
        version: u32,
    ) -> Result<Option<ProfileRow>, StoreError> {
        (**self).profile(story_id, version).await
    }

    async fn latest_profile(&self, story_id: Uuid) -> Result<Option<ProfileRow>, StoreError> {
        (**self).latest_profile(story_id).await
    }

    async fn episode(&self, episode_id: Uuid) -> Result<Option<Episode>, StoreError> {
        (**self).episode(episode_id).await
    }

    async fn episodes(&self, story_id: Uuid) -> Result<Vec<Episode>, StoreError> {
        (**self).episodes(story_id).await
    }

    async fn continuity_notes(&self, story_id: Uuid) -> Result<Vec<ContinuityNote>, StoreError> {
        (**self).continuity_notes(story_id).await
    }

    async fn session(&self, session_id: Uuid) -> Result<Option<SessionRow>, StoreError> {
        (**self).session(session_id).await
    }
}
