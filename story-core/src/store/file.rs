//! Single-document JSON store.
//!
//! The whole table set lives in one pretty-printed JSON file. Every commit
//! loads the file, applies the change and writes a temporary sibling that is
//! renamed over the previous file, so readers never observe a half-written file.

use super::{
    EpisodeCommit, FinalizationCommit, ProfileRow, SessionRow, StoreError, StoryCreation,
    StoryInputRow, StoryRow, StoryStore, Tables, UserRow,
};
use crate::continuity::ContinuityNote;
use crate::episode::Episode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Current store file version.
const STORE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    saved_at: String,
    tables: Tables,
}

/// Store backed by one JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    /// Open a store at `path`. The file is created on first commit.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all tables. A missing file is an empty store.
    pub async fn load(&self) -> Result<Tables, StoreError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Tables::default()),
            Err(e) => return Err(e.into()),
        };
        let file: StoreFile = serde_json::from_str(&content)?;

        if file.version != STORE_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: STORE_VERSION,
                found: file.version,
            });
        }

        Ok(file.tables)
    }

    async fn save(&self, tables: Tables) -> Result<(), StoreError> {
        let file = StoreFile {
            version: STORE_VERSION,
            saved_at: chrono::Utc::now().to_rfc3339(),
            tables,
        };
        let content = serde_json::to_string_pretty(&file)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    async fn apply<F>(&self, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Tables) -> Result<(), StoreError>,
    {
        let _guard = self.lock.lock().await;
        let mut tables = self.load().await?;
        f(&mut tables)?;
        self.save(tables).await
    }

    async fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> Result<T, StoreError> {
        let _guard = self.lock.lock().await;
        let tables = self.load().await?;
        Ok(f(&tables))
    }
}

#[async_trait]
impl StoryStore for FileStore {
    async fn upsert_user(&self, user: UserRow) -> Result<(), StoreError> {
        self.apply(|t| {
            t.upsert_user(user);
            Ok(())
        })
        .await
    }

    async fn insert_story_input(&self, input: StoryInputRow) -> Result<(), StoreError> {
        self.apply(|t| {
            t.insert_story_input(input);
            Ok(())
        })
        .await
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
        self.read(|t| t.story(story_id).cloned()).await
    }

    async fn profile(
        &self,
        story_id: Uuid,
        version: u32,
    ) -> Result<Option<ProfileRow>, StoreError> {
        self.read(|t| t.profile(story_id, version).cloned()).await
    }

    async fn latest_profile(&self, story_id: Uuid) -> Result<Option<ProfileRow>, StoreError> {
        self.read(|t| t.latest_profile(story_id).cloned()).await
    }

    async fn episode(&self, episode_id: Uuid) -> Result<Option<Episode>, StoreError> {
        self.read(|t| t.episode(episode_id).cloned()).await
    }

    async fn episodes(&self, story_id: Uuid) -> Result<Vec<Episode>, StoreError> {
        self.read(|t| t.episodes(story_id)).await
    }

    async fn continuity_notes(&self, story_id: Uuid) -> Result<Vec<ContinuityNote>, StoreError> {
        self.read(|t| t.continuity_notes(story_id)).await
    }

    async fn session(&self, session_id: Uuid) -> Result<Option<SessionRow>, StoreError> {
        self.read(|t| t.session(session_id).cloned()).await
    }
}
