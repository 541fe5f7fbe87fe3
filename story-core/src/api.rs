//! Request and response types for the three engine operations.
//!
//! Requests arrive as loosely-typed JSON: every field is optional on the wire
//! and [`CreateStoryRequest::validate`] and friends turn them into checked
//! inputs, reporting every missing field at once.

use crate::continuity::{ContinuityNote, NoteView};
use crate::episode::{ChoiceId, Episode, EpisodeDraft, FinalizerOutput, Recap};
use crate::error::EngineError;
use crate::profile::{ContentRating, StoryProfile};
use crate::store::{ProfileRow, SessionRow, StoryRow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The reader's pick from the previous episode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserChoice {
    pub choice_id: ChoiceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecentRecaps {
    #[serde(default)]
    pub last_episode: Option<Recap>,
    #[serde(default)]
    pub last_3_episodes_summaries: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedContext {
    #[serde(default)]
    pub snippets: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_words: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_words: Option<u32>,
}

fn missing(message: &str, fields: Vec<&str>) -> Result<(), EngineError> {
    if fields.is_empty() {
        return Ok(());
    }
    Err(EngineError::InputValidation {
        message: format!("{message}: {}", fields.join(", ")),
        details: fields.iter().map(|f| format!("{f} is required")).collect(),
    })
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

// ============================================================================
// create_story
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateStoryRequest {
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub content_rating: Option<String>,
    #[serde(default)]
    pub app_lang: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_anonymous: Option<bool>,
}

/// Checked input for story creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateStoryInput {
    pub genre: String,
    pub content_rating: ContentRating,
    pub app_lang: String,
    pub user_id: String,
    pub is_anonymous: bool,
}

impl CreateStoryRequest {
    pub fn validate(self) -> Result<CreateStoryInput, EngineError> {
        let mut absent = Vec::new();
        if !present(&self.genre) {
            absent.push("genre");
        }
        if !present(&self.content_rating) {
            absent.push("content_rating");
        }
        if !present(&self.app_lang) {
            absent.push("app_lang");
        }
        if !present(&self.user_id) {
            absent.push("user_id");
        }
        missing("Missing required fields", absent)?;

        let content_rating = self.content_rating.unwrap_or_default().parse()?;
        Ok(CreateStoryInput {
            genre: self.genre.unwrap_or_default(),
            content_rating,
            app_lang: self.app_lang.unwrap_or_default(),
            user_id: self.user_id.unwrap_or_default(),
            is_anonymous: self.is_anonymous.unwrap_or(true),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateStoryResponse {
    pub story: StoryRow,
    pub story_profile: ProfileRow,
    pub continuity_notes: Vec<ContinuityNote>,
    pub episode_1: Episode,
    pub session: SessionRow,
}

// ============================================================================
// generate_episode
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateEpisodeRequest {
    #[serde(default)]
    pub story_id: Option<Uuid>,
    #[serde(default)]
    pub episode_number: Option<u32>,
    #[serde(default)]
    pub user_choice: Option<UserChoice>,
    #[serde(default)]
    pub story_profile: Option<Value>,
    /// Falls back to the stored notes when absent.
    #[serde(default)]
    pub continuity_notes: Option<Vec<NoteView>>,
    #[serde(default)]
    pub recent_recaps: Option<RecentRecaps>,
    #[serde(default)]
    pub retrieved_context: Option<RetrievedContext>,
    #[serde(default)]
    pub segment_goal: Option<String>,
    #[serde(default)]
    pub length_target: Option<LengthTarget>,
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

/// Checked input for episode generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateEpisodeInput {
    pub story_id: Uuid,
    pub episode_number: u32,
    pub user_choice: UserChoice,
    pub story_profile: StoryProfile,
    pub continuity_notes: Option<Vec<NoteView>>,
    pub recent_recaps: RecentRecaps,
    pub retrieved_context: RetrievedContext,
    pub segment_goal: Option<String>,
    pub length_target: LengthTarget,
    pub session_id: Option<Uuid>,
}

impl GenerateEpisodeRequest {
    pub fn validate(self) -> Result<GenerateEpisodeInput, EngineError> {
        let mut absent = Vec::new();
        if self.story_id.is_none() {
            absent.push("story_id");
        }
        if self.episode_number.unwrap_or(0) == 0 {
            absent.push("episode_number");
        }
        if self.user_choice.is_none() {
            absent.push("user_choice");
        }
        if self.story_profile.is_none() {
            absent.push("story_profile");
        }
        missing("Missing required fields", absent)?;

        let (Some(story_id), Some(episode_number), Some(user_choice), Some(document)) = (
            self.story_id,
            self.episode_number,
            self.user_choice,
            self.story_profile,
        ) else {
            return Err(EngineError::input("Missing required fields"));
        };

        Ok(GenerateEpisodeInput {
            story_id,
            episode_number,
            user_choice,
            story_profile: StoryProfile::from_document(&document)?,
            continuity_notes: self.continuity_notes,
            recent_recaps: self.recent_recaps.unwrap_or_default(),
            retrieved_context: self.retrieved_context.unwrap_or_default(),
            segment_goal: self.segment_goal,
            length_target: self.length_target.unwrap_or_default(),
            session_id: self.session_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateEpisodeResponse {
    pub episode: Episode,
    pub output: EpisodeDraft,
    /// Model calls spent, repairs included.
    pub attempts: u32,
}

// ============================================================================
// finalize_episode
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FinalizeEpisodeRequest {
    #[serde(default)]
    pub story_id: Option<Uuid>,
    #[serde(default)]
    pub episode_id: Option<Uuid>,
    #[serde(default)]
    pub episode_number: Option<u32>,
    #[serde(default)]
    pub episode_text: Option<String>,
    #[serde(default)]
    pub story_profile: Option<Value>,
    #[serde(default)]
    pub continuity_notes: Option<Vec<NoteView>>,
}

/// Checked input for episode finalization.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeEpisodeInput {
    pub story_id: Uuid,
    pub episode_id: Uuid,
    pub episode_number: u32,
    pub episode_text: String,
    pub story_profile: StoryProfile,
    pub continuity_notes: Option<Vec<NoteView>>,
}

impl FinalizeEpisodeRequest {
    pub fn validate(self) -> Result<FinalizeEpisodeInput, EngineError> {
        let mut absent = Vec::new();
        if self.story_id.is_none() {
            absent.push("story_id");
        }
        if self.episode_id.is_none() {
            absent.push("episode_id");
        }
        if self.episode_number.unwrap_or(0) == 0 {
            absent.push("episode_number");
        }
        if !present(&self.episode_text) {
            absent.push("episode_text");
        }
        if self.story_profile.is_none() {
            absent.push("story_profile");
        }
        missing("Missing required fields", absent)?;

        let (
            Some(story_id),
            Some(episode_id),
            Some(episode_number),
            Some(episode_text),
            Some(document),
        ) = (
            self.story_id,
            self.episode_id,
            self.episode_number,
            self.episode_text,
            self.story_profile,
        ) else {
            return Err(EngineError::input("Missing required fields"));
        };

        Ok(FinalizeEpisodeInput {
            story_id,
            episode_id,
            episode_number,
            episode_text,
            story_profile: StoryProfile::from_document(&document)?,
            continuity_notes: self.continuity_notes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizeEpisodeResponse {
    pub recap: FinalizerOutput,
    pub story_profile: ProfileRow,
}
