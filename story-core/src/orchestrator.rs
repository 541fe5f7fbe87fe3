//! The story engine: create, generate and finalize flows.
//!
//! Every model call goes through the same pipeline:
//!
//! ```text
//! Drafted -> Validated -> Checked -> Accepted
//!                            |
//!                            +-> Repairing -> Drafted   (attempts left)
//!                            +-> Rejected               (attempts spent)
//! ```
//!
//! Schema failures stop the flow at `Validated`; they are never repaired.
//! Nothing reaches the store until a draft is accepted, and each flow ends
//! in a single store commit.

use crate::api::{
    CreateStoryRequest, CreateStoryResponse, FinalizeEpisodeRequest, FinalizeEpisodeResponse,
    GenerateEpisodeRequest, GenerateEpisodeResponse, LengthTarget, RecentRecaps,
};
use crate::canon;
use crate::config::{EngineConfig, GenerationSettings};
use crate::continuity::{self, ContinuityNote, NoteView};
use crate::episode::{self, Choice, Episode, EpisodeDraft, FinalizerOutput, StoryCreateOutput};
use crate::error::EngineError;
use crate::generation::{self, StructuredGenerator};
use crate::profile::StoryProfile;
use crate::prompts::{self, EpisodeContext};
use crate::safety;
use crate::schema::{self, definitions};
use crate::state::{self, StateSnapshot};
use crate::store::{
    EpisodeCommit, FinalizationCommit, ProfileRow, SessionAdvance, SessionRow, StoryCreation,
    StoryInputRow, StoryRow, StoryStatus, StoryStore, UserRow,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Where a single generation attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Drafted,
    Validated,
    Checked,
    Accepted,
    Repairing,
    Rejected,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptState::Drafted => "drafted",
            AttemptState::Validated => "validated",
            AttemptState::Checked => "checked",
            AttemptState::Accepted => "accepted",
            AttemptState::Repairing => "repairing",
            AttemptState::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// A model output that goes through content checks before acceptance.
trait Candidate: DeserializeOwned {
    fn choices(&self) -> &[Choice];

    /// Repairable problems: continuity warnings and safety violations.
    fn issues(&self, profile: &StoryProfile) -> Vec<String>;
}

fn safety_issues(corpus: &str, profile: &StoryProfile) -> Vec<String> {
    safety::scan(
        corpus,
        profile.content_rating,
        &profile.canon.locked.hard_forbidden_topics,
    )
    .into_iter()
    .map(|v| v.description)
    .collect()
}

impl Candidate for EpisodeDraft {
    fn choices(&self) -> &[Choice] {
        &self.choices
    }

    fn issues(&self, profile: &StoryProfile) -> Vec<String> {
        let mut issues = self.continuity_warnings();
        issues.extend(safety_issues(&self.corpus(), profile));
        issues
    }
}

impl Candidate for StoryCreateOutput {
    fn choices(&self) -> &[Choice] {
        &self.choices
    }

    fn issues(&self, profile: &StoryProfile) -> Vec<String> {
        safety_issues(&self.corpus(), profile)
    }
}

/// Fixed parameters of one kind of model call.
struct Call<'a> {
    /// Noun used in provider error context.
    label: &'static str,
    /// Name used in schema and rejection errors.
    output: &'static str,
    settings: &'a GenerationSettings,
    system: &'static str,
    schema_name: &'static str,
    schema: &'a Value,
}

/// An accepted draft and the number of model calls it took.
struct Accepted<T> {
    output: T,
    attempts: u32,
}

/// Narrative engine over an injected generator and store.
pub struct StoryEngine<G, S> {
    generator: G,
    store: S,
    config: EngineConfig,
}

impl<G: StructuredGenerator, S: StoryStore> StoryEngine<G, S> {
    pub fn new(generator: G, store: S, config: EngineConfig) -> Self {
        Self {
            generator,
            store,
            config,
        }
    }

    // ========================================================================
    // create_story
    // ========================================================================

    /// Create a story with its profile, seeded notes, opening episode and session.
    pub async fn create_story(
        &self,
        request: CreateStoryRequest,
    ) -> Result<CreateStoryResponse, EngineError> {
        let input = request.validate()?;
        let profile = StoryProfile::initial(&input.genre, input.content_rating, &input.app_lang);

        let validation = profile.validate();
        if !validation.valid {
            return Err(EngineError::OutputSchema {
                context: "Initial story profile".to_string(),
                details: validation.messages(),
            });
        }

        tracing::info!(
            genre = %input.genre,
            rating = %input.content_rating,
            lang = %input.app_lang,
            "creating story"
        );

        self.store
            .upsert_user(UserRow {
                id: input.user_id.clone(),
                is_anonymous: input.is_anonymous,
                app_lang: input.app_lang.clone(),
            })
            .await
            .map_err(|e| EngineError::store("Failed to upsert user", e))?;
        self.store
            .insert_story_input(StoryInputRow {
                id: Uuid::new_v4(),
                user_id: input.user_id.clone(),
                genres: vec![input.genre.clone()],
                content_rating: input.content_rating,
                language: input.app_lang.clone(),
                created_at: Utc::now(),
            })
            .await
            .map_err(|e| EngineError::store("Failed to store onboarding inputs", e))?;

        let story_id = Uuid::new_v4();
        let episode_id = Episode::generation_id(story_id, 1);
        let recaps = RecentRecaps::default();
        let length = LengthTarget::default();
        let ctx = EpisodeContext {
            profile: &profile,
            notes: &[],
            recent_recaps: &recaps,
            snippets: &[],
            user_choice: None,
            segment_goal: profile.segment_goal_or(None),
            length_target: &length,
            episode_id: &episode_id,
        };
        let (max_attempts, checked) = if self.config.repair_initial_episode {
            (self.config.max_attempts, true)
        } else {
            (1, false)
        };

        let call = Call {
            label: "story content",
            output: "Story content",
            settings: &self.config.create,
            system: prompts::CREATE_SYSTEM,
            schema_name: "story_create_output",
            schema: &definitions::STORY_CREATE_OUTPUT,
        };
        let accepted: Accepted<StoryCreateOutput> = self
            .draft_until_clean(
                &call,
                &profile,
                prompts::creation_prompt(&profile),
                |issues, previous| prompts::repair_prompt(&ctx, issues, previous),
                max_attempts,
                checked,
            )
            .await?;
        let content = accepted.output;

        let now = Utc::now();
        let story = StoryRow {
            id: story_id,
            title: content.title.clone(),
            logline: content.logline.clone(),
            genre: input.genre.clone(),
            content_rating: input.content_rating,
            status: StoryStatus::Active,
            created_at: now,
        };
        let notes = continuity::world_rule_notes(story_id, &profile.canon.locked.world_rules);
        let episode = Episode {
            id: Uuid::new_v4(),
            story_id,
            episode_number: 1,
            title: content.episode_title,
            text: content.episode_text,
            choices: content.choices,
            recap: None,
            state_snapshot: StateSnapshot::from(&profile.flow.dynamic_state),
        };
        let session = SessionRow {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            story_id,
            current_episode_number: 1,
            version: 0,
            updated_at: now,
        };
        let profile_row = ProfileRow::new(story_id, profile);

        let response = CreateStoryResponse {
            story: story.clone(),
            story_profile: profile_row.clone(),
            continuity_notes: notes.clone(),
            episode_1: episode.clone(),
            session: session.clone(),
        };

        self.store
            .commit_story_creation(StoryCreation {
                story,
                profile: profile_row,
                notes,
                episode,
                session,
            })
            .await
            .map_err(|e| EngineError::store("Failed to create story", e))?;

        tracing::info!(
            story_id = %story_id,
            title = %response.story.title,
            attempts = accepted.attempts,
            "story created"
        );
        Ok(response)
    }

    // ========================================================================
    // generate_episode
    // ========================================================================

    /// Generate, check and persist the next episode.
    pub async fn generate_episode(
        &self,
        request: GenerateEpisodeRequest,
    ) -> Result<GenerateEpisodeResponse, EngineError> {
        let input = request.validate()?;
        let story_id = input.story_id;
        let profile = &input.story_profile;

        self.store
            .story(story_id)
            .await
            .map_err(|e| EngineError::store("Failed to load story", e))?
            .ok_or_else(|| EngineError::input(format!("Unknown story_id: {story_id}")))?;

        // Token read before generation; the commit fails if it moved.
        let advance = match input.session_id {
            Some(session_id) => {
                let session = self
                    .store
                    .session(session_id)
                    .await
                    .map_err(|e| EngineError::store("Failed to load session", e))?
                    .ok_or_else(|| {
                        EngineError::input(format!("Unknown session_id: {session_id}"))
                    })?;
                if session.story_id != story_id {
                    return Err(EngineError::input(format!(
                        "Session {session_id} does not belong to story {story_id}"
                    )));
                }
                Some(SessionAdvance {
                    session_id,
                    expected_version: session.version,
                    episode_number: input.episode_number,
                })
            }
            None => None,
        };

        let notes = match &input.continuity_notes {
            Some(notes) => notes.clone(),
            None => self.active_note_views(story_id).await?,
        };

        let episode_id = Episode::generation_id(story_id, input.episode_number);
        let ctx = EpisodeContext {
            profile,
            notes: &notes,
            recent_recaps: &input.recent_recaps,
            snippets: &input.retrieved_context.snippets,
            user_choice: Some(&input.user_choice),
            segment_goal: profile.segment_goal_or(input.segment_goal.as_deref()),
            length_target: &input.length_target,
            episode_id: &episode_id,
        };

        tracing::info!(
            story_id = %story_id,
            episode = input.episode_number,
            choice = ?input.user_choice.choice_id,
            "generating episode"
        );

        let call = Call {
            label: "episode",
            output: "Episode output",
            settings: &self.config.episode,
            system: prompts::EPISODE_SYSTEM,
            schema_name: "episode_generate",
            schema: &definitions::EPISODE_GENERATE_OUTPUT,
        };
        let accepted: Accepted<EpisodeDraft> = self
            .draft_until_clean(
                &call,
                profile,
                prompts::episode_prompt(&ctx),
                |issues, previous| prompts::repair_prompt(&ctx, issues, previous),
                self.config.max_attempts,
                true,
            )
            .await?;
        let draft = accepted.output;

        let base = StateSnapshot::from(&profile.flow.dynamic_state);
        let episode = Episode {
            id: Uuid::new_v4(),
            story_id,
            episode_number: input.episode_number,
            title: draft.segment.title.clone(),
            text: draft.segment.text.clone(),
            choices: draft.choices.clone(),
            recap: None,
            state_snapshot: state::merge(&base, &draft.state_update),
        };

        self.store
            .commit_episode(EpisodeCommit {
                episode: episode.clone(),
                session: advance,
            })
            .await
            .map_err(|e| EngineError::store("Failed to persist episode", e))?;

        tracing::info!(
            story_id = %story_id,
            episode = input.episode_number,
            attempts = accepted.attempts,
            "episode accepted"
        );
        Ok(GenerateEpisodeResponse {
            episode,
            output: draft,
            attempts: accepted.attempts,
        })
    }

    // ========================================================================
    // finalize_episode
    // ========================================================================

    /// Recap an episode, evolve the canon and append the next profile version.
    pub async fn finalize_episode(
        &self,
        request: FinalizeEpisodeRequest,
    ) -> Result<FinalizeEpisodeResponse, EngineError> {
        let input = request.validate()?;
        let story_id = input.story_id;
        let profile = &input.story_profile;

        let episode = self
            .store
            .episode(input.episode_id)
            .await
            .map_err(|e| EngineError::store("Failed to load episode", e))?
            .ok_or_else(|| {
                EngineError::input(format!("Unknown episode_id: {}", input.episode_id))
            })?;
        if episode.story_id != story_id || episode.episode_number != input.episode_number {
            return Err(EngineError::input(format!(
                "Episode {} is not episode {} of story {story_id}",
                input.episode_id, input.episode_number
            )));
        }
        if episode.is_finalized() {
            return Err(EngineError::Conflict(format!(
                "episode {} is already finalized",
                input.episode_id
            )));
        }

        // The supplied profile must be the latest stored version, locked canon intact.
        let latest = self
            .store
            .latest_profile(story_id)
            .await
            .map_err(|e| EngineError::store("Failed to load story profile", e))?
            .ok_or_else(|| EngineError::input(format!("Unknown story_id: {story_id}")))?;
        if profile.version != latest.version {
            return Err(EngineError::Conflict(format!(
                "story profile version {} is not the latest version {}",
                profile.version, latest.version
            )));
        }
        if profile.canon.locked != latest.profile.canon.locked {
            return Err(EngineError::InputValidation {
                message: "Locked canon cannot change".to_string(),
                details: vec![format!(
                    "canon.locked differs from stored version {}",
                    latest.version
                )],
            });
        }

        let stored_notes = self
            .store
            .continuity_notes(story_id)
            .await
            .map_err(|e| EngineError::store("Failed to load continuity notes", e))?;
        let prompt_notes: Vec<NoteView> = match &input.continuity_notes {
            Some(notes) => notes.clone(),
            None => stored_notes
                .iter()
                .filter(|n| n.is_active())
                .map(NoteView::from)
                .collect(),
        };

        tracing::info!(
            story_id = %story_id,
            episode = input.episode_number,
            profile_version = profile.version,
            "finalizing episode"
        );

        let call = Call {
            label: "finalizer output",
            output: "Finalizer output",
            settings: &self.config.finalize,
            system: prompts::FINALIZE_SYSTEM,
            schema_name: "episode_finalize",
            schema: &definitions::EPISODE_FINALIZE_OUTPUT,
        };
        let user = prompts::finalize_prompt(
            profile,
            &prompt_notes,
            &input.episode_text,
            input.episode_number,
        );
        let (output, _): (FinalizerOutput, Value) = self.draft(&call, user, 1).await?;

        let next = next_profile(profile, &output, input.episode_number);
        let validation = next.validate();
        if !validation.valid {
            return Err(EngineError::OutputSchema {
                context: "Updated story profile".to_string(),
                details: validation.messages(),
            });
        }

        let notes = continuity::notes_for_new_facts(
            story_id,
            &stored_notes,
            &output.new_persistent_facts,
            input.episode_number,
        );
        let profile_row = ProfileRow::new(story_id, next);

        self.store
            .commit_finalization(FinalizationCommit {
                story_id,
                episode_id: input.episode_id,
                profile: profile_row.clone(),
                recap: output.recap(),
                state_snapshot: output.snapshot(&episode.state_snapshot),
                notes,
            })
            .await
            .map_err(|e| EngineError::store("Failed to store updated story profile", e))?;

        tracing::info!(
            story_id = %story_id,
            episode = input.episode_number,
            profile_version = profile_row.version,
            canon_hits = output.flexible_canon_hits.len(),
            new_facts = output.new_persistent_facts.len(),
            "episode finalized"
        );
        Ok(FinalizeEpisodeResponse {
            recap: output,
            story_profile: profile_row,
        })
    }

    // ========================================================================
    // Pipeline
    // ========================================================================

    async fn active_note_views(&self, story_id: Uuid) -> Result<Vec<NoteView>, EngineError> {
        let notes: Vec<ContinuityNote> = self
            .store
            .continuity_notes(story_id)
            .await
            .map_err(|e| EngineError::store("Failed to load continuity notes", e))?;
        Ok(notes
            .iter()
            .filter(|n| n.is_active())
            .map(NoteView::from)
            .collect())
    }

    /// One model call: `Drafted`, then `Validated` against the call's schema.
    async fn draft<T: DeserializeOwned>(
        &self,
        call: &Call<'_>,
        user: String,
        attempt: u32,
    ) -> Result<(T, Value), EngineError> {
        let request = generation::request(
            call.settings,
            call.system,
            user,
            call.schema_name,
            call.schema,
        );
        let raw = self.generator.generate(request).await.map_err(|e| {
            let verb = if attempt == 1 { "generate" } else { "repair" };
            EngineError::provider(format!("Failed to {verb} {}", call.label), e)
        })?;
        tracing::debug!(
            label = call.label,
            attempt,
            state = %AttemptState::Drafted,
            "draft received"
        );

        let validation = schema::validate(call.schema, &raw);
        if !validation.valid {
            tracing::warn!(
                label = call.label,
                attempt,
                errors = validation.errors.len(),
                "draft failed schema validation"
            );
            return Err(EngineError::OutputSchema {
                context: call.output.to_string(),
                details: validation.messages(),
            });
        }
        let typed = serde_json::from_value(raw.clone()).map_err(|e| EngineError::OutputSchema {
            context: call.output.to_string(),
            details: vec![e.to_string()],
        })?;
        tracing::debug!(
            label = call.label,
            attempt,
            state = %AttemptState::Validated,
            "draft validated"
        );

        Ok((typed, raw))
    }

    /// Draft, check and repair until a draft has no issues or attempts run out.
    async fn draft_until_clean<T, R>(
        &self,
        call: &Call<'_>,
        profile: &StoryProfile,
        first_prompt: String,
        repair_prompt: R,
        max_attempts: u32,
        checked: bool,
    ) -> Result<Accepted<T>, EngineError>
    where
        T: Candidate,
        R: Fn(&[String], &Value) -> String,
    {
        let max_attempts = max_attempts.max(1);
        let mut all_issues: Vec<String> = Vec::new();
        let mut prompt = first_prompt;
        let mut attempt = 1;

        loop {
            let (output, raw): (T, Value) = self.draft(call, prompt, attempt).await?;

            if !episode::choices_are_paired(output.choices()) {
                return Err(EngineError::OutputSchema {
                    context: call.output.to_string(),
                    details: vec!["choices must be exactly one A and one B".to_string()],
                });
            }

            let issues = if checked {
                output.issues(profile)
            } else {
                Vec::new()
            };
            tracing::debug!(
                label = call.label,
                attempt,
                state = %AttemptState::Checked,
                issues = issues.len(),
                "draft checked"
            );

            if issues.is_empty() {
                tracing::debug!(
                    label = call.label,
                    attempt,
                    state = %AttemptState::Accepted,
                    "draft accepted"
                );
                return Ok(Accepted {
                    output,
                    attempts: attempt,
                });
            }

            for issue in &issues {
                if !all_issues.contains(issue) {
                    all_issues.push(issue.clone());
                }
            }

            if attempt >= max_attempts {
                tracing::warn!(
                    label = call.label,
                    attempts = attempt,
                    state = %AttemptState::Rejected,
                    issues = all_issues.len(),
                    "draft rejected"
                );
                return Err(EngineError::Rejected {
                    context: call.output.to_string(),
                    issues: all_issues,
                });
            }

            tracing::warn!(
                label = call.label,
                attempt,
                state = %AttemptState::Repairing,
                issues = ?issues,
                "repairing draft"
            );
            prompt = repair_prompt(&issues, &raw);
            attempt += 1;
        }
    }
}

/// Profile version N+1: canon hits applied and the dynamic state refreshed.
fn next_profile(
    profile: &StoryProfile,
    output: &FinalizerOutput,
    episode_number: u32,
) -> StoryProfile {
    let mut next = canon::apply_canon_hits(profile, &output.flexible_canon_hits, episode_number);
    let state = &mut next.flow.dynamic_state;
    if let Some(time) = &output.state_snapshot.time {
        state.current_time = time.clone();
    }
    state.current_location_id = output.state_snapshot.location_id.clone();
    state.characters_present = output.state_snapshot.characters_present.clone();
    state.inventory = output.state_snapshot.inventory.clone();
    state.open_threads = output.open_threads.clone();
    next.version = profile.version + 1;
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::{CanonCategory, CanonHit};
    use crate::episode::ExtractedState;
    use crate::profile::{CanonStatus, ContentRating};

    #[test]
    fn test_next_profile() {
        let profile = StoryProfile::initial("fantasy", ContentRating::Pg, "en");
        let output = FinalizerOutput {
            summary_bullets: vec!["Aylin reached the bazaar".to_string()],
            open_threads: vec!["Who follows her?".to_string()],
            state_snapshot: ExtractedState {
                time: None,
                location_id: "shadow_bazaar".to_string(),
                characters_present: vec!["Aylin".to_string(), "mentor".to_string()],
                inventory: vec!["map".to_string()],
            },
            new_persistent_facts: vec![],
            flexible_canon_hits: vec![CanonHit {
                category: CanonCategory::LocationsSeed,
                value: "Shadow Bazaar".to_string(),
                evidence: "Aylin haggles under lanterns".to_string(),
            }],
        };

        let next = next_profile(&profile, &output, 2);
        assert_eq!(next.version, 2);
        assert_eq!(profile.version, 1);
        let state = &next.flow.dynamic_state;
        assert_eq!(state.current_time, "Night");
        assert_eq!(state.current_location_id, "shadow_bazaar");
        assert_eq!(state.open_threads, vec!["Who follows her?"]);
        assert_eq!(state.segment_goal, profile.flow.dynamic_state.segment_goal);
        let bazaar = &next.canon.flexible.locations_seed[1];
        assert_eq!(bazaar.evidence, vec!["episode:2 Aylin haggles under lanterns"]);
        assert_eq!(bazaar.status, CanonStatus::Tentative);
        assert_eq!(next.canon.locked, profile.canon.locked);
    }

    #[test]
    fn test_attempt_state_display() {
        assert_eq!(AttemptState::Repairing.to_string(), "repairing");
    }
}
