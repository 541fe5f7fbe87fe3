//! Prompt construction for creation, episode generation, repair and finalize.

use crate::api::{LengthTarget, RecentRecaps, UserChoice};
use crate::continuity::NoteView;
use crate::profile::StoryProfile;
use serde::Serialize;
use serde_json::{json, Value};

pub const CREATE_SYSTEM: &str = "You are the Story Creator. Output ONLY valid JSON matching the schema. \
Create compelling, immersive interactive fiction with rich narrative text. \
Episode text must be at least 400 words (1500+ characters).";

pub const EPISODE_SYSTEM: &str = "You are the Episode Generator. Output ONLY valid JSON that matches the provided schema. \
Use story_profile.canon.locked as immutable truth. Use continuity notes as constraints. \
Continue the story based on the user choice, keep the tone/rating, \
and end with exactly two choices (A/B).";

pub const FINALIZE_SYSTEM: &str = "You are the Episode Finalizer. Output ONLY valid JSON that matches the provided schema. \
Summarize the episode into concrete bullets, extract open threads, update state snapshot, \
list any new persistent facts, and note any flexible canon elements reinforced in this episode. \
Use the same language as the story profile.";

pub const REPAIR_INSTRUCTION: &str =
    "Repair the episode to remove the issues while keeping continuity and tone.";

fn compact<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn language_instruction(language: &str) -> &'static str {
    if language == "tr" {
        "IMPORTANT: Write ALL content in Turkish (Türkçe). The title, logline, episode text, and choices must all be in Turkish."
    } else {
        "Write all content in English."
    }
}

/// User prompt for a new story's title, logline and opening episode.
pub fn creation_prompt(profile: &StoryProfile) -> String {
    let locked = &profile.canon.locked;
    let genre = &profile.genre;
    let (name, identity, traits, motivation, fear) = match profile.protagonist() {
        Some(c) => (
            c.name.as_str(),
            c.identity.as_str(),
            compact(&c.traits),
            c.motivation.as_str(),
            c.fear.as_str(),
        ),
        None => ("", "", "[]".to_string(), "", ""),
    };

    format!(
        "You are a master storyteller creating the opening of an interactive fiction story.

GENRE: {genre}
CONTENT RATING: {rating} - {guidance}
{language}

STORY CANON (locked truths):
- World rules: {world_rules}
- Main character: {name} - {identity}
- Character traits: {traits}
- Motivation: {motivation}
- Fear: {fear}
- Narrative style: {style}
- Theme/Tone: {theme}

YOUR TASK:
1. Create an evocative, creative TITLE that captures the story's essence (not just \"{genre} Story\")
2. Write a compelling LOGLINE (1-2 sentences) that hooks readers
3. Write EPISODE 1:
   - Create an intriguing episode title
   - Write rich, immersive narrative text (400-600 words / minimum 1500 characters)
   - Start with an immediate hook (no long exposition)
   - Include vivid descriptions, character moments, and atmosphere
   - Build tension toward a decision point
   - End with exactly 2 meaningful choices (A and B)

The episode MUST be substantial - like the opening chapter of a novel, not just a few sentences.
Each choice should lead to meaningfully different story paths.",
        rating = profile.content_rating,
        guidance = profile.content_rating.guidance(),
        language = language_instruction(&profile.language),
        world_rules = compact(&locked.world_rules),
        style = compact(&locked.narrative_style),
        theme = locked.theme_tone,
    )
}

/// Everything an episode prompt is built from.
#[derive(Debug, Clone, Copy)]
pub struct EpisodeContext<'a> {
    pub profile: &'a StoryProfile,
    pub notes: &'a [NoteView],
    pub recent_recaps: &'a RecentRecaps,
    pub snippets: &'a [String],
    pub user_choice: Option<&'a UserChoice>,
    pub segment_goal: &'a str,
    pub length_target: &'a LengthTarget,
    pub episode_id: &'a str,
}

/// First-attempt prompt: labelled sections, one JSON document each.
pub fn episode_prompt(ctx: &EpisodeContext<'_>) -> String {
    let last_recap = ctx
        .recent_recaps
        .last_episode
        .as_ref()
        .map(|r| compact(r))
        .unwrap_or_else(|| "{}".to_string());

    [
        "STORY_PROFILE (LOCKED CANON)".to_string(),
        compact(&ctx.profile.canon.locked),
        "STORY_PROFILE (FLEXIBLE CANON)".to_string(),
        compact(&ctx.profile.canon.flexible),
        "CONTINUITY_NOTES".to_string(),
        compact(ctx.notes),
        "LAST_EPISODE_RECAP".to_string(),
        last_recap,
        "RECENT_SUMMARIES".to_string(),
        compact(&ctx.recent_recaps.last_3_episodes_summaries),
        "RETRIEVED_SNIPPETS".to_string(),
        compact(ctx.snippets),
        "USER_CHOICE".to_string(),
        compact(&ctx.user_choice),
        "SEGMENT_GOAL".to_string(),
        ctx.segment_goal.to_string(),
        "LENGTH_TARGET".to_string(),
        compact(ctx.length_target),
        "EPISODE_ID".to_string(),
        ctx.episode_id.to_string(),
    ]
    .join("\n")
}

/// Repair prompt: the issues, the rejected draft and the constraints again.
pub fn repair_prompt(ctx: &EpisodeContext<'_>, issues: &[String], previous: &Value) -> String {
    compact(&json!({
        "issue_summary": issues,
        "previous_output": previous,
        "story_profile": ctx.profile,
        "continuity_notes": ctx.notes,
        "user_choice": ctx.user_choice,
        "segment_goal": ctx.segment_goal,
        "instruction": REPAIR_INSTRUCTION,
    }))
}

pub fn finalize_prompt(
    profile: &StoryProfile,
    notes: &[NoteView],
    episode_text: &str,
    episode_number: u32,
) -> String {
    compact(&json!({
        "story_profile": profile,
        "continuity_notes": notes,
        "episode_text": episode_text,
        "episode_number": episode_number,
    }))
}
