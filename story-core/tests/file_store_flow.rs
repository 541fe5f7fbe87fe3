//! End-to-end flow against the JSON file store.

use serde_json::json;
use story_core::testing::{episode_draft, finalizer_output, story_create_output};
use story_core::{
    CreateStoryRequest, EngineConfig, FileStore, FinalizeEpisodeRequest, ScriptedGenerator,
    StoryEngine, StoryStore,
};
use tempfile::TempDir;

#[tokio::test]
async fn test_story_survives_reopen() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("stories.json");

    let generator = ScriptedGenerator::new(vec![story_create_output()]);
    let engine = StoryEngine::new(
        generator.clone(),
        FileStore::new(&path),
        EngineConfig::default(),
    );

    let created = engine
        .create_story(CreateStoryRequest {
            genre: Some("noir".to_string()),
            content_rating: Some("ADULT".to_string()),
            app_lang: Some("tr".to_string()),
            user_id: Some("reader-7".to_string()),
            is_anonymous: Some(false),
        })
        .await
        .unwrap();
    assert_eq!(
        created.story_profile.profile.protagonist().unwrap().name,
        "Kerem"
    );
    assert!(generator.requests()[0].user.contains("Turkish"));

    generator.queue(finalizer_output(
        json!([]),
        json!([{ "key": "rain", "value": "It has not stopped raining since episode 1" }]),
    ));
    engine
        .finalize_episode(FinalizeEpisodeRequest {
            story_id: Some(created.story.id),
            episode_id: Some(created.episode_1.id),
            episode_number: Some(1),
            episode_text: Some(created.episode_1.text.clone()),
            story_profile: Some(created.story_profile.profile.to_document()),
            continuity_notes: None,
        })
        .await
        .unwrap();

    let reopened = FileStore::new(&path);
    let latest = reopened
        .latest_profile(created.story.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest.version, 2);
    assert_eq!(
        reopened.continuity_notes(created.story.id).await.unwrap().len(),
        3
    );
    let episode = reopened.episode(created.episode_1.id).await.unwrap().unwrap();
    assert!(episode.is_finalized());

    // Generation resumes from the reopened file.
    let engine = StoryEngine::new(generator.clone(), reopened, EngineConfig::default());
    generator.queue(episode_draft(&format!("{}-2", created.story.id), "Rain on the glass."));
    let response = engine
        .generate_episode(story_core::GenerateEpisodeRequest {
            story_id: Some(created.story.id),
            episode_number: Some(2),
            user_choice: Some(story_core::api::UserChoice {
                choice_id: story_core::episode::ChoiceId::B,
                text: None,
            }),
            story_profile: Some(latest.profile.to_document()),
            session_id: Some(created.session.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(response.episode.episode_number, 2);
    // The base state is the finalized v2 state.
    assert_eq!(
        response.episode.state_snapshot.open_threads,
        vec!["Who flooded the archive?"]
    );
}
