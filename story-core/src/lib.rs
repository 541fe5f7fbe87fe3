//! Narrative continuity and structured generation engine.
//!
//! This crate provides:
//! - Schema-constrained episode generation with bounded repair
//! - A rating-tiered content safety policy
//! - Evidence-based evolution of flexible canon
//! - Versioned story profiles and a continuity ledger
//! - A store boundary with in-memory and JSON-file implementations
//!
//! # Quick Start
//!
//! ```ignore
//! use story_core::{CreateStoryRequest, EngineConfig, FileStore, StoryEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = StoryEngine::new(
//!         openai::OpenAi::from_env()?,
//!         FileStore::new("stories.json"),
//!         EngineConfig::from_env(),
//!     );
//!
//!     let created = engine
//!         .create_story(CreateStoryRequest {
//!             genre: Some("fantasy".into()),
//!             content_rating: Some("PG-13".into()),
//!             app_lang: Some("en".into()),
//!             user_id: Some("reader-1".into()),
//!             is_anonymous: Some(true),
//!         })
//!         .await?;
//!     println!("{}", created.episode_1.text);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod canon;
pub mod config;
pub mod continuity;
pub mod episode;
pub mod error;
pub mod generation;
pub mod orchestrator;
pub mod profile;
pub mod prompts;
pub mod safety;
pub mod schema;
pub mod state;
pub mod store;
pub mod testing;

// Primary public API
pub use api::{
    CreateStoryRequest, CreateStoryResponse, FinalizeEpisodeRequest, FinalizeEpisodeResponse,
    GenerateEpisodeRequest, GenerateEpisodeResponse,
};
pub use config::{EngineConfig, GenerationSettings};
pub use error::{EngineError, ErrorBody, ErrorKind};
pub use generation::StructuredGenerator;
pub use orchestrator::{AttemptState, StoryEngine};
pub use profile::{ContentRating, StoryProfile};
pub use store::{FileStore, MemoryStore, StoreError, StoryStore};
pub use testing::ScriptedGenerator;
