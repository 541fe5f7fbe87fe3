//! Headless story engine driver.
//!
//! Reads one request document, runs it against a JSON file store and prints
//! a `{ "status", "body" }` reply to stdout:
//!
//! ```bash
//! storyteller create create.json --store stories.json
//! storyteller generate next.json
//! RUST_LOG=story_core=debug storyteller finalize finalize.json
//! ```

mod args;

use args::{Command, Operation};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use story_core::{
    EngineConfig, EngineError, ErrorBody, FileStore, StoryEngine, StoryStore, StructuredGenerator,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize)]
struct Reply {
    status: u16,
    body: Value,
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    dotenvy::dotenv().ok();
    init_logging();

    let argv: Vec<String> = std::env::args().collect();
    let command = match args::parse(&argv, std::env::var("STORY_STORE").ok()) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("Error: {message}");
            eprintln!();
            args::print_help();
            std::process::exit(2);
        }
    };

    let (operation, request, store) = match command {
        Command::Help => {
            args::print_help();
            return;
        }
        Command::Run {
            operation,
            request,
            store,
        } => (operation, request, store),
    };

    tracing::info!(?operation, store = %store.display(), "starting");

    let reply = match openai::OpenAi::from_env() {
        Ok(client) => {
            let engine = StoryEngine::new(client, FileStore::new(store), EngineConfig::from_env());
            run(&engine, operation, &request).await
        }
        Err(e) => Err(EngineError::provider("Failed to create OpenAI client", e)),
    };

    let (reply, code) = match reply {
        Ok(body) => (
            Reply {
                status: operation.success_status(),
                body,
            },
            0,
        ),
        Err(err) => {
            tracing::error!(kind = ?err.kind(), "{err}");
            (
                Reply {
                    status: err.status_code(),
                    body: serde_json::to_value(ErrorBody::from(&err)).unwrap_or(Value::Null),
                },
                1,
            )
        }
    };

    match serde_json::to_string_pretty(&reply) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("Error: failed to render reply: {e}"),
    }
    std::process::exit(code);
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Read the request, run the operation and serialize its response.
async fn run<G, S>(
    engine: &StoryEngine<G, S>,
    operation: Operation,
    request: &Path,
) -> Result<Value, EngineError>
where
    G: StructuredGenerator,
    S: StoryStore,
{
    let document = read_request(request).await?;
    let response = match operation {
        Operation::Create => to_value(engine.create_story(parse(document)?).await?),
        Operation::Generate => to_value(engine.generate_episode(parse(document)?).await?),
        Operation::Finalize => to_value(engine.finalize_episode(parse(document)?).await?),
    };
    Ok(response)
}

async fn read_request(path: &Path) -> Result<Value, EngineError> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| EngineError::InputValidation {
        message: format!("Cannot read request file {}", path.display()),
        details: vec![e.to_string()],
    })?;
    serde_json::from_str(&text).map_err(|e| EngineError::InputValidation {
        message: "Invalid JSON body".to_string(),
        details: vec![e.to_string()],
    })
}

fn parse<T: serde::de::DeserializeOwned>(document: Value) -> Result<T, EngineError> {
    serde_json::from_value(document).map_err(|e| EngineError::InputValidation {
        message: "Invalid request".to_string(),
        details: vec![e.to_string()],
    })
}

fn to_value<T: Serialize>(response: T) -> Value {
    serde_json::to_value(response).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use story_core::testing::story_create_output;
    use story_core::{ErrorKind, ScriptedGenerator};

    #[tokio::test]
    async fn test_run_create_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let request = dir.path().join("create.json");
        tokio::fs::write(
            &request,
            json!({
                "genre": "fantasy",
                "content_rating": "PG",
                "app_lang": "en",
                "user_id": "cli-user"
            })
            .to_string(),
        )
        .await
        .unwrap();

        let engine = StoryEngine::new(
            ScriptedGenerator::new(vec![story_create_output()]),
            FileStore::new(dir.path().join("stories.json")),
            EngineConfig::default(),
        );
        let body = run(&engine, Operation::Create, &request).await.unwrap();
        assert_eq!(body["story"]["title"], "The Lantern Tide");
        assert_eq!(body["episode_1"]["episode_number"], 1);
        assert!(dir.path().join("stories.json").exists());
    }

    #[tokio::test]
    async fn test_run_reports_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let request = dir.path().join("broken.json");
        tokio::fs::write(&request, "{ not json").await.unwrap();

        let engine = StoryEngine::new(
            ScriptedGenerator::default(),
            FileStore::new(dir.path().join("stories.json")),
            EngineConfig::default(),
        );
        let err = run(&engine, Operation::Generate, &request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputValidation);
        assert_eq!(err.status_code(), 400);

        let err = run(&engine, Operation::Finalize, &dir.path().join("missing.json"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }
}
