//! Command line parsing.

use std::path::PathBuf;

/// Store file used when neither `--store` nor `STORY_STORE` is given.
pub const DEFAULT_STORE: &str = "stories.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Generate,
    Finalize,
}

impl Operation {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Operation::Create),
            "generate" => Some(Operation::Generate),
            "finalize" => Some(Operation::Finalize),
            _ => None,
        }
    }

    /// Status reported on success.
    pub fn success_status(&self) -> u16 {
        match self {
            Operation::Create | Operation::Generate => 201,
            Operation::Finalize => 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Run {
        operation: Operation,
        request: PathBuf,
        store: PathBuf,
    },
}

/// Parse `args` (program name first). `env_store` is the `STORY_STORE` value.
pub fn parse(args: &[String], env_store: Option<String>) -> Result<Command, String> {
    let mut positional = Vec::new();
    let mut store = env_store
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from);

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "--store" => {
                let path = args
                    .get(i + 1)
                    .ok_or_else(|| "--store needs a path".to_string())?;
                store = Some(PathBuf::from(path));
                i += 1;
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    match positional.as_slice() {
        [] => Ok(Command::Help),
        [operation, request] => {
            let operation = Operation::parse(operation)
                .ok_or_else(|| format!("unknown operation: {operation}"))?;
            Ok(Command::Run {
                operation,
                request: PathBuf::from(request),
                store: store.unwrap_or_else(|| PathBuf::from(DEFAULT_STORE)),
            })
        }
        [_] => Err("missing request file".to_string()),
        _ => Err("too many arguments".to_string()),
    }
}

pub fn print_help() {
    println!("storyteller - run one story engine operation");
    println!();
    println!("USAGE:");
    println!("  storyteller <OPERATION> <REQUEST.json> [--store <PATH>]");
    println!();
    println!("OPERATIONS:");
    println!("  create      Create a story, its profile, episode 1 and a session");
    println!("  generate    Generate and persist the next episode");
    println!("  finalize    Recap an episode and append the next profile version");
    println!();
    println!("OPTIONS:");
    println!("  --store <PATH>   JSON store file (default: $STORY_STORE or {DEFAULT_STORE})");
    println!("  -h, --help       Show this help message");
    println!();
    println!("ENVIRONMENT:");
    println!("  OPENAI_API_KEY   Provider credential (required)");
    println!("  STORY_MODEL      Model for every call (default: gpt-4o-mini)");
    println!("  RUST_LOG         Log filter (default: warn)");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("storyteller")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_run_with_default_store() {
        let command = parse(&args(&["generate", "req.json"]), None).unwrap();
        assert_eq!(
            command,
            Command::Run {
                operation: Operation::Generate,
                request: PathBuf::from("req.json"),
                store: PathBuf::from(DEFAULT_STORE),
            }
        );
    }

    #[test]
    fn test_store_flag_beats_env() {
        let command = parse(
            &args(&["finalize", "req.json", "--store", "/tmp/s.json"]),
            Some("env.json".to_string()),
        )
        .unwrap();
        let Command::Run { store, .. } = command else {
            panic!("expected run");
        };
        assert_eq!(store, PathBuf::from("/tmp/s.json"));

        let command = parse(&args(&["create", "req.json"]), Some("env.json".to_string())).unwrap();
        let Command::Run { store, .. } = command else {
            panic!("expected run");
        };
        assert_eq!(store, PathBuf::from("env.json"));
    }

    #[test]
    fn test_errors_and_help() {
        assert_eq!(parse(&args(&[]), None).unwrap(), Command::Help);
        assert_eq!(parse(&args(&["create", "-h"]), None).unwrap(), Command::Help);
        assert!(parse(&args(&["publish", "req.json"]), None).is_err());
        assert!(parse(&args(&["create"]), None).is_err());
        assert!(parse(&args(&["create", "a", "b"]), None).is_err());
        assert!(parse(&args(&["create", "a", "--store"]), None).is_err());
    }
}
