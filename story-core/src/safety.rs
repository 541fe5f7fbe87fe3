//! Content safety policy for generated episodes.
//!
//! Two layers are checked against the full generated corpus:
//! - Hard-forbidden topics from the locked canon, enforced at every rating.
//! - Rating-tiered patterns: explicit sexual content and graphic violence
//!   are violations at PG and PG-13; graphic torture is a violation at every
//!   tier; instructive self-harm is additionally checked at ADULT.

use crate::profile::ContentRating;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which layer of the policy produced a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    HardForbiddenTopic,
    Rating,
}

/// A single policy violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub description: String,
}

impl Violation {
    fn topic(topic: &str) -> Self {
        Self {
            kind: ViolationKind::HardForbiddenTopic,
            description: format!("Hard forbidden topic: {topic}"),
        }
    }

    fn rating(what: &str) -> Self {
        Self {
            kind: ViolationKind::Rating,
            description: format!("Rating violation: {what}"),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Case-insensitive patterns, any one of which counts as a match.
struct PatternSet(Vec<Regex>);

impl PatternSet {
    fn new(patterns: &[&str]) -> Self {
        Self(
            patterns
                .iter()
                .map(|p| {
                    RegexBuilder::new(p)
                        .case_insensitive(true)
                        .build()
                        .expect("static safety pattern")
                })
                .collect(),
        )
    }

    fn matches(&self, text: &str) -> bool {
        self.0.iter().any(|re| re.is_match(text))
    }
}

lazy_static::lazy_static! {
    static ref HATE: PatternSet = PatternSet::new(&[r"\bhate speech\b", r"\bhate crime\b"]);
    static ref SEXUAL_VIOLENCE: PatternSet = PatternSet::new(&[
        r"\bsexual violence\b",
        r"\brape\b",
        r"\bsexual assault\b",
    ]);
    static ref SELF_HARM: PatternSet = PatternSet::new(&[
        r"\bself[- ]?harm\b",
        r"\bsuicide\b",
        r"\bkill myself\b",
    ]);
    static ref SELF_HARM_TERMS: PatternSet =
        PatternSet::new(&[r"\bself[- ]?harm\b", r"\bsuicide\b"]);
    static ref INSTRUCTIVE: PatternSet = PatternSet::new(&[r"how to", r"instructions"]);
    static ref EXPLICIT_SEX: PatternSet = PatternSet::new(&[
        r"\bexplicit sex\b",
        r"\berotic\b",
        r"\bnude\b",
        r"\bnudity\b",
        r"\bsexual content\b",
        r"\bsex\b",
    ]);
    static ref GRAPHIC_GORE: PatternSet = PatternSet::new(&[
        r"\bgore\b",
        r"\bentrails\b",
        r"\bdismember(?:ed|ment)?\b",
        r"\bdecapitat(?:ed|ion)\b",
        r"\bmutilat(?:ed|ion)\b",
    ]);
    static ref GRAPHIC_TORTURE: PatternSet = PatternSet::new(&[
        r"\bgraphic torture\b",
        r"\btorture\b",
        r"\bflay(?:ed|ing)?\b",
    ]);
}

/// Scan generated text for violations at the given rating.
///
/// An empty result means the content passed.
pub fn scan(text: &str, rating: ContentRating, hard_forbidden_topics: &[String]) -> Vec<Violation> {
    let mut violations = Vec::new();
    let lower = text.to_lowercase();

    for topic in hard_forbidden_topics {
        let normalized = topic.trim().to_lowercase();
        if normalized.is_empty() {
            continue;
        }
        let hit = match normalized.as_str() {
            "hate" => HATE.matches(text),
            "sexual violence" => SEXUAL_VIOLENCE.matches(text),
            "self-harm" => SELF_HARM.matches(text),
            other => lower.contains(other),
        };
        if hit {
            violations.push(Violation::topic(topic.trim()));
        }
    }

    if rating.is_restrictive() {
        if EXPLICIT_SEX.matches(text) {
            violations.push(Violation::rating("explicit sexual content"));
        }
        if GRAPHIC_GORE.matches(text) {
            violations.push(Violation::rating("graphic violence/gore"));
        }
    }

    if GRAPHIC_TORTURE.matches(text) {
        violations.push(Violation::rating("graphic torture"));
    }

    if rating == ContentRating::Adult && INSTRUCTIVE.matches(text) && SELF_HARM_TERMS.matches(text)
    {
        violations.push(Violation::rating("self-harm instructions"));
    }

    violations
}

/// Join non-empty text fragments into a single scan corpus.
pub fn corpus<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
