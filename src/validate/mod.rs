//! Acceptance checks for text returned by the agent.
//!
//! Validation happens in two stages: [`sanitize`] strips wrapping artifacts
//! (markdown code fences), then a shape-specific check decides whether the
//! cleaned text can be merged. Checks never fail with an error; they return a
//! [`Verdict`] whose rejection reason is fed back into the retry prompt.

pub mod markup;

use crate::sections::{self, Document};
use crate::util::extract_json_object;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

pub use markup::check_balanced;

static FENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```").unwrap()
});

static TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(?:/?[A-Za-z][^>]*|!--.*?--)>").unwrap());

/// Outcome of a validation check.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict<T> {
    Accepted(T),
    Rejected(String),
}

impl<T> Verdict<T> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted(_))
    }

    pub fn rejection(&self) -> Option<&str> {
        match self {
            Verdict::Accepted(_) => None,
            Verdict::Rejected(reason) => Some(reason),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Verdict<U> {
        match self {
            Verdict::Accepted(value) => Verdict::Accepted(f(value)),
            Verdict::Rejected(reason) => Verdict::Rejected(reason),
        }
    }
}

/// Shape expected from an analysis phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Json,
    Text,
}

/// Strip markdown code fences and surrounding whitespace.
///
/// When the text contains fenced blocks, their contents are kept and the
/// prose around them dropped. A dangling opening or closing fence line is
/// removed on its own. Applying `sanitize` twice gives the same result.
pub fn sanitize(raw: &str) -> String {
    let blocks: Vec<&str> = FENCE_REGEX
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim()))
        .filter(|block| !block.is_empty())
        .collect();
    if !blocks.is_empty() {
        return sanitize(&blocks.join("\n"));
    }

    let mut text = raw.trim();
    if text.starts_with("```") {
        text = match text.find('\n') {
            Some(newline) => &text[newline + 1..],
            None => "",
        };
    }
    let text = text.trim_end();
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim().to_string()
}

/// Drop prose before the first tag and after the last one, as in
/// `Here is the new hero: <section>...</section>`. Text without tags is
/// returned unchanged.
pub fn strip_prose(text: &str) -> &str {
    let mut tags = TAG_REGEX.find_iter(text);
    let Some(first) = tags.next() else {
        return text;
    };
    let end = tags.last().map_or(first.end(), |last| last.end());
    &text[first.start()..end]
}

/// Decides whether agent output may be merged.
#[derive(Debug, Clone, Default)]
pub struct ContentValidator;

impl ContentValidator {
    pub fn new() -> Self {
        Self
    }

    /// Check a single section body.
    pub fn check_body(&self, name: &str, body: &str) -> Result<(), String> {
        if body.trim().is_empty() {
            return Err(format!("section '{}' is empty", name));
        }
        if sections::contains_marker(body) {
            return Err(format!("section '{}' contains a nested section marker", name));
        }
        check_balanced(body).map_err(|e| format!("section '{}' has unbalanced markup: {}", name, e))
    }

    /// Check a response to a section regeneration or edit.
    ///
    /// The response may be a bare body, accepted only when exactly one
    /// section was requested and trimmed by [`strip_prose`], or
    /// marker-wrapped sections. Every requested
    /// section must be present; unrequested ones are ignored.
    pub fn check_sections(&self, raw: &str, expected: &[String]) -> Verdict<BTreeMap<String, String>> {
        let cleaned = sanitize(raw);
        if cleaned.is_empty() {
            return Verdict::Rejected("response was empty".to_string());
        }

        if !sections::contains_marker(&cleaned) {
            return match expected {
                [only] => {
                    let body = strip_prose(&cleaned);
                    match self.check_body(only, body) {
                        Ok(()) => Verdict::Accepted(BTreeMap::from([(
                            only.to_ascii_lowercase(),
                            body.to_string(),
                        )])),
                        Err(reason) => Verdict::Rejected(reason),
                    }
                }
                _ => Verdict::Rejected(format!(
                    "expected marker-wrapped sections for: {}",
                    expected.join(", ")
                )),
            };
        }

        let doc = match Document::parse(&cleaned) {
            Ok(doc) => doc,
            Err(e) => return Verdict::Rejected(format!("malformed section markers: {}", e)),
        };

        let mut accepted = BTreeMap::new();
        for name in expected {
            let Some(section) = doc.section(name) else {
                return Verdict::Rejected(format!("response is missing section '{}'", name));
            };
            if let Err(reason) = self.check_body(&section.name, &section.body) {
                return Verdict::Rejected(reason);
            }
            accepted.insert(section.name.clone(), section.body.clone());
        }
        Verdict::Accepted(accepted)
    }

    /// Check a complete page.
    pub fn check_document(&self, raw: &str) -> Verdict<String> {
        let cleaned = sanitize(raw);
        let lower = cleaned.to_ascii_lowercase();
        for tag in ["<html", "<head", "<body"] {
            if !lower.contains(tag) {
                return Verdict::Rejected(format!("document is missing its {}> element", tag));
            }
        }

        let doc = match Document::parse(&cleaned) {
            Ok(doc) => doc,
            Err(e) => return Verdict::Rejected(format!("malformed section markers: {}", e)),
        };
        if doc.is_empty() {
            return Verdict::Rejected(
                "document has no <!-- START: name --> / <!-- END: name --> section markers"
                    .to_string(),
            );
        }
        if let Err(e) = check_balanced(&cleaned) {
            return Verdict::Rejected(format!("document has unbalanced markup: {}", e));
        }
        Verdict::Accepted(cleaned)
    }

    /// Check the output of an analysis phase.
    pub fn check_artifact(&self, raw: &str, kind: ArtifactKind) -> Verdict<Value> {
        let cleaned = sanitize(raw);
        if cleaned.is_empty() {
            return Verdict::Rejected("response was empty".to_string());
        }
        match kind {
            ArtifactKind::Text => Verdict::Accepted(Value::String(cleaned)),
            ArtifactKind::Json => {
                let parsed = serde_json::from_str::<Value>(&cleaned).ok().or_else(|| {
                    extract_json_object(&cleaned).and_then(|obj| serde_json::from_str(obj).ok())
                });
                match parsed {
                    Some(value @ (Value::Object(_) | Value::Array(_))) => Verdict::Accepted(value),
                    _ => Verdict::Rejected("response is not a JSON object".to_string()),
                }
            }
        }
    }
}
