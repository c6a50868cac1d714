//! Script snippets handed to the engine, and the parser that reads the
//! JSON-key predicate back for failure reports.
//!
//! A JSON-key predicate always has this shape:
//!
//! ```text
//! (typeof output === 'string' ? JSON.parse(<text>) : output)[<key>] === <literal>
//! ```
//!
//! `<text>` is `output`, or [`FENCE_STRIP_EXPR`] in force-JSON mode. `<key>` is
//! a JSON string literal and `<literal>` is the expected value as JSON. The
//! report recovers the original `json_includes` call from that text, so any
//! change to [`json_key_predicate`] has to keep [`JsonKeyPredicate::parse`]
//! in step.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Strips a leading ```` ``` ```` or ```` ```json ```` fence, a trailing
/// fence and surrounding whitespace from the raw output.
pub const FENCE_STRIP_EXPR: &str =
    r"output.trim().replace(/^```(?:json)?\s*/, '').replace(/\s*```$/, '').trim()";

static PREDICATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)\[\s*("(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*')\s*\]\s*===\s*(.+?)\s*$"#)
        .expect("predicate pattern is valid")
});
static LEADING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```(?:json)?\s*").expect("fence pattern is valid"));
static TRAILING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*```$").expect("fence pattern is valid"));

/// Builds the predicate checking that `output[key] === value`.
pub fn json_key_predicate(key: &str, value: &Value, force_json: bool) -> String {
    let text = if force_json { FENCE_STRIP_EXPR } else { "output" };
    let key = Value::String(key.to_string());
    format!("(typeof output === 'string' ? JSON.parse({text}) : output)[{key}] === {value}")
}

/// Same transformation as [`FENCE_STRIP_EXPR`], applied locally.
pub fn strip_code_fences(text: &str) -> String {
    let text = LEADING_FENCE.replace(text.trim(), "");
    let text = TRAILING_FENCE.replace(&text, "");
    text.trim().to_string()
}

/// Expected value recovered from a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Json(Value),
    /// Text that did not parse as JSON.
    Raw(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Json(value) => write!(f, "{}", value),
            Literal::Raw(text) => f.write_str(text),
        }
    }
}

/// A `json_includes(key, value)` call read back from its predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonKeyPredicate {
    pub key: String,
    pub expected: Literal,
    pub fenced: bool,
}

impl JsonKeyPredicate {
    /// Returns `None` when `script` is not a JSON-key predicate.
    pub fn parse(script: &str) -> Option<Self> {
        let caps = PREDICATE.captures(script)?;
        let key = unquote(caps.get(1)?.as_str());
        let literal = caps.get(2)?.as_str();
        let expected = match serde_json::from_str::<Value>(literal) {
            Ok(value) => Literal::Json(value),
            Err(_) => Literal::Raw(literal.to_string()),
        };
        Some(Self {
            key,
            expected,
            fenced: script.contains("replace(/^```"),
        })
    }

    /// Applies the predicate's parse to a real response and indexes it by
    /// key. Unparsable output yields `None`.
    pub fn actual(&self, output: Option<&Value>) -> Option<Value> {
        let parsed = match output? {
            Value::String(text) => {
                let text = if self.fenced {
                    strip_code_fences(text)
                } else {
                    text.trim().to_string()
                };
                serde_json::from_str::<Value>(&text).ok()?
            }
            other => other.clone(),
        };
        match &parsed {
            Value::Array(items) => self.key.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
            _ => parsed.get(&self.key).cloned(),
        }
    }
}

impl fmt::Display for JsonKeyPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "json_includes(key: {}, value: {})",
            Value::String(self.key.clone()),
            self.expected
        )
    }
}

fn unquote(literal: &str) -> String {
    if literal.starts_with('"') {
        if let Ok(key) = serde_json::from_str::<String>(literal) {
            return key;
        }
    }
    let inner = &literal[1..literal.len().saturating_sub(1).max(1)];
    inner.replace("\\'", "'").replace("\\\"", "\"")
}
