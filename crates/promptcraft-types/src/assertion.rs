use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Minimum judge score a rubric assertion needs when none is given.
pub const DEFAULT_RUBRIC_THRESHOLD: f64 = 0.5;

/// Assertion type tag as the engine spells it on the wire.
///
/// Tags the engine reports back that this crate never emits decode to
/// [`AssertionKind::Other`] so reports can still name them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AssertionKind {
	Contains,
	Regex,
	Equals,
	IsJson,
	ScriptPredicate,
	Rubric,
	Other(String),
}

impl AssertionKind {
	pub fn as_str(&self) -> &str {
		match self {
			AssertionKind::Contains => "contains",
			AssertionKind::Regex => "regex",
			AssertionKind::Equals => "equals",
			AssertionKind::IsJson => "is-json",
			AssertionKind::ScriptPredicate => "javascript",
			AssertionKind::Rubric => "llm-rubric",
			AssertionKind::Other(tag) => tag,
		}
	}
}

impl Default for AssertionKind {
	fn default() -> Self {
		AssertionKind::Other("unknown".to_string())
	}
}

impl From<String> for AssertionKind {
	fn from(tag: String) -> Self {
		match tag.as_str() {
			"contains" => AssertionKind::Contains,
			"regex" => AssertionKind::Regex,
			"equals" => AssertionKind::Equals,
			"is-json" => AssertionKind::IsJson,
			"javascript" => AssertionKind::ScriptPredicate,
			"llm-rubric" => AssertionKind::Rubric,
			_ => AssertionKind::Other(tag),
		}
	}
}

impl From<AssertionKind> for String {
	fn from(kind: AssertionKind) -> Self {
		kind.as_str().to_string()
	}
}

impl fmt::Display for AssertionKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One expectation in the order it was declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
	#[serde(rename = "type", default)]
	pub kind: AssertionKind,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub threshold: Option<f64>,
}

impl Assertion {
	fn new(kind: AssertionKind, value: Option<Value>) -> Self {
		Self { kind, value, threshold: None }
	}

	pub fn contains(text: impl Into<String>) -> Self {
		Self::new(AssertionKind::Contains, Some(Value::String(text.into())))
	}

	pub fn regex(source: impl Into<String>) -> Self {
		Self::new(AssertionKind::Regex, Some(Value::String(source.into())))
	}

	pub fn equals(expected: impl Into<Value>) -> Self {
		Self::new(AssertionKind::Equals, Some(expected.into()))
	}

	pub fn is_json() -> Self {
		Self::new(AssertionKind::IsJson, None)
	}

	pub fn script(code: impl Into<String>) -> Self {
		Self::new(AssertionKind::ScriptPredicate, Some(Value::String(code.into())))
	}

	pub fn rubric(criteria: impl Into<String>, threshold: f64) -> Self {
		Self {
			kind: AssertionKind::Rubric,
			value: Some(Value::String(criteria.into())),
			threshold: Some(threshold),
		}
	}

	/// The value as display text: strings verbatim, anything else as JSON.
	pub fn value_text(&self) -> Option<String> {
		match &self.value {
			None | Some(Value::Null) => None,
			Some(Value::String(s)) => Some(s.clone()),
			Some(other) => Some(other.to_string()),
		}
	}
}
