use promptcraft_types::{Assertion, DEFAULT_RUBRIC_THRESHOLD};
use regex::Regex;
use serde_json::Value;

use crate::script::json_key_predicate;

/// Anything that can hand over regex source text.
///
/// The engine compiles the pattern itself, so only the source is kept.
pub trait PatternSource {
    fn source(&self) -> &str;
}

impl PatternSource for str {
    fn source(&self) -> &str {
        self
    }
}

impl PatternSource for String {
    fn source(&self) -> &str {
        self
    }
}

impl PatternSource for Regex {
    fn source(&self) -> &str {
        self.as_str()
    }
}

/// Ordered list of expectations for one prompt evaluation.
///
/// ```
/// use promptcraft_core::Expectations;
///
/// let mut expect = Expectations::new();
/// expect.includes("Hello Alice").matches("[A-Z]");
/// assert_eq!(expect.to_assertions().len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Expectations {
    assertions: Vec<Assertion>,
    force_json: bool,
}

impl Expectations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Output contains `text` verbatim.
    pub fn includes(&mut self, text: impl Into<String>) -> &mut Self {
        self.push(Assertion::contains(text))
    }

    /// Output matches the regex `pattern`.
    pub fn matches<P: PatternSource + ?Sized>(&mut self, pattern: &P) -> &mut Self {
        self.push(Assertion::regex(pattern.source()))
    }

    pub fn equals(&mut self, expected: impl Into<Value>) -> &mut Self {
        self.push(Assertion::equals(expected))
    }

    /// Output parses as JSON and `output[key] === value`.
    ///
    /// Outside force-JSON mode this also records an `is-json` check ahead of
    /// the predicate. Call [`force_json`](Self::force_json) first if the
    /// response arrives wrapped in markdown fences.
    pub fn json_includes(&mut self, key: impl AsRef<str>, value: impl Into<Value>) -> &mut Self {
        if !self.force_json {
            self.push(Assertion::is_json());
        }
        let script = json_key_predicate(key.as_ref(), &value.into(), self.force_json);
        self.push(Assertion::script(script))
    }

    /// Raw script predicate evaluated by the engine.
    pub fn javascript(&mut self, code: impl Into<String>) -> &mut Self {
        self.push(Assertion::script(code))
    }

    /// Judge-scored criteria with the default threshold of 0.5.
    pub fn rubric(&mut self, criteria: impl Into<String>) -> &mut Self {
        self.rubric_with_threshold(criteria, DEFAULT_RUBRIC_THRESHOLD)
    }

    pub fn rubric_with_threshold(&mut self, criteria: impl Into<String>, threshold: f64) -> &mut Self {
        self.push(Assertion::rubric(criteria, threshold))
    }

    /// Tolerate fenced JSON: later `json_includes` calls strip fences and
    /// skip `is-json`, and structured providers get a response transform.
    pub fn force_json(&mut self) -> &mut Self {
        self.force_json = true;
        self
    }

    pub fn is_force_json(&self) -> bool {
        self.force_json
    }

    pub fn assertions(&self) -> &[Assertion] {
        &self.assertions
    }

    pub fn to_assertions(&self) -> Vec<Assertion> {
        self.assertions.clone()
    }

    fn push(&mut self, assertion: Assertion) -> &mut Self {
        self.assertions.push(assertion);
        self
    }
}
