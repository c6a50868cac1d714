use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::assertion::Assertion;

/// Provider identity as reported in the artifact: a bare string or an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderRef {
	Id(String),
	Described {
		#[serde(default)]
		id: Option<String>,
		#[serde(default)]
		label: Option<String>,
	},
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponsePayload {
	pub output: Option<Value>,
	pub error: Option<Value>,
}

/// Treats an explicit `null` like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
	D: Deserializer<'de>,
	T: Default + Deserialize<'de>,
{
	Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Outcome of one assertion inside a provider's grading result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComponentResult {
	#[serde(deserialize_with = "null_as_default")]
	pub pass: bool,
	pub assertion: Option<Assertion>,
	pub score: Option<f64>,
	pub reason: Option<String>,
	#[serde(deserialize_with = "null_as_default")]
	pub named_scores: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GradingResult {
	pub pass: Option<bool>,
	pub score: Option<f64>,
	pub reason: Option<String>,
	#[serde(deserialize_with = "null_as_default")]
	pub component_results: Vec<ComponentResult>,
}

/// One provider's entry under `results.results`.
///
/// Every field is optional on the wire; the original JSON is kept in `raw`
/// for verbose dumps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderResult {
	pub provider: Option<ProviderRef>,
	#[serde(deserialize_with = "null_as_default")]
	pub success: bool,
	pub response: Option<ResponsePayload>,
	pub output: Option<Value>,
	pub error: Option<Value>,
	pub grading_result: Option<GradingResult>,
	#[serde(skip)]
	pub raw: Value,
}

impl ProviderResult {
	pub fn from_value(raw: Value) -> Result<Self, serde_json::Error> {
		let mut result: ProviderResult = serde_json::from_value(raw.clone())?;
		result.raw = raw;
		Ok(result)
	}

	pub fn provider_id(&self) -> String {
		match &self.provider {
			Some(ProviderRef::Id(id)) => id.clone(),
			Some(ProviderRef::Described { id: Some(id), .. }) => id.clone(),
			Some(ProviderRef::Described { label: Some(label), .. }) => label.clone(),
			_ => "unknown".to_string(),
		}
	}

	/// Response payload, preferring `response.output` over top-level `output`.
	pub fn output_value(&self) -> Option<&Value> {
		self.response
			.as_ref()
			.and_then(|r| r.output.as_ref())
			.filter(|v| !v.is_null())
			.or_else(|| self.output.as_ref().filter(|v| !v.is_null()))
	}

	/// Response payload as text; structured payloads are rendered as JSON.
	pub fn output_text(&self) -> Option<String> {
		self.output_value().map(|v| match v {
			Value::String(s) => s.clone(),
			other => other.to_string(),
		})
	}

	/// Error string from `error`, falling back to `response.error`. Empty
	/// strings count as no error.
	pub fn error_text(&self) -> Option<String> {
		let fallback = self.response.as_ref().and_then(|r| r.error.as_ref());
		[self.error.as_ref(), fallback]
			.into_iter()
			.flatten()
			.filter_map(|v| match v {
				Value::Null => None,
				Value::String(s) => Some(s.clone()),
				other => Some(other.to_string()),
			})
			.find(|s| !s.trim().is_empty())
	}

	pub fn component_results(&self) -> &[ComponentResult] {
		self.grading_result
			.as_ref()
			.map(|g| g.component_results.as_slice())
			.unwrap_or(&[])
	}

	pub fn score(&self) -> Option<f64> {
		self.grading_result.as_ref().and_then(|g| g.score)
	}
}

/// The engine's output artifact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputDocument {
	pub results: Vec<ProviderResult>,
	raw: Value,
}

impl OutputDocument {
	/// Document standing in for an artifact the engine never wrote.
	pub fn empty() -> Self {
		Self::default()
	}

	pub fn from_value(raw: Value) -> Result<Self, serde_json::Error> {
		let entries = raw
			.pointer("/results/results")
			.and_then(Value::as_array)
			.cloned()
			.unwrap_or_default();
		let results = entries
			.into_iter()
			.map(ProviderResult::from_value)
			.collect::<Result<Vec<_>, _>>()?;
		Ok(Self { results, raw })
	}

	pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
		Self::from_value(serde_json::from_str(text)?)
	}

	/// True when there was no artifact at all.
	pub fn is_empty(&self) -> bool {
		self.raw.is_null()
	}

	pub fn raw(&self) -> &Value {
		&self.raw
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_null_fields_default() {
		let doc = OutputDocument::from_value(json!({ "results": { "results": [
			{ "provider": "a", "success": null, "gradingResult": { "componentResults": null } },
			{ "provider": "b", "success": false, "gradingResult": { "componentResults": [
				{ "pass": null, "namedScores": null, "assertion": { "type": "contains", "value": "x" } }
			] } }
		] } }))
		.unwrap();
		assert_eq!(doc.results.len(), 2);
		assert!(!doc.results[0].success);
		assert!(doc.results[0].component_results().is_empty());
		let component = &doc.results[1].component_results()[0];
		assert!(!component.pass);
		assert!(component.named_scores.is_empty());
	}

	#[test]
	fn test_missing_fields_default() {
		let doc = OutputDocument::from_value(json!({ "results": { "results": [{}] } })).unwrap();
		assert_eq!(doc.results.len(), 1);
		let result = &doc.results[0];
		assert!(!result.success);
		assert_eq!(result.provider_id(), "unknown");
		assert_eq!(result.output_text(), None);
		assert_eq!(result.error_text(), None);
		assert!(result.component_results().is_empty());
	}

	#[test]
	fn test_missing_results_section() {
		let doc = OutputDocument::from_value(json!({ "version": 3 })).unwrap();
		assert!(doc.results.is_empty());
		assert!(!doc.is_empty());
		assert!(OutputDocument::empty().is_empty());
	}

	#[test]
	fn test_output_and_error_locations() {
		let result = ProviderResult::from_value(json!({
			"provider": { "id": "openai:gpt-4o", "label": "fast" },
			"response": { "output": "from response", "error": "late failure" },
			"output": "top level",
			"error": ""
		}))
		.unwrap();
		assert_eq!(result.provider_id(), "openai:gpt-4o");
		assert_eq!(result.output_text().as_deref(), Some("from response"));
		assert_eq!(result.error_text().as_deref(), Some("late failure"));
		assert_eq!(result.raw["output"], "top level");

		let top_level = ProviderResult::from_value(json!({
			"provider": "echo",
			"output": { "status": "ok" },
			"error": "rate limited"
		}))
		.unwrap();
		assert_eq!(top_level.output_text().as_deref(), Some(r#"{"status":"ok"}"#));
		assert_eq!(top_level.error_text().as_deref(), Some("rate limited"));
	}

	#[test]
	fn test_component_results() {
		let result = ProviderResult::from_value(json!({
			"success": false,
			"gradingResult": {
				"pass": false,
				"score": 0.25,
				"componentResults": [
					{ "pass": true, "score": 1, "assertion": { "type": "contains", "value": "Hi" } },
					{ "pass": false, "score": 0, "reason": "nope", "assertion": { "type": "is-json" } }
				]
			}
		}))
		.unwrap();
		assert_eq!(result.score(), Some(0.25));
		let components = result.component_results();
		assert_eq!(components.len(), 2);
		assert_eq!(components[1].reason.as_deref(), Some("nope"));
		assert_eq!(
			components[1].assertion.as_ref().map(|a| a.kind.clone()),
			Some(crate::AssertionKind::IsJson)
		);
	}
}
