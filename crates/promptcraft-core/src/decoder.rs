//! Splits an output artifact into passing and failing providers.

use std::collections::BTreeMap;

use promptcraft_types::{Assertion, OutputDocument, ProviderResult};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct FailingProvider {
	pub id: String,
	pub result: ProviderResult,
}

/// Provider outcomes in artifact order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPartition {
	pub passing: Vec<String>,
	pub failing: Vec<FailingProvider>,
}

impl ResultPartition {
	pub fn all_passed(&self) -> bool {
		self.failing.is_empty()
	}

	pub fn total(&self) -> usize {
		self.passing.len() + self.failing.len()
	}
}

pub fn partition(doc: &OutputDocument) -> ResultPartition {
	let mut partition = ResultPartition::default();
	for result in &doc.results {
		let id = result.provider_id();
		if result.success {
			partition.passing.push(id);
		} else {
			partition.failing.push(FailingProvider { id, result: result.clone() });
		}
	}
	partition
}

/// One assertion the engine marked as failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentFailure {
	pub assertion: Assertion,
	pub score: Option<f64>,
	pub reason: Option<String>,
	pub named_scores: BTreeMap<String, Value>,
}

/// Failed component results of a provider, in assertion order.
pub fn component_failures(result: &ProviderResult) -> Vec<ComponentFailure> {
	result
		.component_results()
		.iter()
		.filter(|c| !c.pass)
		.map(|c| ComponentFailure {
			assertion: c.assertion.clone().unwrap_or_else(|| Assertion {
				kind: Default::default(),
				value: None,
				threshold: None,
			}),
			score: c.score,
			reason: c.reason.clone().filter(|r| !r.trim().is_empty()),
			named_scores: c.named_scores.clone(),
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use promptcraft_types::AssertionKind;
	use serde_json::json;

	#[test]
	fn test_partition_by_success() {
		let doc = OutputDocument::from_value(json!({
			"results": { "results": [
				{ "provider": { "id": "openai:gpt-4o" }, "success": true },
				{ "provider": { "id": "anthropic:claude" }, "success": false, "error": "boom" }
			] }
		}))
		.unwrap();

		let partition = partition(&doc);
		assert_eq!(partition.passing, vec!["openai:gpt-4o".to_string()]);
		assert_eq!(partition.failing.len(), 1);
		assert_eq!(partition.failing[0].id, "anthropic:claude");
		assert_eq!(partition.failing[0].result.error_text().as_deref(), Some("boom"));
		assert!(!partition.all_passed());
		assert_eq!(partition.total(), 2);
	}

	#[test]
	fn test_empty_document_passes() {
		let partition = partition(&OutputDocument::empty());
		assert!(partition.all_passed());
		assert_eq!(partition.total(), 0);
	}

	#[test]
	fn test_component_failures_keep_order() {
		let result = ProviderResult::from_value(json!({
			"gradingResult": { "componentResults": [
				{ "pass": false, "score": 0, "assertion": { "type": "contains", "value": "a" } },
				{ "pass": true, "score": 1, "assertion": { "type": "regex", "value": "b" } },
				{ "pass": false, "score": 0.3, "reason": "too rude",
				  "namedScores": { "tone": 0.1 },
				  "assertion": { "type": "llm-rubric", "value": "be kind", "threshold": 0.5 } },
				{ "pass": false }
			] }
		}))
		.unwrap();

		let failures = component_failures(&result);
		let kinds: Vec<_> = failures.iter().map(|f| f.assertion.kind.clone()).collect();
		assert_eq!(
			kinds,
			vec![
				AssertionKind::Contains,
				AssertionKind::Rubric,
				AssertionKind::Other("unknown".to_string()),
			]
		);
		assert_eq!(failures[1].reason.as_deref(), Some("too rude"));
		assert_eq!(failures[1].named_scores.get("tone"), Some(&json!(0.1)));
		assert_eq!(failures[1].assertion.threshold, Some(0.5));
	}
}
