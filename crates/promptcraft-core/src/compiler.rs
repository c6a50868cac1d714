//! Compiles expectations, variables and providers into the engine's
//! configuration document. Pure: no I/O happens here.

use std::path::Path;

use promptcraft_types::{Assertion, EvaluationConfig, ProviderSpec, TestCaseConfig, Vars};
use serde_yaml::{Mapping, Value};

use crate::error::{PromptcraftError, Result};
use crate::script::FENCE_STRIP_EXPR;

/// Provider config key carrying the force-JSON response transform.
pub const TRANSFORM_KEY: &str = "transformResponse";

pub fn build_config(
	prompt: &str,
	vars: &Mapping,
	providers: &[ProviderSpec],
	assertions: &[Assertion],
	output_path: &Path,
	force_json: bool,
) -> EvaluationConfig {
	let providers = providers
		.iter()
		.map(|p| normalize_provider(p, force_json))
		.collect();

	EvaluationConfig {
		prompts: vec![prompt.to_string()],
		providers,
		tests: vec![TestCaseConfig {
			vars: normalize_vars(vars),
			assert: assertions.to_vec(),
		}],
		output_path: output_path.to_path_buf(),
	}
}

pub fn normalize_vars(vars: &Mapping) -> Vars {
	vars.iter()
		.map(|(k, v)| (key_string(k), stringify_keys(v)))
		.collect()
}

/// Stringifies a structured provider's config keys and, under force-JSON,
/// adds the fence-stripping transform. Bare ids cannot carry config and
/// pass through unchanged.
pub fn normalize_provider(provider: &ProviderSpec, force_json: bool) -> ProviderSpec {
	match provider {
		ProviderSpec::Id(id) => ProviderSpec::Id(id.clone()),
		ProviderSpec::Structured { id, config } => {
			let mut config = stringify_mapping(config);
			if force_json {
				config.insert(Value::from(TRANSFORM_KEY), Value::from(FENCE_STRIP_EXPR));
			}
			ProviderSpec::Structured { id: id.clone(), config }
		}
	}
}

/// Reads a provider entry from loosely-typed YAML: a string id, or a mapping
/// with a string `id` and an optional `config` mapping. Any other shape is
/// rejected.
pub fn parse_provider(value: Value) -> Result<ProviderSpec> {
	match value {
		Value::String(id) => Ok(ProviderSpec::Id(id)),
		Value::Mapping(mut entry) => {
			let id = match entry.remove("id") {
				Some(Value::String(id)) => id,
				other => {
					return Err(PromptcraftError::UnsupportedProvider {
						description: format!("provider mapping needs a string `id`, got {:?}", other),
					})
				}
			};
			let config = match entry.remove("config") {
				None | Some(Value::Null) => Mapping::new(),
				Some(Value::Mapping(config)) => config,
				Some(other) => {
					return Err(PromptcraftError::UnsupportedProvider {
						description: format!("config of provider '{}' must be a mapping, got {:?}", id, other),
					})
				}
			};
			Ok(ProviderSpec::Structured { id, config })
		}
		other => Err(PromptcraftError::UnsupportedProvider {
			description: format!("expected a string or a mapping, got {:?}", other),
		}),
	}
}

fn stringify_mapping(mapping: &Mapping) -> Mapping {
	mapping
		.iter()
		.map(|(k, v)| (Value::String(key_string(k)), stringify_keys(v)))
		.collect()
}

fn stringify_keys(value: &Value) -> Value {
	match value {
		Value::Mapping(mapping) => Value::Mapping(stringify_mapping(mapping)),
		Value::Sequence(items) => Value::Sequence(items.iter().map(stringify_keys).collect()),
		Value::Tagged(tagged) => {
			let mut tagged = tagged.clone();
			tagged.value = stringify_keys(&tagged.value);
			Value::Tagged(tagged)
		}
		other => other.clone(),
	}
}

fn key_string(key: &Value) -> String {
	match key {
		Value::String(s) => s.clone(),
		Value::Number(n) => n.to_string(),
		Value::Bool(b) => b.to_string(),
		Value::Null => "null".to_string(),
		other => serde_yaml::to_string(other)
			.map(|s| s.trim_end().to_string())
			.unwrap_or_default(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::Expectations;
	use promptcraft_types::AssertionKind;

	fn mapping(yaml: &str) -> Mapping {
		serde_yaml::from_str(yaml).unwrap()
	}

	#[test]
	fn test_force_json_injects_transform() {
		let provider = ProviderSpec::structured("anthropic:x", mapping("temperature: 0.5"));

		let forced = normalize_provider(&provider, true);
		let config = forced.config().unwrap();
		assert_eq!(config.get("temperature"), Some(&Value::from(0.5)));
		assert_eq!(config.get(TRANSFORM_KEY), Some(&Value::from(FENCE_STRIP_EXPR)));

		let plain = normalize_provider(&provider, false);
		assert_eq!(plain, provider);
		assert!(plain.config().unwrap().get(TRANSFORM_KEY).is_none());
	}

	#[test]
	fn test_bare_provider_untouched_under_force_json() {
		let provider = ProviderSpec::id("openai:gpt-4o-mini");
		assert_eq!(normalize_provider(&provider, true), provider);
	}

	#[test]
	fn test_nested_keys_are_stringified() {
		let provider = ProviderSpec::structured(
			"openai:gpt-4o",
			mapping("1: one\ntrue: yes\nnested:\n  - 2: two\n  - plain"),
		);
		let normalized = normalize_provider(&provider, false);
		let config = normalized.config().unwrap();
		assert!(config.keys().all(Value::is_string));
		assert_eq!(config.get("1"), Some(&Value::from("one")));
		assert_eq!(config.get("true"), Some(&Value::from("yes")));
		assert_eq!(config["nested"][0]["2"], Value::from("two"));
	}

	#[test]
	fn test_build_config_document() {
		let mut expect = Expectations::new();
		expect.includes("Hello Alice").matches("[A-Z]");

		let config = build_config(
			"Say hello to {{name}}",
			&mapping("name: Alice\n42: answer"),
			&[ProviderSpec::id("echo")],
			&expect.to_assertions(),
			Path::new("/tmp/out.json"),
			false,
		);

		assert_eq!(config.prompts, vec!["Say hello to {{name}}".to_string()]);
		assert_eq!(config.tests.len(), 1);
		let kinds: Vec<_> = config.assertions().iter().map(|a| a.kind.clone()).collect();
		assert_eq!(kinds, vec![AssertionKind::Contains, AssertionKind::Regex]);
		let keys: Vec<_> = config.tests[0].vars.keys().cloned().collect();
		assert_eq!(keys, vec!["42".to_string(), "name".to_string()]);
		assert_eq!(config.output_path, Path::new("/tmp/out.json"));
	}

	#[test]
	fn test_build_config_is_deterministic() {
		let vars = mapping("b: 2\na: 1");
		let providers = [ProviderSpec::structured("x", mapping("k: v"))];
		let first = build_config("p", &vars, &providers, &[], Path::new("o.json"), true);
		let second = build_config("p", &vars, &providers, &[], Path::new("o.json"), true);
		assert_eq!(first.to_yaml().unwrap(), second.to_yaml().unwrap());
	}

	#[test]
	fn test_parse_provider_shapes() {
		assert_eq!(
			parse_provider(Value::from("openai:gpt-4o")).unwrap(),
			ProviderSpec::id("openai:gpt-4o")
		);

		let structured = parse_provider(serde_yaml::from_str("id: anthropic:x\nconfig:\n  max_tokens: 10").unwrap()).unwrap();
		assert_eq!(structured.provider_id(), "anthropic:x");
		assert!(structured.config().unwrap().contains_key("max_tokens"));

		for bad in ["42", "[a, b]", "config: {}", "id: x\nconfig: [1]"] {
			let err = parse_provider(serde_yaml::from_str(bad).unwrap()).unwrap_err();
			assert!(matches!(err, PromptcraftError::UnsupportedProvider { .. }), "{bad}");
		}
	}
}
