use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

use crate::assertion::Assertion;

/// Variable bindings as written into the engine configuration.
pub type Vars = BTreeMap<String, serde_yaml::Value>;

/// One LLM backend the engine should query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderSpec {
	/// Shorthand such as `openai:gpt-4o-mini`.
	Id(String),
	/// An id plus opaque provider configuration.
	Structured {
		id: String,
		#[serde(default, skip_serializing_if = "Mapping::is_empty")]
		config: Mapping,
	},
}

impl ProviderSpec {
	pub fn id(id: impl Into<String>) -> Self {
		ProviderSpec::Id(id.into())
	}

	pub fn structured(id: impl Into<String>, config: Mapping) -> Self {
		ProviderSpec::Structured { id: id.into(), config }
	}

	/// Builds a structured provider from any serializable configuration.
	/// The configuration has to serialize to a mapping.
	pub fn with_config<C: Serialize>(id: impl Into<String>, config: &C) -> Result<Self, serde_yaml::Error> {
		match serde_yaml::to_value(config)? {
			serde_yaml::Value::Mapping(config) => Ok(Self::structured(id, config)),
			other => Err(<serde_yaml::Error as serde::ser::Error>::custom(format!(
				"provider config must be a mapping, got {:?}",
				other
			))),
		}
	}

	pub fn provider_id(&self) -> &str {
		match self {
			ProviderSpec::Id(id) => id,
			ProviderSpec::Structured { id, .. } => id,
		}
	}

	pub fn config(&self) -> Option<&Mapping> {
		match self {
			ProviderSpec::Id(_) => None,
			ProviderSpec::Structured { config, .. } => Some(config),
		}
	}
}

impl From<&str> for ProviderSpec {
	fn from(id: &str) -> Self {
		ProviderSpec::id(id)
	}
}

impl From<String> for ProviderSpec {
	fn from(id: String) -> Self {
		ProviderSpec::Id(id)
	}
}

/// The single test case of an evaluation: its variables and assertions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseConfig {
	pub vars: Vars,
	pub assert: Vec<Assertion>,
}

/// Configuration document consumed by the engine for one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationConfig {
	pub prompts: Vec<String>,
	pub providers: Vec<ProviderSpec>,
	pub tests: Vec<TestCaseConfig>,
	pub output_path: PathBuf,
}

impl EvaluationConfig {
	pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
		serde_yaml::to_string(self)
	}

	/// Assertions of the (only) test case.
	pub fn assertions(&self) -> &[Assertion] {
		self.tests.first().map(|t| t.assert.as_slice()).unwrap_or(&[])
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_provider_shapes_serialize() {
		let bare = serde_yaml::to_value(ProviderSpec::id("openai:gpt-4o-mini")).unwrap();
		assert_eq!(bare, serde_yaml::Value::from("openai:gpt-4o-mini"));

		let mut config = Mapping::new();
		config.insert("temperature".into(), 0.5.into());
		let structured = serde_yaml::to_value(ProviderSpec::structured("anthropic:x", config)).unwrap();
		assert_eq!(structured["id"], serde_yaml::Value::from("anthropic:x"));
		assert_eq!(structured["config"]["temperature"], serde_yaml::Value::from(0.5));
	}

	#[test]
	fn test_with_config_requires_mapping() {
		#[derive(Serialize)]
		struct Opts {
			temperature: f64,
		}
		let spec = ProviderSpec::with_config("openai:gpt-4o", &Opts { temperature: 0.2 }).unwrap();
		assert_eq!(spec.provider_id(), "openai:gpt-4o");
		assert!(spec.config().unwrap().contains_key("temperature"));

		assert!(ProviderSpec::with_config("openai:gpt-4o", &vec![1, 2]).is_err());
	}

	#[test]
	fn test_config_yaml_top_level_keys() {
		let config = EvaluationConfig {
			prompts: vec!["Say hi".to_string()],
			providers: vec![ProviderSpec::id("echo")],
			tests: vec![TestCaseConfig { vars: Vars::new(), assert: vec![Assertion::contains("hi")] }],
			output_path: PathBuf::from("/tmp/out.json"),
		};
		let yaml: serde_yaml::Value = serde_yaml::from_str(&config.to_yaml().unwrap()).unwrap();
		for key in ["prompts", "providers", "tests", "outputPath"] {
			assert!(yaml.get(key).is_some(), "missing {key}");
		}
		assert_eq!(config.assertions().len(), 1);
	}
}
