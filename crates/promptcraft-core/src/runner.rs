use std::path::Path;
use std::sync::Arc;

use promptcraft_types::{EvaluationConfig, OutputDocument, ProviderSpec};
use serde_yaml::{Mapping, Value};
use tracing::{debug, info, warn};

use crate::compiler;
use crate::config;
use crate::decoder::{self, ResultPartition};
use crate::error::{PromptcraftError, Result};
use crate::expectations::Expectations;
use crate::process::{parse_output, EngineRunner, ExecuteOptions, ProcessOutput, ProcessRunner};
use crate::prompt::{load_prompt, PlaceholderRenderer, PromptLocator, PromptRenderer, TestId};
use crate::report;

/// Name of the configuration file written for the engine.
pub const CONFIG_FILE_NAME: &str = "promptfooconfig.yaml";
/// Name of the artifact the engine is told to write.
pub const OUTPUT_FILE_NAME: &str = "output.json";

pub struct SuiteBuilder {
	name: String,
	providers: Vec<ProviderSpec>,
	locator: Option<Arc<dyn PromptLocator>>,
	renderer: Arc<dyn PromptRenderer>,
	runner: Arc<dyn EngineRunner>,
	verbose: bool,
}

impl SuiteBuilder {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			providers: Vec::new(),
			locator: None,
			renderer: Arc::new(PlaceholderRenderer),
			runner: Arc::new(ProcessRunner::new()),
			verbose: false,
		}
	}

	pub fn provider(mut self, provider: impl Into<ProviderSpec>) -> Self {
		self.providers.push(provider.into());
		self
	}

	/// Replaces the default providers.
	pub fn providers<I>(mut self, providers: I) -> Self
	where
		I: IntoIterator,
		I::Item: Into<ProviderSpec>,
	{
		self.providers = providers.into_iter().map(Into::into).collect();
		self
	}

	pub fn locator(mut self, locator: impl PromptLocator + 'static) -> Self {
		self.locator = Some(Arc::new(locator));
		self
	}

	pub fn renderer(mut self, renderer: impl PromptRenderer + 'static) -> Self {
		self.renderer = Arc::new(renderer);
		self
	}

	pub fn runner(mut self, runner: Arc<dyn EngineRunner>) -> Self {
		self.runner = runner;
		self
	}

	pub fn verbose(mut self, verbose: bool) -> Self {
		self.verbose = verbose;
		self
	}

	pub fn build(self) -> Suite {
		Suite {
			name: self.name,
			providers: self.providers,
			locator: self.locator,
			renderer: self.renderer,
			runner: self.runner,
			verbose: self.verbose,
		}
	}
}

/// A group of prompt tests sharing defaults.
///
/// A suite is an immutable snapshot; [`Suite::derive`] starts a builder from
/// it so a child suite can override some defaults and inherit the rest.
pub struct Suite {
	name: String,
	providers: Vec<ProviderSpec>,
	locator: Option<Arc<dyn PromptLocator>>,
	renderer: Arc<dyn PromptRenderer>,
	runner: Arc<dyn EngineRunner>,
	verbose: bool,
}

impl Suite {
	pub fn builder(name: impl Into<String>) -> SuiteBuilder {
		SuiteBuilder::new(name)
	}

	pub fn derive(&self, name: impl Into<String>) -> SuiteBuilder {
		SuiteBuilder {
			name: name.into(),
			providers: self.providers.clone(),
			locator: self.locator.clone(),
			renderer: self.renderer.clone(),
			runner: self.runner.clone(),
			verbose: self.verbose,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn providers(&self) -> &[ProviderSpec] {
		&self.providers
	}

	/// Starts an evaluation of `prompt`.
	pub fn prompt(&self, prompt: impl Into<String>) -> EvaluationRequest<'_> {
		EvaluationRequest {
			suite: self,
			prompt: prompt.into(),
			vars: Mapping::new(),
			providers: None,
			pre_render: false,
			verbose: self.verbose,
			show_output: false,
		}
	}

	/// Starts an evaluation of the prompt file the suite's locator assigns
	/// to `test_name`.
	pub fn prompt_for(&self, test_name: &str) -> Result<EvaluationRequest<'_>> {
		let locator = self.locator.as_ref().ok_or_else(|| PromptcraftError::MissingLocator {
			suite: self.name.clone(),
		})?;
		let path = locator.locate(&TestId::new(self.name.clone(), test_name));
		Ok(self.prompt(load_prompt(&path)?))
	}
}

/// One evaluation call: prompt, variables and run options.
pub struct EvaluationRequest<'a> {
	suite: &'a Suite,
	prompt: String,
	vars: Mapping,
	providers: Option<Vec<ProviderSpec>>,
	pre_render: bool,
	verbose: bool,
	show_output: bool,
}

impl<'a> EvaluationRequest<'a> {
	pub fn var(mut self, key: impl Into<Value>, value: impl Into<Value>) -> Self {
		self.vars.insert(key.into(), value.into());
		self
	}

	pub fn vars(mut self, vars: Mapping) -> Self {
		self.vars.extend(vars);
		self
	}

	/// Overrides the suite's providers for this call only.
	pub fn providers<I>(mut self, providers: I) -> Self
	where
		I: IntoIterator,
		I::Item: Into<ProviderSpec>,
	{
		self.providers = Some(providers.into_iter().map(Into::into).collect());
		self
	}

	/// Render the prompt locally and disable the engine's templating.
	pub fn pre_render(mut self, pre_render: bool) -> Self {
		self.pre_render = pre_render;
		self
	}

	pub fn verbose(mut self, verbose: bool) -> Self {
		self.verbose = verbose;
		self
	}

	/// Stream engine output to the terminal instead of capturing it.
	pub fn show_output(mut self, show_output: bool) -> Self {
		self.show_output = show_output;
		self
	}

	/// Explicit providers, else the suite's, else the configured defaults.
	pub fn resolved_providers(&self) -> Vec<ProviderSpec> {
		if let Some(providers) = &self.providers {
			return providers.clone();
		}
		if !self.suite.providers.is_empty() {
			return self.suite.providers.clone();
		}
		config::settings()
			.default_providers
			.iter()
			.map(|id| ProviderSpec::id(id.as_str()))
			.collect()
	}

	/// The configuration document this request would hand to the engine.
	pub fn compile(&self, expectations: &Expectations, output_path: &Path) -> Result<EvaluationConfig> {
		let prompt = if self.pre_render {
			self.suite
				.renderer
				.render(&self.prompt, &compiler::normalize_vars(&self.vars))?
		} else {
			self.prompt.clone()
		};
		Ok(compiler::build_config(
			&prompt,
			&self.vars,
			&self.resolved_providers(),
			expectations.assertions(),
			output_path,
			expectations.is_force_json(),
		))
	}

	/// Runs the engine in a scratch directory that is removed on return.
	pub async fn run(self, expectations: &Expectations) -> Result<EvaluationOutcome> {
		let workspace = tempfile::Builder::new().prefix("promptcraft-").tempdir()?;
		let config_path = workspace.path().join(CONFIG_FILE_NAME);
		let output_path = workspace.path().join(OUTPUT_FILE_NAME);

		let config = self.compile(expectations, &output_path)?;
		tokio::fs::write(&config_path, config.to_yaml()?).await?;
		debug!(suite = %self.suite.name, config = %config_path.display(), "wrote engine configuration");

		let options = ExecuteOptions {
			pre_render: self.pre_render,
			show_output: self.show_output,
		};
		let process = self.suite.runner.execute(&config_path, workspace.path(), &options).await?;

		let document = match parse_output(&output_path) {
			Err(PromptcraftError::MalformedOutput { path, source }) => {
				return Err(PromptcraftError::execution(
					format!("malformed output at {}: {}", path.display(), source),
					process.stdout,
					process.stderr,
				));
			}
			other => other?,
		};
		if !process.success && document.is_empty() {
			return Err(PromptcraftError::execution(
				"engine exited with a failure status and wrote no results",
				process.stdout,
				process.stderr,
			));
		}
		if !process.success {
			warn!(suite = %self.suite.name, "engine exited with a failure status; reading its results");
		}

		let outcome = EvaluationOutcome::new(document, process, self.verbose);
		info!(
			suite = %self.suite.name,
			passing = outcome.partition.passing.len(),
			failing = outcome.partition.failing.len(),
			"prompt evaluation finished"
		);
		Ok(outcome)
	}

	/// Runs and turns failing providers into an error carrying the report.
	pub async fn assert_passes(self, expectations: &Expectations) -> anyhow::Result<EvaluationOutcome> {
		let outcome = self.run(expectations).await?;
		crate::testing::assert_prompt_passed(&outcome)?;
		Ok(outcome)
	}
}

/// Decoded result of a finished evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
	pub document: OutputDocument,
	pub partition: ResultPartition,
	pub process: ProcessOutput,
	report: Option<String>,
}

impl EvaluationOutcome {
	/// Partitions the document and formats the report when anything failed.
	pub fn new(document: OutputDocument, process: ProcessOutput, verbose: bool) -> Self {
		let partition = decoder::partition(&document);
		let report = (!partition.all_passed()).then(|| report::format_results(&partition, verbose));
		Self {
			document,
			partition,
			process,
			report,
		}
	}

	pub fn passed(&self) -> bool {
		self.partition.all_passed()
	}

	/// Formatted report; `None` when every provider passed.
	pub fn failure_message(&self) -> Option<&str> {
		self.report.as_deref()
	}
}
