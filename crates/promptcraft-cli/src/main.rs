use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use promptcraft_core::compiler::parse_provider;
use promptcraft_core::runner::OUTPUT_FILE_NAME;
use promptcraft_core::{config, Expectations, ProviderSpec, Settings, Suite};
use serde_yaml::{Mapping, Value};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "promptcraft", about = "Check LLM prompt responses against expectations")]
struct Cli {
	/// Log verbosity (-v info, -vv debug); RUST_LOG overrides
	#[arg(short = 'v', action = ArgAction::Count, global = true)]
	log_level: u8,

	/// YAML settings file (engine path, project root, timeout, default providers)
	#[arg(long, global = true)]
	settings: Option<PathBuf>,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
	/// Compile, run the engine and report failing providers
	Run(RunArgs),
	/// Print the engine configuration without running it
	Compile(CompileArgs),
}

#[derive(Debug, Clone, Args)]
struct PromptArgs {
	/// Prompt text; `{{name}}` placeholders are filled from --var
	#[arg(long, required_unless_present = "prompt_file", conflicts_with = "prompt_file")]
	prompt: Option<String>,

	/// Read the prompt from a file
	#[arg(long)]
	prompt_file: Option<PathBuf>,

	/// Template variable as key=value (value parsed as YAML scalar)
	#[arg(long = "var", value_parser = parse_key_value)]
	vars: Vec<(String, String)>,

	/// Provider id; repeatable. Defaults to the configured providers
	#[arg(long = "provider")]
	providers: Vec<String>,

	/// YAML list of providers (ids or { id, config } mappings)
	#[arg(long)]
	providers_file: Option<PathBuf>,

	/// Response must contain this text; repeatable
	#[arg(long)]
	contains: Vec<String>,

	/// Response must match this regex; repeatable
	#[arg(long)]
	regex: Vec<String>,

	/// Response must equal this text
	#[arg(long)]
	equals: Option<String>,

	/// Response parses as JSON with key=value (value parsed as JSON literal); repeatable
	#[arg(long = "json-key", value_parser = parse_key_value)]
	json_keys: Vec<(String, String)>,

	/// Script predicate evaluated by the engine; repeatable
	#[arg(long)]
	javascript: Vec<String>,

	/// Rubric criteria judged by a model; repeatable
	#[arg(long)]
	rubric: Vec<String>,

	/// Passing score for --rubric (0.0..=1.0)
	#[arg(long)]
	threshold: Option<f64>,

	/// Tolerate JSON wrapped in markdown code fences
	#[arg(long, action = ArgAction::SetTrue)]
	force_json: bool,

	/// Render placeholders locally and disable the engine's templating
	#[arg(long, action = ArgAction::SetTrue)]
	pre_render: bool,
}

#[derive(Debug, Clone, Parser)]
struct RunArgs {
	#[command(flatten)]
	prompt: PromptArgs,

	/// Include raw results and full rubric reasoning in the report
	#[arg(long, action = ArgAction::SetTrue)]
	verbose: bool,

	/// Stream engine output instead of capturing it
	#[arg(long, action = ArgAction::SetTrue)]
	show_output: bool,

	/// Write the engine's raw results to a file
	#[arg(long)]
	json_out: Option<PathBuf>,
}

#[derive(Debug, Clone, Parser)]
struct CompileArgs {
	#[command(flatten)]
	prompt: PromptArgs,

	/// Write the YAML to a file instead of stdout
	#[arg(long)]
	out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();
	init_tracing(cli.log_level);

	if let Some(path) = &cli.settings {
		config::replace_settings(Settings::load(path)?);
		tracing::debug!(path = %path.display(), "loaded settings file");
	}

	match cli.command {
		Commands::Run(args) => run(args).await?,
		Commands::Compile(args) => compile(args).await?,
	}
	Ok(())
}

fn init_tracing(level: u8) {
	let default = match level {
		0 => "warn",
		1 => "info",
		_ => "debug",
	};
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
}

async fn run(args: RunArgs) -> Result<()> {
	let suite = Suite::builder("cli").verbose(args.verbose).build();
	let expect = expectations(&args.prompt);
	let request = prompt_request(&suite, &args.prompt)
		.await?
		.show_output(args.show_output);

	let outcome = request.run(&expect).await?;
	println!("{}", outcome.document.summary_table());

	if let Some(path) = args.json_out {
		let json = serde_json::to_string_pretty(outcome.document.raw())?;
		tokio::fs::write(path, json).await?;
	}

	if let Some(report) = outcome.failure_message() {
		eprintln!("{report}");
		anyhow::bail!(
			"{} of {} provider(s) failed",
			outcome.partition.failing.len(),
			outcome.partition.total()
		);
	}
	Ok(())
}

async fn compile(args: CompileArgs) -> Result<()> {
	let suite = Suite::builder("cli").build();
	let expect = expectations(&args.prompt);
	let request = prompt_request(&suite, &args.prompt).await?;

	let config = request.compile(&expect, Path::new(OUTPUT_FILE_NAME))?;
	let yaml = config.to_yaml()?;
	match args.out {
		Some(path) => tokio::fs::write(path, yaml).await?,
		None => print!("{yaml}"),
	}
	Ok(())
}

async fn prompt_request<'a>(
	suite: &'a Suite,
	args: &PromptArgs,
) -> Result<promptcraft_core::EvaluationRequest<'a>> {
	let text = match (&args.prompt, &args.prompt_file) {
		(Some(text), _) => text.clone(),
		(None, Some(path)) => tokio::fs::read_to_string(path)
			.await
			.with_context(|| format!("reading prompt file {}", path.display()))?,
		(None, None) => anyhow::bail!("either --prompt or --prompt-file is required"),
	};

	let mut vars = Mapping::new();
	for (key, value) in &args.vars {
		vars.insert(Value::from(key.as_str()), yaml_scalar(value));
	}

	let mut request = suite.prompt(text).vars(vars).pre_render(args.pre_render);
	let providers = providers(args).await?;
	if !providers.is_empty() {
		request = request.providers(providers);
	}
	Ok(request)
}

async fn providers(args: &PromptArgs) -> Result<Vec<ProviderSpec>> {
	let mut providers: Vec<ProviderSpec> = args.providers.iter().map(|id| ProviderSpec::id(id.as_str())).collect();
	if let Some(path) = &args.providers_file {
		let content = tokio::fs::read_to_string(path)
			.await
			.with_context(|| format!("reading providers file {}", path.display()))?;
		let entries = match serde_yaml::from_str::<Value>(&content)? {
			Value::Sequence(entries) => entries,
			_ => anyhow::bail!("{} must contain a YAML list of providers", path.display()),
		};
		for entry in entries {
			providers.push(parse_provider(entry)?);
		}
	}
	Ok(providers)
}

fn expectations(args: &PromptArgs) -> Expectations {
	let mut expect = Expectations::new();
	if args.force_json {
		expect.force_json();
	}
	for text in &args.contains {
		expect.includes(text.as_str());
	}
	for pattern in &args.regex {
		expect.matches(pattern.as_str());
	}
	if let Some(expected) = &args.equals {
		expect.equals(expected.as_str());
	}
	for (key, value) in &args.json_keys {
		expect.json_includes(key, json_literal(value));
	}
	for code in &args.javascript {
		expect.javascript(code.as_str());
	}
	for criteria in &args.rubric {
		match args.threshold {
			Some(threshold) => expect.rubric_with_threshold(criteria.as_str(), threshold),
			None => expect.rubric(criteria.as_str()),
		};
	}
	expect
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
	match raw.split_once('=') {
		Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
		_ => Err(format!("expected key=value, got '{raw}'")),
	}
}

// `42` stays a number and `true` a bool; anything else is a plain string.
fn yaml_scalar(raw: &str) -> Value {
	match serde_yaml::from_str::<Value>(raw) {
		Ok(value @ (Value::Bool(_) | Value::Number(_))) => value,
		_ => Value::from(raw),
	}
}

fn json_literal(raw: &str) -> serde_json::Value {
	serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::from(raw))
}

#[cfg(test)]
mod tests {
	use super::*;
	use promptcraft_core::AssertionKind;

	fn prompt_args(extra: &[&str]) -> PromptArgs {
		let mut argv = vec!["promptcraft", "compile", "--prompt", "Hi {{name}}"];
		argv.extend_from_slice(extra);
		match Cli::try_parse_from(argv).unwrap().command {
			Commands::Compile(args) => args.prompt,
			other => panic!("unexpected command: {other:?}"),
		}
	}

	#[test]
	fn test_parse_key_value() {
		assert_eq!(parse_key_value("a=b=c").unwrap(), ("a".to_string(), "b=c".to_string()));
		assert!(parse_key_value("=x").is_err());
		assert!(parse_key_value("novalue").is_err());
	}

	#[test]
	fn test_scalars() {
		assert_eq!(yaml_scalar("42"), Value::from(42));
		assert_eq!(yaml_scalar("Alice"), Value::from("Alice"));
		assert_eq!(yaml_scalar("[1, 2]"), Value::from("[1, 2]"));
		assert_eq!(json_literal("\"ok\""), serde_json::json!("ok"));
		assert_eq!(json_literal("ok"), serde_json::json!("ok"));
		assert_eq!(json_literal("3"), serde_json::json!(3));
	}

	#[test]
	fn test_flags_build_expectations() {
		let args = prompt_args(&[
			"--contains",
			"Alice",
			"--regex",
			"^H",
			"--json-key",
			"ok=true",
			"--rubric",
			"polite",
			"--threshold",
			"0.8",
		]);
		let expect = expectations(&args);
		let kinds: Vec<_> = expect.assertions().iter().map(|a| a.kind.clone()).collect();
		assert_eq!(
			kinds,
			vec![
				AssertionKind::Contains,
				AssertionKind::Regex,
				AssertionKind::IsJson,
				AssertionKind::ScriptPredicate,
				AssertionKind::Rubric,
			]
		);
		assert_eq!(expect.assertions()[4].threshold, Some(0.8));
	}

	#[test]
	fn test_prompt_sources_conflict() {
		assert!(Cli::try_parse_from(["promptcraft", "run"]).is_err());
		assert!(Cli::try_parse_from(["promptcraft", "run", "--prompt", "a", "--prompt-file", "b"]).is_err());
	}

	#[tokio::test]
	async fn test_providers_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("providers.yaml");
		std::fs::write(&path, "- echo\n- id: openai:gpt-4o\n  config:\n    temperature: 0\n").unwrap();

		let mut args = prompt_args(&["--provider", "anthropic:claude"]);
		args.providers_file = Some(path.clone());
		let providers = providers(&args).await.unwrap();
		assert_eq!(providers.len(), 3);
		assert_eq!(providers[0].provider_id(), "anthropic:claude");
		assert_eq!(providers[1], ProviderSpec::id("echo"));
		assert!(providers[2].config().unwrap().contains_key("temperature"));

		std::fs::write(&path, "id: echo\n").unwrap();
		assert!(super::providers(&args).await.is_err());
	}

	#[tokio::test]
	async fn test_compile_uses_explicit_providers() {
		let suite = Suite::builder("cli").build();
		let args = prompt_args(&["--var", "name=Alice", "--provider", "echo", "--contains", "Alice"]);
		let config = prompt_request(&suite, &args)
			.await
			.unwrap()
			.compile(&expectations(&args), Path::new(OUTPUT_FILE_NAME))
			.unwrap();
		assert_eq!(config.providers, vec![ProviderSpec::id("echo")]);
		assert_eq!(config.tests[0].vars.get("name"), Some(&Value::from("Alice")));
		assert_eq!(config.prompts, vec!["Hi {{name}}".to_string()]);
	}
}
