//! Launching the engine and reading its output artifact.

use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use promptcraft_types::OutputDocument;
use tokio::process::Command;

use crate::config::{self, Settings};
use crate::error::{PromptcraftError, Result};

/// Tells the engine not to re-render an already rendered prompt.
pub const DISABLE_TEMPLATING_ENV: &str = "PROMPTFOO_DISABLE_TEMPLATING";

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    /// The prompt was rendered by the caller; disable engine templating.
    pub pre_render: bool,
    /// Attach the engine to the caller's terminal instead of capturing.
    pub show_output: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub success: bool,
    /// Empty when the output was shown live.
    pub stdout: String,
    pub stderr: String,
}

/// Program, arguments and environment for one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl Invocation {
    /// `<executable> eval -c <config_path> --no-cache`, where `executable` may
    /// itself be several words such as `npx promptfoo@latest`.
    pub fn build(executable: &str, config_path: &Path, options: &ExecuteOptions) -> Result<Self> {
        let mut parts = shlex::split(executable)
            .filter(|parts| !parts.is_empty())
            .ok_or_else(|| PromptcraftError::InvalidExecutable {
                command: executable.to_string(),
            })?;
        let program = parts.remove(0);

        let mut args = parts;
        args.extend([
            "eval".to_string(),
            "-c".to_string(),
            config_path.to_string_lossy().into_owned(),
            "--no-cache".to_string(),
        ]);

        let mut envs = Vec::new();
        if options.pre_render {
            envs.push((DISABLE_TEMPLATING_ENV.to_string(), "true".to_string()));
        }

        Ok(Self { program, args, envs })
    }
}

/// Runs the engine against a written configuration file.
#[async_trait]
pub trait EngineRunner: Send + Sync {
    async fn execute(
        &self,
        config_path: &Path,
        working_dir: &Path,
        options: &ExecuteOptions,
    ) -> Result<ProcessOutput>;
}

/// Runs the real engine as a subprocess.
///
/// Without pinned settings, the process-wide [`config::settings`] are read on
/// every call so changes take effect on the next run.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    settings: Option<Arc<Settings>>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            settings: Some(Arc::new(settings)),
        }
    }

    fn settings(&self) -> Arc<Settings> {
        self.settings.clone().unwrap_or_else(config::settings)
    }
}

#[async_trait]
impl EngineRunner for ProcessRunner {
    async fn execute(
        &self,
        config_path: &Path,
        working_dir: &Path,
        options: &ExecuteOptions,
    ) -> Result<ProcessOutput> {
        let settings = self.settings();
        let executable = settings.resolve_executable();
        let invocation = Invocation::build(&executable, config_path, options)?;
        tracing::debug!(
            program = %invocation.program,
            args = ?invocation.args,
            cwd = %working_dir.display(),
            "launching evaluation engine"
        );

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(invocation.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(working_dir)
            .kill_on_drop(true);

        let timeout = settings.timeout();
        if options.show_output {
            command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
            let status = bounded(&invocation.program, timeout, command.status()).await?;
            Ok(ProcessOutput {
                success: status.success(),
                ..ProcessOutput::default()
            })
        } else {
            command.stdin(Stdio::null());
            let output = bounded(&invocation.program, timeout, command.output()).await?;
            Ok(ProcessOutput {
                success: output.status.success(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        }
    }
}

async fn bounded<T, F>(program: &str, timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    let launched = match timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            PromptcraftError::execution(
                format!("`{}` timed out after {}s", program, limit.as_secs()),
                "",
                "",
            )
        })?,
        None => fut.await,
    };
    launched.map_err(|e| PromptcraftError::execution(format!("could not run `{}`: {}", program, e), "", ""))
}

/// Reads the engine's output artifact. A missing file is an empty document;
/// a file that does not parse is an execution error.
pub fn parse_output(path: &Path) -> Result<OutputDocument> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "engine wrote no output artifact");
        return Ok(OutputDocument::empty());
    }
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes)
        .and_then(OutputDocument::from_value)
        .map_err(|source| PromptcraftError::MalformedOutput {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invocation_for_package_runner() {
        let invocation = Invocation::build(
            config::PACKAGE_RUNNER_FALLBACK,
            Path::new("/tmp/work/promptfooconfig.yaml"),
            &ExecuteOptions::default(),
        )
        .unwrap();
        assert_eq!(invocation.program, "npx");
        assert_eq!(
            invocation.args,
            vec!["promptfoo@latest", "eval", "-c", "/tmp/work/promptfooconfig.yaml", "--no-cache"]
        );
        assert!(invocation.envs.is_empty());
    }

    #[test]
    fn test_invocation_pre_render_env() {
        let options = ExecuteOptions { pre_render: true, show_output: false };
        let invocation = Invocation::build("'/opt/my tools/promptfoo'", Path::new("c.yaml"), &options).unwrap();
        assert_eq!(invocation.program, "/opt/my tools/promptfoo");
        assert_eq!(invocation.args[0], "eval");
        assert_eq!(
            invocation.envs,
            vec![(DISABLE_TEMPLATING_ENV.to_string(), "true".to_string())]
        );
    }

    #[test]
    fn test_invocation_rejects_bad_command() {
        for bad in ["", "   ", "npx 'unterminated"] {
            let err = Invocation::build(bad, Path::new("c.yaml"), &ExecuteOptions::default()).unwrap_err();
            assert!(matches!(err, PromptcraftError::InvalidExecutable { .. }), "{bad:?}");
        }
    }

    #[test]
    fn test_parse_output_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let doc = parse_output(&dir.path().join("output.json")).unwrap();
        assert!(doc.is_empty());
        assert!(doc.results.is_empty());
    }

    #[test]
    fn test_parse_output_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = parse_output(&path).unwrap_err();
        assert!(err.is_execution_error());
        assert!(matches!(err, PromptcraftError::MalformedOutput { .. }));
    }

    #[test]
    fn test_parse_output_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.json");
        std::fs::write(&path, b"{\"results\": \xff\xfe}").unwrap();
        let err = parse_output(&path).unwrap_err();
        assert!(err.is_execution_error());
        assert!(matches!(err, PromptcraftError::MalformedOutput { .. }));
    }

    #[test]
    fn test_parse_output_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.json");
        let body = json!({ "results": { "results": [{ "provider": { "id": "echo" }, "success": true }] } });
        std::fs::write(&path, body.to_string()).unwrap();
        let doc = parse_output(&path).unwrap();
        assert_eq!(doc.results.len(), 1);
        assert_eq!(doc.results[0].provider_id(), "echo");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_process_runner_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::with_settings(Settings {
            executable_path: Some("/bin/echo".into()),
            root_path: dir.path().to_path_buf(),
            ..Settings::default()
        });
        let output = runner
            .execute(Path::new("cfg.yaml"), dir.path(), &ExecuteOptions::default())
            .await
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "eval -c cfg.yaml --no-cache");
    }

    #[tokio::test]
    async fn test_bounded_timeout_is_execution_error() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, std::io::Error>(())
        };
        let err = bounded("promptfoo", Some(Duration::from_millis(20)), slow).await.unwrap_err();
        assert!(err.is_execution_error());
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_bounded_launch_failure() {
        let missing = async { Err::<(), _>(std::io::Error::from(std::io::ErrorKind::NotFound)) };
        let err = bounded("npx", None, missing).await.unwrap_err();
        assert!(err.is_execution_error());
        assert!(err.to_string().contains("could not run `npx`"));
    }
}
