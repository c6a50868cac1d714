use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by an evaluation call.
///
/// Prompt-quality failures are not errors: they come back as a failing
/// [`EvaluationOutcome`](crate::EvaluationOutcome).
#[derive(Debug, Error)]
pub enum PromptcraftError {
    #[error("prompt file not found: {}", path.display())]
    PromptNotFound { path: PathBuf },

    #[error("suite '{suite}' has no prompt locator; set one with SuiteBuilder::locator")]
    MissingLocator { suite: String },

    #[error("unsupported provider entry: {description}")]
    UnsupportedProvider { description: String },

    #[error("cannot split engine command line: {command}")]
    InvalidExecutable { command: String },

    #[error("failed to load settings from {}: {message}", path.display())]
    Settings { path: PathBuf, message: String },

    #[error("engine execution failed: {message}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}")]
    Execution {
        message: String,
        stdout: String,
        stderr: String,
    },

    #[error("engine wrote malformed output to {}: {source}", path.display())]
    MalformedOutput {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to encode engine configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to encode JSON value: {0}")]
    Json(#[from] serde_json::Error),
}

impl PromptcraftError {
    pub fn execution(message: impl Into<String>, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// The engine itself misbehaved, as opposed to a caller mistake.
    pub fn is_execution_error(&self) -> bool {
        matches!(self, Self::Execution { .. } | Self::MalformedOutput { .. })
    }
}

pub type Result<T> = std::result::Result<T, PromptcraftError>;
