//! Process-wide settings: where the engine lives and how to run it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{PromptcraftError, Result};

/// Engine package name, used for the local binary and the `npx` fallback.
pub const ENGINE_NAME: &str = "promptfoo";

/// Command used when no configured or local binary is found.
pub const PACKAGE_RUNNER_FALLBACK: &str = "npx promptfoo@latest";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Explicit engine executable. Ignored unless it exists and is executable.
    #[serde(default)]
    pub executable_path: Option<PathBuf>,
    /// Root for resolving `node_modules/.bin/promptfoo`.
    #[serde(default = "default_root_path")]
    pub root_path: PathBuf,
    /// Upper bound on one engine run. `None` waits indefinitely.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_providers")]
    pub default_providers: Vec<String>,
}

fn default_root_path() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn default_providers() -> Vec<String> {
    vec!["openai:gpt-4o-mini".to_string()]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            executable_path: None,
            root_path: default_root_path(),
            timeout_secs: None,
            default_providers: default_providers(),
        }
    }
}

impl Settings {
    /// Defaults overridden by `PROMPTCRAFT_EXECUTABLE`, `PROMPTCRAFT_ROOT` and
    /// `PROMPTCRAFT_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(path) = std::env::var("PROMPTCRAFT_EXECUTABLE") {
            settings.executable_path = Some(PathBuf::from(path));
        }
        if let Ok(root) = std::env::var("PROMPTCRAFT_ROOT") {
            settings.root_path = PathBuf::from(root);
        }
        match std::env::var("PROMPTCRAFT_TIMEOUT_SECS").map(|v| v.parse::<u64>()) {
            Ok(Ok(secs)) => settings.timeout_secs = Some(secs),
            Ok(Err(err)) => tracing::warn!("ignoring PROMPTCRAFT_TIMEOUT_SECS: {}", err),
            Err(_) => {}
        }
        settings
    }

    /// Reads settings from a YAML file; missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PromptcraftError::Settings {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_yaml::from_str(&content).map_err(|e| PromptcraftError::Settings {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn local_binary(&self) -> PathBuf {
        self.root_path.join("node_modules").join(".bin").join(ENGINE_NAME)
    }

    /// Command line that launches the engine: the configured path, else the
    /// project-local binary, else the package-runner fallback. Paths are
    /// shell-quoted so the result always splits back into its parts.
    pub fn resolve_executable(&self) -> String {
        let configured = self.executable_path.as_deref().filter(|p| is_executable(p));
        let local = self.local_binary();
        match configured {
            Some(path) => quote_path(path),
            None if is_executable(&local) => quote_path(&local),
            None => PACKAGE_RUNNER_FALLBACK.to_string(),
        }
    }
}

fn quote_path(path: &Path) -> String {
    let text = path.to_string_lossy();
    match shlex::try_quote(&text) {
        Ok(quoted) => quoted.into_owned(),
        Err(_) => text.into_owned(),
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

static SETTINGS: Lazy<RwLock<Arc<Settings>>> =
    Lazy::new(|| RwLock::new(Arc::new(Settings::from_env())));

/// Current process-wide settings, created from the environment on first use.
pub fn settings() -> Arc<Settings> {
    SETTINGS.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Swaps in a whole new settings value, e.g. for test isolation.
pub fn replace_settings(settings: Settings) {
    *SETTINGS.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(settings);
}

/// Edits a copy of the current settings and installs it.
pub fn configure(f: impl FnOnce(&mut Settings)) {
    let mut guard = SETTINGS.write().unwrap_or_else(|e| e.into_inner());
    let mut next = (**guard).clone();
    f(&mut next);
    *guard = Arc::new(next);
}

/// Back to environment-derived settings.
pub fn reset_settings() {
    replace_settings(Settings::from_env());
}
