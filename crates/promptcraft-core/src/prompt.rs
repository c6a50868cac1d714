//! Where prompt text comes from and how it is rendered before the engine
//! sees it.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use promptcraft_types::Vars;
use regex::{Captures, Regex};
use serde_yaml::Value;

use crate::error::{PromptcraftError, Result};

/// Renders a prompt template with its variables before the engine runs.
pub trait PromptRenderer: Send + Sync {
    fn render(&self, template: &str, vars: &Vars) -> Result<String>;
}

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
});

/// Replaces `{{ name }}` with the matching variable. Unknown placeholders
/// are left as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderRenderer;

impl PromptRenderer for PlaceholderRenderer {
    fn render(&self, template: &str, vars: &Vars) -> Result<String> {
        let mut failure = None;
        let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures| {
            let whole = caps[0].to_string();
            match vars.get(&caps[1]) {
                None => whole,
                Some(value) => match display_value(value) {
                    Ok(text) => text,
                    Err(err) => {
                        failure.get_or_insert(err);
                        whole
                    }
                },
            }
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(rendered.into_owned()),
        }
    }
}

fn display_value(value: &Value) -> Result<String> {
    Ok(match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => serde_json::to_string(other)?,
    })
}

/// Identity of a prompt test within its suite.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestId {
    pub suite: String,
    pub name: String,
}

impl TestId {
    pub fn new(suite: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            name: name.into(),
        }
    }
}

/// Maps a test to the file holding its prompt.
pub trait PromptLocator: Send + Sync {
    fn locate(&self, id: &TestId) -> PathBuf;
}

impl<F> PromptLocator for F
where
    F: Fn(&TestId) -> PathBuf + Send + Sync,
{
    fn locate(&self, id: &TestId) -> PathBuf {
        self(id)
    }
}

/// `<root>/<suite>/<name>.<extension>`.
#[derive(Debug, Clone)]
pub struct DirectoryLocator {
    root: PathBuf,
    extension: String,
}

impl DirectoryLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: "txt".to_string(),
        }
    }

    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }
}

impl PromptLocator for DirectoryLocator {
    fn locate(&self, id: &TestId) -> PathBuf {
        self.root
            .join(&id.suite)
            .join(format!("{}.{}", id.name, self.extension))
    }
}

/// Reads the prompt text at `path`, failing with `PromptNotFound` if absent.
pub fn load_prompt(path: &Path) -> Result<String> {
    if !path.is_file() {
        return Err(PromptcraftError::PromptNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(std::fs::read_to_string(path)?)
}
