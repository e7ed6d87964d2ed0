//! SQL query templates.
//!
//! Templates are plain SQL files with `{{ name }}` placeholders and
//! optional `{# ... #}` comments. Rendering is strict: every placeholder
//! must be supplied, while extra parameters are ignored so one parameter
//! set can feed several templates.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::CoreError;

/// Directories searched, in order, when no explicit paths are configured.
pub const DEFAULT_SEARCH_PATHS: [&str; 2] = ["./", "./assets/"];

/// Compiled regex for `{{ placeholder }}` tokens. Compiled once, reused forever.
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*\}\}").expect("valid regex")
});

/// `{# comment #}` blocks, possibly spanning lines.
static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{#.*?#\}").expect("valid regex"));

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Named string values substituted into a template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateParams(BTreeMap<String, String>);

impl TemplateParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Substitute every placeholder in `text`.
///
/// Fails with [`CoreError::Template`] naming all undefined placeholders.
pub fn render(text: &str, params: &TemplateParams) -> Result<String, CoreError> {
    let stripped = COMMENT_RE.replace_all(text, "");

    let mut missing: Vec<String> = Vec::new();
    let rendered = PLACEHOLDER_RE
        .replace_all(&stripped, |caps: &regex::Captures| {
            let key = &caps[1];
            match params.get(key) {
                Some(value) => value.to_string(),
                None => {
                    missing.push(key.to_string());
                    caps[0].to_string()
                }
            }
        })
        .into_owned();

    if !missing.is_empty() {
        missing.sort();
        missing.dedup();
        return Err(CoreError::Template(format!(
            "undefined template variables: {}",
            missing.join(", ")
        )));
    }
    Ok(rendered)
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Loads templates from an ordered list of search directories.
#[derive(Debug, Clone)]
pub struct QueryTemplates {
    search_paths: Vec<PathBuf>,
}

impl Default for QueryTemplates {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_PATHS.iter().map(PathBuf::from).collect())
    }
}

impl QueryTemplates {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    /// Default search paths with `dir` searched first.
    pub fn with_assets_dir(dir: impl AsRef<Path>) -> Self {
        let mut templates = Self::default();
        templates.search_paths.insert(0, dir.as_ref().to_path_buf());
        templates
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// First existing file named `name` along the search paths.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, CoreError> {
        self.search_paths
            .iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| CoreError::NotFound {
                entity: "Template",
                name: name.to_string(),
            })
    }

    /// Read the raw template text.
    pub fn load(&self, name: &str) -> Result<String, CoreError> {
        let path = self.resolve(name)?;
        Ok(std::fs::read_to_string(path)?)
    }

    /// Load and render a template in one step.
    pub fn render(&self, name: &str, params: &TemplateParams) -> Result<String, CoreError> {
        let text = self.load(name)?;
        render(&text, params).map_err(|e| match e {
            CoreError::Template(msg) => CoreError::Template(format!("{name}: {msg}")),
            other => other,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
