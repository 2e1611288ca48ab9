//! JSON/YAML loader for scenario files.

use crate::types::Step;
use glob::glob;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Patterns matched when a directory is given.
pub const SCENARIO_PATTERNS: [&str; 3] = ["*.json", "*.yaml", "*.yml"];

/// Errors that can occur during loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

/// Serialization of a scenario document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    /// Format implied by a file extension. Anything not YAML is read as JSON.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("yaml" | "yml") => Self::Yaml,
            _ => Self::Json,
        }
    }
}

/// An ordered list of steps to run as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    /// File the scenario was read from, empty for in-memory scenarios.
    pub path: PathBuf,
    pub base_url: Option<String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioDocument {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, alias = "base_url")]
    base_url: Option<String>,
    steps: Vec<Step>,
}

/// Parse scenario text. The root is either a list of steps or an object with
/// `name`, `baseUrl` and `steps`.
///
/// # Errors
/// Returns an error if the text does not parse or fails validation.
pub fn parse_scenario(
    content: &str,
    format: DocumentFormat,
    default_name: &str,
) -> Result<Scenario, LoaderError> {
    let root: Value = match format {
        DocumentFormat::Json => serde_json::from_str(content)?,
        DocumentFormat::Yaml => serde_yml::from_str(content)?,
    };

    let document = if root.is_array() {
        ScenarioDocument {
            name: None,
            base_url: None,
            steps: serde_json::from_value(root)?,
        }
    } else {
        serde_json::from_value(root)?
    };

    let base_url = document.base_url.filter(|b| !b.trim().is_empty());
    let mut steps = document.steps;
    if let Some(ref base) = base_url {
        for step in steps.iter_mut().filter(|s| s.base_url.is_none()) {
            step.base_url = Some(base.clone());
        }
    }

    let scenario = Scenario {
        name: document
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| default_name.to_string()),
        path: PathBuf::new(),
        base_url,
        steps,
    };
    validate_scenario(&scenario)?;
    Ok(scenario)
}

/// Load a scenario file. The name defaults to the file stem.
///
/// # Errors
/// Returns an error if:
/// - The file does not exist or cannot be read
/// - Parsing fails
/// - Validation fails
pub fn load_scenario<P: AsRef<Path>>(path: P) -> Result<Scenario, LoaderError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(LoaderError::FileNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut scenario = parse_scenario(&content, DocumentFormat::from_path(path), &stem)
        .map_err(|e| match e {
            LoaderError::Validation(message) => {
                LoaderError::Validation(format!("{}: {message}", path.display()))
            }
            other => other,
        })?;
    scenario.path = path.to_path_buf();
    Ok(scenario)
}

/// Validate step orders. Dependency direction is checked at run time.
///
/// # Errors
/// Returns an error for an empty step list, an order of zero or a duplicate order.
pub fn validate_scenario(scenario: &Scenario) -> Result<(), LoaderError> {
    if scenario.steps.is_empty() {
        return Err(LoaderError::Validation(format!(
            "scenario '{}' has no steps",
            scenario.name
        )));
    }

    let mut seen = HashSet::new();
    for step in &scenario.steps {
        if step.order == 0 {
            return Err(LoaderError::Validation(format!(
                "scenario '{}': step order must be at least 1",
                scenario.name
            )));
        }
        if !seen.insert(step.order) {
            return Err(LoaderError::Validation(format!(
                "scenario '{}': duplicate step order {}",
                scenario.name, step.order
            )));
        }
    }
    Ok(())
}

/// Discover scenario files directly inside `dir`.
///
/// # Errors
/// Returns an error if a glob pattern is invalid.
pub fn discover_scenario_files(dir: &Path) -> Result<Vec<PathBuf>, LoaderError> {
    let mut files = Vec::new();
    for pattern in SCENARIO_PATTERNS {
        let full_pattern = dir.join(pattern);
        for path in glob(&full_pattern.to_string_lossy())?.flatten() {
            if path.is_file() {
                files.push(path);
            }
        }
    }

    // Sort by path for deterministic order
    files.sort();
    files.dedup();
    Ok(files)
}

/// Expand scenario arguments: files are kept, directories are scanned.
///
/// # Errors
/// Returns an error if a path does not exist or a glob pattern is invalid.
pub fn resolve_scenario_paths(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, LoaderError> {
    let mut resolved = Vec::new();
    let mut seen = HashSet::new();

    for input in inputs {
        let candidates = if input.is_dir() {
            discover_scenario_files(input)?
        } else if input.is_file() {
            vec![input.clone()]
        } else {
            return Err(LoaderError::FileNotFound(input.clone()));
        };
        for path in candidates {
            if seen.insert(path.clone()) {
                resolved.push(path);
            }
        }
    }
    Ok(resolved)
}
