//! Pre-declared endpoint headers and step header enrichment.

use crate::loader::{DocumentFormat, LoaderError};
use crate::types::{Step, deserialize_headers};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

fn placeholder_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{[^}]*\}\}|\$\{[^}]*\}|<[^<>]*>").ok())
        .as_ref()
}

/// Read access to headers declared for an endpoint.
pub trait ApiCatalog {
    /// Headers declared for `method` + `path`, if the endpoint is known.
    fn headers_for(&self, method: &str, path: &str) -> Option<&BTreeMap<String, String>>;
}

/// In-memory catalog keyed by upper-cased method and path.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    entries: HashMap<(String, String), BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    method: String,
    path: String,
    #[serde(default, deserialize_with = "deserialize_headers")]
    headers: BTreeMap<String, String>,
}

impl StaticCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare headers for an endpoint, replacing any earlier declaration.
    pub fn insert(&mut self, method: &str, path: &str, headers: BTreeMap<String, String>) {
        self.entries.insert(key(method, path), headers);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a list of `{method, path, headers}` entries.
    ///
    /// # Errors
    /// Returns an error if the document does not parse.
    pub fn parse(content: &str, format: DocumentFormat) -> Result<Self, LoaderError> {
        let entries: Vec<CatalogEntry> = match format {
            DocumentFormat::Json => serde_json::from_str(content)?,
            DocumentFormat::Yaml => serde_yml::from_str(content)?,
        };
        let mut catalog = Self::new();
        for entry in entries {
            catalog.insert(&entry.method, &entry.path, entry.headers);
        }
        Ok(catalog)
    }

    /// Load a catalog file (JSON or YAML by extension).
    ///
    /// # Errors
    /// Returns an error if the file is missing, unreadable or malformed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LoaderError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(LoaderError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, DocumentFormat::from_path(path))
    }
}

impl ApiCatalog for StaticCatalog {
    fn headers_for(&self, method: &str, path: &str) -> Option<&BTreeMap<String, String>> {
        self.entries.get(&key(method, path))
    }
}

fn key(method: &str, path: &str) -> (String, String) {
    (method.trim().to_ascii_uppercase(), path.trim().to_string())
}

/// Whether `value` still holds an unresolved template placeholder.
#[must_use]
pub fn has_placeholder(value: &str) -> bool {
    placeholder_regex().is_some_and(|pattern| pattern.is_match(value))
}

/// Prepare a step's headers before a run: drop `Authorization` headers that
/// still hold a placeholder and add catalog headers the step does not declare.
/// Catalog `Authorization` headers are never copied.
pub fn enrich_headers(step: &mut Step, catalog: &impl ApiCatalog) {
    let order = step.order;
    step.headers.retain(|name, value| {
        let keep = !(name.eq_ignore_ascii_case("authorization") && has_placeholder(value));
        if !keep {
            debug!(step = order, "dropping unresolved Authorization header");
        }
        keep
    });

    let Some(declared) = catalog.headers_for(&step.method, &step.path) else {
        return;
    };
    for (name, value) in declared {
        if name.eq_ignore_ascii_case("authorization")
            || step.headers.keys().any(|k| k.eq_ignore_ascii_case(name))
        {
            continue;
        }
        step.headers.insert(name.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn headers(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_has_placeholder() {
        assert!(has_placeholder("Bearer {{token}}"));
        assert!(has_placeholder("${TOKEN}"));
        assert!(has_placeholder("Bearer <token>"));
        assert!(!has_placeholder("Bearer abc.def"));
        assert!(!has_placeholder("{single}"));
    }

    #[test]
    fn test_enrich_adds_missing_headers_only() {
        let mut catalog = StaticCatalog::new();
        catalog.insert(
            "post",
            "/orders",
            headers(&[
                ("Content-Type", "application/json"),
                ("X-Client", "catalog"),
                ("Authorization", "Bearer from-catalog"),
            ]),
        );

        let mut step = Step::new(1, "POST", "/orders");
        step.headers = headers(&[("x-client", "step")]);
        enrich_headers(&mut step, &catalog);

        assert_eq!(
            step.headers,
            headers(&[("Content-Type", "application/json"), ("x-client", "step")])
        );
    }

    #[test]
    fn test_enrich_drops_placeholder_authorization() {
        let catalog = StaticCatalog::new();

        let mut templated = Step::new(1, "GET", "/me");
        templated.headers = headers(&[("Authorization", "Bearer {{token}}"), ("X-Trace", "<id>")]);
        enrich_headers(&mut templated, &catalog);
        assert_eq!(templated.headers, headers(&[("X-Trace", "<id>")]));

        let mut literal = Step::new(1, "GET", "/me");
        literal.headers = headers(&[("Authorization", "Bearer abc")]);
        enrich_headers(&mut literal, &catalog);
        assert_eq!(literal.headers.len(), 1);
    }

    #[test]
    fn test_parse_catalog_yaml() -> TestResult {
        let content = r"
- method: GET
  path: /songs
  headers:
    Accept: application/json
    X-Version: 2
- method: POST
  path: /songs
";
        let catalog = StaticCatalog::parse(content, DocumentFormat::Yaml)?;
        assert_eq!(catalog.len(), 2);
        let get = catalog.headers_for("get", "/songs").ok_or("missing entry")?;
        assert_eq!(get.get("X-Version").map(String::as_str), Some("2"));
        assert_eq!(catalog.headers_for("POST", "/songs").map(BTreeMap::len), Some(0));
        assert!(catalog.headers_for("DELETE", "/songs").is_none());
        Ok(())
    }

    #[test]
    fn test_load_catalog_missing_file() {
        assert!(matches!(
            StaticCatalog::load("/nonexistent/catalog.json"),
            Err(LoaderError::FileNotFound(_))
        ));
    }
}
