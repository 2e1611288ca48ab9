//! Core data types for chainrun.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Where a declared query parameter ends up in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    #[default]
    #[serde(other)]
    Query,
}

/// A query parameter declared in list form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParam {
    pub name: String,
    #[serde(default, alias = "in")]
    pub location: ParamLocation,
    #[serde(default)]
    pub value: Value,
}

impl QueryParam {
    #[must_use]
    pub fn query(name: &str, value: Value) -> Self {
        Self {
            name: name.to_string(),
            location: ParamLocation::Query,
            value,
        }
    }

    #[must_use]
    pub fn path(name: &str, value: Value) -> Self {
        Self {
            name: name.to_string(),
            location: ParamLocation::Path,
            value,
        }
    }
}

/// Query parameters, either as a plain mapping or as a list of located entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParams {
    Map(Map<String, Value>),
    List(Vec<QueryParam>),
}

impl Default for QueryParams {
    fn default() -> Self {
        Self::Map(Map::new())
    }
}

impl QueryParams {
    /// Normalize both forms into a list. Mapping entries are plain query parameters.
    #[must_use]
    pub fn entries(&self) -> Vec<QueryParam> {
        match self {
            Self::Map(map) => map
                .iter()
                .map(|(name, value)| QueryParam::query(name, value.clone()))
                .collect(),
            Self::List(list) => list.clone(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Map(map) => map.is_empty(),
            Self::List(list) => list.is_empty(),
        }
    }
}

/// Destination of a value copied from an earlier step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetLocation {
    #[default]
    Body,
    Query,
    #[serde(alias = "headers")]
    Header,
}

impl std::fmt::Display for TargetLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Body => write!(f, "body"),
            Self::Query => write!(f, "query"),
            Self::Header => write!(f, "header"),
        }
    }
}

/// Instruction to copy a value from an earlier step's response into this step's request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamMapping {
    /// `0` when the document left it out.
    #[serde(default, alias = "from_step")]
    pub from_step: u32,
    #[serde(default, alias = "from_field")]
    pub from_field: String,
    #[serde(default, alias = "to_field")]
    pub to_field: String,
    #[serde(default, alias = "to_location")]
    pub to_location: TargetLocation,
}

impl ParamMapping {
    #[must_use]
    pub fn new(
        from_step: u32,
        from_field: &str,
        to_field: &str,
        to_location: TargetLocation,
    ) -> Self {
        Self {
            from_step,
            from_field: from_field.to_string(),
            to_field: to_field.to_string(),
            to_location,
        }
    }

    /// Whether the source step, source field and destination are all given.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.from_step > 0
            && !self.from_field.trim().is_empty()
            && !self.to_field.trim().is_empty()
    }

    /// Effective destination. A `headers.` prefix on `to_field` always targets a header.
    #[must_use]
    pub fn target(&self) -> (TargetLocation, &str) {
        self.to_field
            .strip_prefix("headers.")
            .map_or((self.to_location, self.to_field.as_str()), |name| {
                (TargetLocation::Header, name)
            })
    }
}

/// Kind of check an assertion performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionKind {
    StatusCode,
    ResponseTime,
    FieldExists,
    FieldValue,
    ResponseContains,
    /// Unknown or missing kind. Always fails.
    #[default]
    #[serde(other)]
    Unsupported,
}

impl AssertionKind {
    /// Whether the assertion addresses a field of the response body.
    #[must_use]
    pub const fn requires_field(self) -> bool {
        matches!(self, Self::FieldExists | Self::FieldValue)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StatusCode => "status_code",
            Self::ResponseTime => "response_time",
            Self::FieldExists => "field_exists",
            Self::FieldValue => "field_value",
            Self::ResponseContains => "response_contains",
            Self::Unsupported => "unsupported",
        }
    }
}

impl std::fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed check against a step's response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "AssertionDocument")]
pub struct Assertion {
    pub kind: AssertionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub expected: Option<Value>,
    /// Human label. Only consulted when a field has to be inferred.
    pub description: String,
}

/// Assertion as generators write it. The expected value may arrive as
/// `expected`, `expected_value` or (for `response_contains`) `text`.
#[derive(Deserialize)]
struct AssertionDocument {
    #[serde(default, alias = "type")]
    kind: AssertionKind,
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    expected: Option<Value>,
    #[serde(default, alias = "expectedValue")]
    expected_value: Option<Value>,
    #[serde(default)]
    text: Option<Value>,
    #[serde(default)]
    description: String,
}

impl From<AssertionDocument> for Assertion {
    fn from(doc: AssertionDocument) -> Self {
        Self {
            kind: doc.kind,
            field: doc.field,
            expected: doc.expected.or(doc.expected_value).or(doc.text),
            description: doc.description,
        }
    }
}

impl Assertion {
    #[must_use]
    pub const fn new(kind: AssertionKind) -> Self {
        Self {
            kind,
            field: None,
            expected: None,
            description: String::new(),
        }
    }

    #[must_use]
    pub fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }

    #[must_use]
    pub fn with_expected(mut self, expected: impl Into<Value>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
}

/// One HTTP call template within a scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(alias = "step_order")]
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, alias = "api_method")]
    pub method: String,
    #[serde(default, alias = "api_path")]
    pub path: String,
    #[serde(default, alias = "base_url")]
    pub base_url: Option<String>,
    #[serde(default, alias = "params", alias = "body_params")]
    pub body_params: Map<String, Value>,
    #[serde(default, alias = "query_params")]
    pub query_params: QueryParams,
    #[serde(default, deserialize_with = "deserialize_headers")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, alias = "param_mappings")]
    pub dependencies: Vec<ParamMapping>,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

impl Step {
    #[must_use]
    pub fn new(order: u32, method: &str, path: &str) -> Self {
        Self {
            order,
            method: method.to_string(),
            path: path.to_string(),
            ..Self::default()
        }
    }
}

/// Header maps from generators carry arbitrary scalars; they are sent as text.
pub(crate) fn deserialize_headers<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Map<String, Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(name, value)| {
            let text = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (name, text)
        })
        .collect())
}

/// HTTP status of a step, or the sentinel recorded when no response arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusCode {
    Code(u16),
    #[default]
    Error,
}

impl StatusCode {
    #[must_use]
    pub const fn code(self) -> Option<u16> {
        match self {
            Self::Code(code) => Some(code),
            Self::Error => None,
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code(code) => write!(f, "{code}"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl Serialize for StatusCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Code(code) => serializer.serialize_u16(*code),
            Self::Error => serializer.serialize_str("error"),
        }
    }
}

impl<'de> Deserialize<'de> for StatusCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => n
                .as_u64()
                .and_then(|n| u16::try_from(n).ok())
                .map(Self::Code)
                .ok_or_else(|| de::Error::custom(format!("invalid status code {n}"))),
            Value::String(s) if s.eq_ignore_ascii_case("error") => Ok(Self::Error),
            other => Err(de::Error::custom(format!("invalid status code {other}"))),
        }
    }
}

/// Why a step produced no evaluable response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Composition,
    Timeout,
    Connect,
    Transport,
}

/// Outcome of one dependency extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRecord {
    pub from_step: u32,
    pub from_field: String,
    pub to_field: String,
    pub to_location: TargetLocation,
    pub value: Option<Value>,
    pub success: bool,
    /// Path actually used when the exact path missed and the fallback search hit.
    pub resolved_path: Option<String>,
    pub error_message: Option<String>,
}

impl ExtractionRecord {
    #[must_use]
    pub fn failed(mapping: &ParamMapping, message: String) -> Self {
        let (location, field) = mapping.target();
        Self {
            from_step: mapping.from_step,
            from_field: mapping.from_field.clone(),
            to_field: field.to_string(),
            to_location: location,
            value: None,
            success: false,
            resolved_path: None,
            error_message: Some(message),
        }
    }

    #[must_use]
    pub fn extracted(mapping: &ParamMapping, value: Value, resolved_path: Option<String>) -> Self {
        let (location, field) = mapping.target();
        Self {
            from_step: mapping.from_step,
            from_field: mapping.from_field.clone(),
            to_field: field.to_string(),
            to_location: location,
            value: Some(value),
            success: true,
            resolved_path,
            error_message: None,
        }
    }
}

/// Result of a single assertion evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResult {
    pub kind: AssertionKind,
    pub field: Option<String>,
    pub expected: Option<Value>,
    pub actual: Value,
    pub passed: bool,
}

/// Everything captured for one step of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub order: u32,
    pub url: String,
    pub method: String,
    pub request_body: Value,
    pub request_query: Vec<(String, String)>,
    pub request_headers: BTreeMap<String, String>,
    pub status_code: StatusCode,
    pub latency_ms: u64,
    pub response_body: Value,
    pub response_headers: BTreeMap<String, String>,
    pub extractions: Vec<ExtractionRecord>,
    pub assertions: Vec<AssertionResult>,
    pub success: bool,
    pub error_message: Option<String>,
    #[serde(skip)]
    pub failure: Option<FailureKind>,
}

impl StepResult {
    /// A failed result for `step` with nothing captured yet.
    #[must_use]
    pub fn pending(step: &Step) -> Self {
        Self {
            order: step.order,
            url: String::new(),
            method: step.method.trim().to_ascii_uppercase(),
            request_body: Value::Null,
            request_query: Vec::new(),
            request_headers: BTreeMap::new(),
            status_code: StatusCode::Error,
            latency_ms: 0,
            response_body: Value::Null,
            response_headers: BTreeMap::new(),
            extractions: Vec::new(),
            assertions: Vec::new(),
            success: false,
            error_message: None,
            failure: None,
        }
    }

    /// Failed assertions of this step.
    pub fn failed_assertions(&self) -> impl Iterator<Item = &AssertionResult> {
        self.assertions.iter().filter(|a| !a.passed)
    }
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Ordered step results of one run plus the overall status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub steps: Vec<StepResult>,
    pub status: RunStatus,
}

impl RunReport {
    /// Build a report; the run succeeds iff every step succeeded.
    #[must_use]
    pub fn from_steps(steps: Vec<StepResult>) -> Self {
        let status = if steps.iter().all(|s| s.success) {
            RunStatus::Success
        } else {
            RunStatus::Failed
        };
        Self { steps, status }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    #[must_use]
    pub fn passed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.success).count()
    }

    #[must_use]
    pub fn failed_steps(&self) -> usize {
        self.steps.len() - self.passed_steps()
    }
}

/// A run report labelled with the scenario it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub path: String,
    pub report: RunReport,
}

/// Counts across all scenarios of an invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total_scenarios: usize,
    pub passed_scenarios: usize,
    pub failed_scenarios: usize,
    pub total_steps: usize,
    pub passed_steps: usize,
    pub failed_steps: usize,
}

impl ExecutionSummary {
    #[must_use]
    pub fn from_scenarios(scenarios: &[ScenarioReport]) -> Self {
        let passed_scenarios = scenarios.iter().filter(|s| s.report.is_success()).count();
        let total_steps = scenarios.iter().map(|s| s.report.steps.len()).sum();
        let passed_steps = scenarios.iter().map(|s| s.report.passed_steps()).sum();
        Self {
            total_scenarios: scenarios.len(),
            passed_scenarios,
            failed_scenarios: scenarios.len() - passed_scenarios,
            total_steps,
            passed_steps,
            failed_steps: total_steps - passed_steps,
        }
    }
}

/// Top-level JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub timestamp: String,
    pub scenarios: Vec<ScenarioReport>,
    pub summary: ExecutionSummary,
}
