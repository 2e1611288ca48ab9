//! Assertion evaluation against a captured response.
//!
//! Each assertion is evaluated independently: repair a missing field, map the
//! field to a synonym the response envelope actually uses, evaluate by kind.

use crate::path::{normalized_segments, step_into, value_text};
use crate::types::{Assertion, AssertionKind, AssertionResult, StatusCode};
use serde_json::Value;
use tracing::warn;

/// Envelope synonyms tried, in order, when a canonical field is absent.
const FIELD_ALIASES: [(&str, &[&str]); 3] = [
    ("code", &["errcode", "RetCode", "status", "ret", "error_code"]),
    ("message", &["errmsg", "msg", "info", "error", "message", "desc"]),
    ("data", &["result", "content", "body", "list"]),
];

/// Fields whose values are human-readable messages.
const MESSAGE_FIELDS: [&str; 6] = ["message", "msg", "errmsg", "error", "info", "desc"];

/// Markers that count as a success message anywhere in the text.
const SUCCESS_MARKERS: [&str; 2] = ["成功", "success"];

/// Markers that count as a success message only as a whole word.
const SUCCESS_WORDS: [&str; 1] = ["ok"];

const CODE_KEYWORDS: [&str; 4] = ["code", "状态码", "错误码", "返回码"];
const MESSAGE_KEYWORDS: [&str; 4] = ["message", "msg", "消息", "提示"];
const DATA_KEYWORDS: [&str; 4] = ["data", "数据", "list", "列表"];

/// Latency bound used when a `response_time` assertion has no usable value.
pub const DEFAULT_MAX_LATENCY_MS: u64 = 1_000;

/// What an assertion is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct ResponseSnapshot<'a> {
    pub status: StatusCode,
    pub latency_ms: u64,
    pub body: &'a Value,
}

/// Assertions applied to a step that declares none.
#[must_use]
pub fn default_assertions() -> Vec<Assertion> {
    vec![
        Assertion::new(AssertionKind::StatusCode)
            .with_expected(200)
            .with_description("default: status code is 200"),
        Assertion::new(AssertionKind::ResponseTime)
            .with_expected(DEFAULT_MAX_LATENCY_MS)
            .with_description("default: response time under 1000ms"),
    ]
}

/// Evaluate every assertion, or the defaults when the list is empty.
#[must_use]
pub fn evaluate_all(
    assertions: &[Assertion],
    response: &ResponseSnapshot<'_>,
) -> Vec<AssertionResult> {
    if assertions.is_empty() {
        return default_assertions()
            .iter()
            .map(|assertion| evaluate(assertion, response))
            .collect();
    }
    assertions
        .iter()
        .map(|assertion| evaluate(assertion, response))
        .collect()
}

/// Evaluate one assertion.
#[must_use]
pub fn evaluate(assertion: &Assertion, response: &ResponseSnapshot<'_>) -> AssertionResult {
    match assertion.kind {
        AssertionKind::StatusCode => check_status(assertion, response.status),
        AssertionKind::ResponseTime => check_latency(assertion, response.latency_ms),
        AssertionKind::FieldExists | AssertionKind::FieldValue => {
            check_field(assertion, response.body)
        }
        AssertionKind::ResponseContains => check_contains(assertion, response.body),
        AssertionKind::Unsupported => {
            warn!(description = %assertion.description, "unsupported assertion kind");
            result(assertion, assertion.field.clone(), Value::Null, false)
        }
    }
}

fn result(
    assertion: &Assertion,
    field: Option<String>,
    actual: Value,
    passed: bool,
) -> AssertionResult {
    AssertionResult {
        kind: assertion.kind,
        field,
        expected: assertion.expected.clone(),
        actual,
        passed,
    }
}

fn check_status(assertion: &Assertion, status: StatusCode) -> AssertionResult {
    let actual = status.code().map_or_else(|| Value::from("error"), Value::from);
    let passed = match (&assertion.expected, status.code()) {
        (_, None) => false,
        (None, Some(code)) => code < 400,
        (Some(expected), Some(code)) => as_integer(expected).map_or_else(
            || comparable_text(expected) == code.to_string(),
            |wanted| wanted == u64::from(code),
        ),
    };
    result(assertion, assertion.field.clone(), actual, passed)
}

fn check_latency(assertion: &Assertion, latency_ms: u64) -> AssertionResult {
    let limit = assertion
        .expected
        .as_ref()
        .and_then(as_millis)
        .unwrap_or(DEFAULT_MAX_LATENCY_MS);
    result(
        assertion,
        assertion.field.clone(),
        Value::from(latency_ms),
        latency_ms <= limit,
    )
}

fn check_field(assertion: &Assertion, body: &Value) -> AssertionResult {
    let requested = match assertion.field.as_deref().map(str::trim) {
        Some(field) if !field.is_empty() => field.to_string(),
        _ => {
            let inferred = infer_field(assertion);
            warn!(
                kind = %assertion.kind,
                description = %assertion.description,
                field = %inferred,
                "assertion has no field; inferred one"
            );
            inferred
        }
    };
    let field = resolve_alias(&requested, body);
    let found = lookup_field(body, &field);
    let actual = found.cloned().unwrap_or(Value::Null);

    let passed = match (assertion.kind, &assertion.expected, found) {
        (_, _, None) => false,
        (AssertionKind::FieldExists, _, Some(_)) => true,
        (_, None, Some(value)) => !matches!(value, Value::Array(items) if items.is_empty()),
        (_, Some(expected), Some(value)) => {
            let actual_text = comparable_text(value);
            let expected_text = comparable_text(expected);
            actual_text == expected_text
                || (is_message_field(&requested, &field)
                    && message_matches(&actual_text, &expected_text))
        }
    };
    result(assertion, Some(field), actual, passed)
}

fn check_contains(assertion: &Assertion, body: &Value) -> AssertionResult {
    let needle = assertion
        .field
        .as_deref()
        .filter(|f| !f.is_empty())
        .map(ToString::to_string)
        .or_else(|| assertion.expected.as_ref().map(value_text))
        .unwrap_or_default();
    let haystack = match body {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    let passed = !needle.is_empty() && haystack.contains(&needle);
    result(assertion, assertion.field.clone(), Value::Bool(passed), passed)
}

/// Pick a field for an assertion that lacks one, from its expected value and
/// description. Falls back to `data`.
#[must_use]
pub fn infer_field(assertion: &Assertion) -> String {
    if let Some(expected) = &assertion.expected {
        if expected.is_i64() || expected.is_u64() {
            return "code".to_string();
        }
        if let Some(text) = expected.as_str() {
            let lowered = text.to_lowercase();
            if lowered == "success" || lowered == "ok" || text.contains("成功") {
                return "message".to_string();
            }
        }
    }

    let description = assertion.description.to_lowercase();
    let has_any = |keywords: &[&str]| keywords.iter().any(|k| description.contains(k));
    if has_any(&CODE_KEYWORDS) {
        "code".to_string()
    } else if has_any(&MESSAGE_KEYWORDS) {
        "message".to_string()
    } else {
        if !has_any(&DATA_KEYWORDS) {
            warn!(description = %assertion.description, "no field hint; defaulting to data");
        }
        "data".to_string()
    }
}

/// Map a canonical field to the first synonym present at the top level of
/// `body`. Dotted paths and fields that are present are returned unchanged.
#[must_use]
pub fn resolve_alias(field: &str, body: &Value) -> String {
    if field.contains('.') || field.contains('[') {
        return field.to_string();
    }
    let Some(object) = body.as_object() else {
        return field.to_string();
    };
    if object.contains_key(field) {
        return field.to_string();
    }
    FIELD_ALIASES
        .iter()
        .find(|(canonical, _)| *canonical == field)
        .and_then(|(_, aliases)| aliases.iter().find(|alias| object.contains_key(**alias)))
        .map_or_else(|| field.to_string(), |alias| (*alias).to_string())
}

/// Walk a dotted field path, retrying a missing object key in its
/// singular/plural form (`songs` and `song`).
#[must_use]
pub fn lookup_field<'a>(body: &'a Value, field: &str) -> Option<&'a Value> {
    normalized_segments(body, field)
        .iter()
        .try_fold(body, |node, segment| {
            step_into(node, segment).or_else(|| {
                let alternate = segment
                    .strip_suffix('s')
                    .map_or_else(|| format!("{segment}s"), ToString::to_string);
                node.as_object().and_then(|map| map.get(&alternate))
            })
        })
}

fn is_message_field(requested: &str, resolved: &str) -> bool {
    [requested, resolved].into_iter().any(|field| {
        let leaf = field.rsplit('.').next().unwrap_or(field).to_lowercase();
        MESSAGE_FIELDS.contains(&leaf.as_str())
    })
}

fn message_matches(actual: &str, expected: &str) -> bool {
    let actual_lower = actual.to_lowercase();
    let expected_lower = expected.to_lowercase();
    let wants_success = expected_lower == "success" || expected_lower == "ok";
    let signals_success = SUCCESS_MARKERS.iter().any(|m| actual_lower.contains(m))
        || SUCCESS_WORDS.iter().any(|w| has_word(&actual_lower, w));
    let literal = if SUCCESS_WORDS.contains(&expected_lower.as_str()) {
        has_word(&actual_lower, &expected_lower)
    } else {
        !expected_lower.is_empty() && actual_lower.contains(&expected_lower)
    };
    (wants_success && signals_success) || literal
}

fn has_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric()).any(|w| w == word)
}

/// Text used for equality: strings verbatim, null as `null`, the rest as JSON.
fn comparable_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn as_integer(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn as_millis(value: &Value) -> Option<u64> {
    match value {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(text) => text.trim().trim_end_matches("ms").trim().parse().ok(),
        _ => None,
    }
}
