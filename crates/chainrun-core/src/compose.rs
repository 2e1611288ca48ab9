//! Request composition: dependency injection, header sanitization, URL
//! building and content-type driven body encoding.

use crate::context::RunContext;
use crate::path::{has_content, resolve_or_search_where, value_text};
use crate::types::{
    ExtractionRecord, ParamLocation, ParamMapping, QueryParam, Step, TargetLocation,
};
use reqwest::Method;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Base URL the generator emits when it does not know the real target.
pub const LOCAL_PLACEHOLDER_BASE_URL: &str = "http://localhost:8000";

const STRIPPED_HEADERS: [&str; 6] = [
    "host",
    "if-none-match",
    "if-modified-since",
    "content-length",
    "connection",
    "accept-encoding",
];

/// Errors that make a step template impossible to turn into a request.
#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("step {order} has no HTTP method")]
    MissingMethod { order: u32 },
    #[error("invalid HTTP method: {method}")]
    InvalidMethod { method: String },
    #[error("no base URL available for path {path}")]
    MissingBaseUrl { path: String },
    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Mutable request template of one step before URL and body are fixed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParts {
    pub body: Map<String, Value>,
    pub query: Vec<QueryParam>,
    pub headers: BTreeMap<String, String>,
}

impl RequestParts {
    #[must_use]
    pub fn from_step(step: &Step) -> Self {
        Self {
            body: step.body_params.clone(),
            query: step.query_params.entries(),
            headers: step.headers.clone(),
        }
    }
}

/// Encoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
    Multipart(Vec<(String, String)>),
    Raw(String),
}

impl RequestBody {
    /// JSON view of what was sent, for the step record.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Json(value) => value.clone(),
            Self::Form(pairs) | Self::Multipart(pairs) => Value::Object(pairs_to_map(pairs)),
            Self::Raw(text) => Value::String(text.clone()),
        }
    }
}

/// A fully composed request ready for dispatch.
#[derive(Debug, Clone)]
pub struct ComposedRequest {
    pub method: Method,
    /// Final URL including the query string.
    pub url: Url,
    pub headers: BTreeMap<String, String>,
    /// Query pairs appended to the path (excluding any embedded in the template).
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

/// Pick the base URL for a step. A caller override wins unless it is empty or
/// the local placeholder.
#[must_use]
pub fn effective_base_url(caller: Option<&str>, step: &Step) -> Option<String> {
    let caller = caller.map(str::trim).filter(|c| !c.is_empty());
    let declared = step
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty());

    match caller {
        Some(url) if !is_placeholder_base(url) => Some(url.to_string()),
        _ => declared.or(caller).map(ToString::to_string),
    }
}

fn is_placeholder_base(url: &str) -> bool {
    url.trim_end_matches('/') == LOCAL_PLACEHOLDER_BASE_URL
}

/// Apply dependency mappings of the step with order `reader` to `parts`.
///
/// Returns one record per mapping. Failed extractions leave the template value
/// in place.
pub fn apply_dependencies(
    parts: &mut RequestParts,
    reader: u32,
    mappings: &[&ParamMapping],
    ctx: &RunContext,
    search_depth: usize,
) -> Vec<ExtractionRecord> {
    mappings
        .iter()
        .map(|mapping| {
            let record = extract(mapping, reader, ctx, search_depth);
            match (&record.value, record.success) {
                (Some(value), true) => write_target(parts, mapping, value),
                _ => warn!(
                    step = reader,
                    from_step = mapping.from_step,
                    field = %mapping.from_field,
                    "extraction failed: {}",
                    record.error_message.as_deref().unwrap_or_default()
                ),
            }
            record
        })
        .collect()
}

fn extract(
    mapping: &ParamMapping,
    reader: u32,
    ctx: &RunContext,
    search_depth: usize,
) -> ExtractionRecord {
    let Some(source) = ctx.response_for(mapping.from_step, reader) else {
        return ExtractionRecord::failed(
            mapping,
            format!("step {} has no captured response", mapping.from_step),
        );
    };

    match resolve_or_search_where(source, &mapping.from_field, search_depth, has_content) {
        Some(found) => {
            let resolved_path = found.via_fallback.then_some(found.path);
            ExtractionRecord::extracted(mapping, found.value.clone(), resolved_path)
        }
        None => ExtractionRecord::failed(
            mapping,
            format!(
                "field {} not found in response of step {}",
                mapping.from_field, mapping.from_step
            ),
        ),
    }
}

fn write_target(parts: &mut RequestParts, mapping: &ParamMapping, value: &Value) {
    let (location, field) = mapping.target();
    match location {
        TargetLocation::Header => {
            let mut text = value_text(value);
            if field.eq_ignore_ascii_case("authorization") && !has_bearer_prefix(&text) {
                text = format!("Bearer {text}");
            }
            set_header(&mut parts.headers, field, text);
        }
        TargetLocation::Body => {
            parts.body.insert(field.to_string(), value.clone());
        }
        TargetLocation::Query => upsert_query(&mut parts.query, field, value.clone()),
    }
}

fn has_bearer_prefix(text: &str) -> bool {
    text.get(..7)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("bearer "))
}

fn upsert_query(query: &mut Vec<QueryParam>, name: &str, value: Value) {
    match query.iter_mut().find(|q| q.name == name) {
        Some(existing) => existing.value = value,
        None => query.push(QueryParam::query(name, value)),
    }
}

/// Case-insensitive header lookup.
#[must_use]
pub fn header_value<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Set a header, replacing any existing spelling of the same name.
pub fn set_header(headers: &mut BTreeMap<String, String>, name: &str, value: String) {
    remove_header(headers, name);
    headers.insert(name.to_string(), value);
}

fn remove_header(headers: &mut BTreeMap<String, String>, name: &str) {
    headers.retain(|key, _| !key.eq_ignore_ascii_case(name));
}

/// Strip headers that break replay and force uncached responses.
pub fn sanitize_headers(headers: &mut BTreeMap<String, String>) {
    headers.retain(|key, _| {
        !STRIPPED_HEADERS
            .iter()
            .any(|stripped| key.eq_ignore_ascii_case(stripped))
    });
    set_header(headers, "Cache-Control", "no-cache".to_string());
    set_header(headers, "Pragma", "no-cache".to_string());
}

/// Turn a step template plus injected values into a request.
///
/// # Errors
/// Returns an error if the method is missing or invalid, no base URL is known
/// for a relative path, or the resulting URL does not parse.
pub fn build_request(
    step: &Step,
    parts: RequestParts,
    caller_base: Option<&str>,
) -> Result<ComposedRequest, ComposeError> {
    let method_text = step.method.trim();
    if method_text.is_empty() {
        return Err(ComposeError::MissingMethod { order: step.order });
    }
    let method = Method::from_bytes(method_text.to_ascii_uppercase().as_bytes()).map_err(|_| {
        ComposeError::InvalidMethod {
            method: method_text.to_string(),
        }
    })?;

    let RequestParts {
        mut body,
        query,
        mut headers,
    } = parts;

    let mut path = step.path.trim().to_string();
    let mut remaining = Vec::new();
    for param in query {
        match param.location {
            ParamLocation::Path => {
                let segment = encode_path_segment(&value_text(&param.value));
                path = substitute_path_param(&path, &param.name, &segment);
            }
            ParamLocation::Query => remaining.push(param),
        }
    }

    if method == Method::GET || method == Method::HEAD {
        for (name, value) in std::mem::take(&mut body) {
            upsert_query(&mut remaining, &name, value);
        }
    }

    let base = effective_base_url(caller_base, step);
    let mut url = join_url(base.as_deref(), &path)?;
    let query_pairs = flatten_pairs(remaining.into_iter().map(|q| (q.name, q.value)));
    if !query_pairs.is_empty() {
        let mut serializer = url.query_pairs_mut();
        for (name, value) in &query_pairs {
            serializer.append_pair(name, value);
        }
    }

    sanitize_headers(&mut headers);
    let body = encode_body(body, &mut headers);

    debug!(step = step.order, %method, %url, "composed request");
    Ok(ComposedRequest {
        method,
        url,
        headers,
        query: query_pairs,
        body,
    })
}

/// Percent-encode `value` so it stays a single path segment.
fn encode_path_segment(value: &str) -> String {
    // byte_serialize writes a literal `+` as `%2B`, so every `+` left is a space.
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Replace `{name}` placeholders and `:name` path segments with `value`.
fn substitute_path_param(path: &str, name: &str, value: &str) -> String {
    let braced = path.replace(&format!("{{{name}}}"), value);
    let colon = format!(":{name}");
    let (route, query) = braced
        .split_once('?')
        .map_or((braced.as_str(), None), |(route, query)| (route, Some(query)));
    let route = route
        .split('/')
        .map(|segment| if segment == colon { value } else { segment })
        .collect::<Vec<_>>()
        .join("/");
    match query {
        Some(query) => format!("{route}?{query}"),
        None => route,
    }
}

fn join_url(base: Option<&str>, path: &str) -> Result<Url, ComposeError> {
    let lowered = path.to_ascii_lowercase();
    let raw = if lowered.starts_with("http://") || lowered.starts_with("https://") {
        path.to_string()
    } else {
        let base = base.ok_or_else(|| ComposeError::MissingBaseUrl {
            path: path.to_string(),
        })?;
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    };
    Url::parse(&raw).map_err(|source| ComposeError::InvalidUrl { url: raw, source })
}

/// Render name/value pairs as text. Arrays become repeated keys; nulls are skipped.
fn flatten_pairs(entries: impl IntoIterator<Item = (String, Value)>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (name, value) in entries {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items.iter().filter(|item| !item.is_null()) {
                    pairs.push((name.clone(), value_text(item)));
                }
            }
            other => pairs.push((name, value_text(&other))),
        }
    }
    pairs
}

fn encode_body(body: Map<String, Value>, headers: &mut BTreeMap<String, String>) -> RequestBody {
    if body.is_empty() {
        return RequestBody::Empty;
    }
    let content_type = header_value(headers, "content-type").map(str::to_ascii_lowercase);
    match content_type {
        None => {
            set_header(headers, "Content-Type", "application/json".to_string());
            RequestBody::Json(Value::Object(body))
        }
        Some(ct) if ct.contains("x-www-form-urlencoded") => RequestBody::Form(flatten_pairs(body)),
        Some(ct) if ct.contains("multipart/form-data") => {
            // The client writes its own boundary-bearing content type.
            remove_header(headers, "content-type");
            RequestBody::Multipart(flatten_pairs(body))
        }
        Some(ct) if ct.contains("json") => RequestBody::Json(Value::Object(body)),
        Some(_) => RequestBody::Raw(Value::Object(body).to_string()),
    }
}

fn pairs_to_map(pairs: &[(String, String)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (name, value) in pairs {
        let value = Value::String(value.clone());
        match map.get_mut(name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(name.clone(), value);
            }
        }
    }
    map
}
