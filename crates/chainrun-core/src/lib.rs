//! Core library for the chainrun CLI.
//!
//! This crate runs chained HTTP test scenarios:
//! - Scenario loading from JSON/YAML
//! - Dotted-path extraction with a bounded fallback search
//! - Request composition from templates and earlier responses
//! - HTTP dispatch with classified transport failures
//! - Assertion evaluation with field aliasing
//! - Report generation

pub mod assertion;
pub mod catalog;
pub mod compose;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod loader;
pub mod path;
pub mod report;
pub mod reporter;
pub mod runner;
pub mod types;

pub use assertion::{
    DEFAULT_MAX_LATENCY_MS, ResponseSnapshot, default_assertions, evaluate, evaluate_all,
    infer_field, lookup_field, resolve_alias,
};
pub use catalog::{ApiCatalog, StaticCatalog, enrich_headers, has_placeholder};
pub use compose::{
    ComposeError, ComposedRequest, LOCAL_PLACEHOLDER_BASE_URL, RequestBody, RequestParts,
    apply_dependencies, build_request, effective_base_url, sanitize_headers,
};
pub use config::{
    CONFIG_FILE_NAME, ConfigError, ConfigOverrides, RunnerConfig, apply_overrides, load_config,
    load_config_file, validate_config,
};
pub use context::RunContext;
pub use dispatch::{Dispatch, HttpDispatcher, HttpResponse, TransportError};
pub use loader::{
    DocumentFormat, LoaderError, Scenario, discover_scenario_files, load_scenario,
    parse_scenario, resolve_scenario_paths, validate_scenario,
};
pub use path::{
    DEFAULT_SEARCH_DEPTH, Located, has_content, resolve, resolve_or_search,
    resolve_or_search_where, search, search_where,
};
pub use report::{
    ReportFormat, build_execution_report, failure_details, format_report_json,
    format_step_label, timestamp_now,
};
pub use reporter::{Reporter, ReporterConfig};
pub use runner::{
    ProgressEvent, ProgressSender, Runner, default_parallelism, mapping_problem,
    partition_dependencies,
    run_scenarios,
};
pub use types::*;
