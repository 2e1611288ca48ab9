//! Execution orchestrator: runs the steps of a scenario in order, threading
//! captured responses into later requests.

use crate::assertion::{ResponseSnapshot, evaluate_all};
use crate::compose::{RequestParts, apply_dependencies, build_request};
use crate::config::RunnerConfig;
use crate::context::RunContext;
use crate::dispatch::{Dispatch, HttpDispatcher, TransportError};
use crate::loader::Scenario;
use crate::path::DEFAULT_SEARCH_DEPTH;
use crate::types::{
    ExtractionRecord, FailureKind, ParamMapping, RunReport, RunStatus, ScenarioReport,
    StatusCode, Step, StepResult,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Progress events emitted during execution.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A scenario run has started.
    RunStarted { scenario: String, step_count: usize },
    /// A step is about to be composed and sent.
    StepStarted {
        scenario: String,
        order: u32,
        method: String,
        path: String,
    },
    /// A step has finished, successfully or not.
    StepCompleted {
        scenario: String,
        result: Box<StepResult>,
    },
    /// A scenario run has finished.
    RunCompleted { scenario: String, status: RunStatus },
}

/// Sender for progress events.
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Runs scenarios through a dispatcher.
#[derive(Debug, Clone)]
pub struct Runner<D> {
    dispatcher: D,
    base_url: Option<String>,
    search_depth: usize,
}

impl Runner<HttpDispatcher> {
    /// Runner over a `reqwest` client built from `config`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn from_config(config: &RunnerConfig) -> Result<Self, TransportError> {
        Ok(Self::new(HttpDispatcher::from_config(config)?)
            .with_base_url(config.base_url.clone())
            .with_search_depth(config.fallback_depth))
    }
}

impl<D: Dispatch> Runner<D> {
    #[must_use]
    pub const fn new(dispatcher: D) -> Self {
        Self {
            dispatcher,
            base_url: None,
            search_depth: DEFAULT_SEARCH_DEPTH,
        }
    }

    /// Caller base URL applied to every step (see `effective_base_url`).
    #[must_use]
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }

    #[must_use]
    pub const fn with_search_depth(mut self, depth: usize) -> Self {
        self.search_depth = depth;
        self
    }

    /// Run steps in ascending order and report one result per step.
    pub async fn run(&self, steps: &[Step]) -> RunReport {
        self.run_with_progress("", steps, None).await
    }

    /// Run steps with progress reporting.
    ///
    /// A failing step never stops the run; its failure is recorded in its
    /// result and later steps still execute.
    pub async fn run_with_progress(
        &self,
        scenario: &str,
        steps: &[Step],
        progress: Option<&ProgressSender>,
    ) -> RunReport {
        let mut ordered: Vec<&Step> = steps.iter().collect();
        ordered.sort_by_key(|step| step.order);

        if let Some(tx) = progress {
            let _ = tx.send(ProgressEvent::RunStarted {
                scenario: scenario.to_string(),
                step_count: ordered.len(),
            });
        }
        info!(scenario, steps = ordered.len(), "run started");

        let mut ctx = RunContext::new();
        let mut results = Vec::with_capacity(ordered.len());
        for step in ordered {
            if let Some(tx) = progress {
                let _ = tx.send(ProgressEvent::StepStarted {
                    scenario: scenario.to_string(),
                    order: step.order,
                    method: step.method.clone(),
                    path: step.path.clone(),
                });
            }

            let result = self.run_step(step, &ctx).await;
            info!(
                scenario,
                step = result.order,
                status = %result.status_code,
                latency_ms = result.latency_ms,
                success = result.success,
                "step finished"
            );

            if let Some(tx) = progress {
                let _ = tx.send(ProgressEvent::StepCompleted {
                    scenario: scenario.to_string(),
                    result: Box::new(result.clone()),
                });
            }
            if !ctx.record(result.clone()) {
                warn!(
                    scenario,
                    step = result.order,
                    "step order already recorded; keeping first result"
                );
            }
            results.push(result);
        }

        let report = RunReport::from_steps(results);
        if let Some(tx) = progress {
            let _ = tx.send(ProgressEvent::RunCompleted {
                scenario: scenario.to_string(),
                status: report.status,
            });
        }
        info!(scenario, status = %report.status, "run finished");
        report
    }

    async fn run_step(&self, step: &Step, ctx: &RunContext) -> StepResult {
        let mut result = StepResult::pending(step);

        let mut valid = Vec::with_capacity(step.dependencies.len());
        for mapping in &step.dependencies {
            match mapping_problem(mapping, step.order) {
                None => valid.push(mapping),
                Some(problem) => {
                    warn!(
                        step = step.order,
                        from_step = mapping.from_step,
                        "dependency rejected: {problem}"
                    );
                    result.extractions.push(ExtractionRecord::failed(mapping, problem));
                }
            }
        }

        let mut parts = RequestParts::from_step(step);
        result.extractions.extend(apply_dependencies(
            &mut parts,
            step.order,
            &valid,
            ctx,
            self.search_depth,
        ));

        let request = match build_request(step, parts, self.base_url.as_deref()) {
            Ok(request) => request,
            Err(e) => {
                warn!(step = step.order, error = %e, "could not compose request");
                result.error_message = Some(e.to_string());
                result.failure = Some(FailureKind::Composition);
                return result;
            }
        };

        result.url = request.url.to_string();
        result.method = request.method.to_string();
        result.request_body = request.body.to_value();
        result.request_query.clone_from(&request.query);
        result.request_headers.clone_from(&request.headers);

        let response = match self.dispatcher.dispatch(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(step = step.order, url = %result.url, error = %e, "request failed");
                result.error_message = Some(e.to_string());
                result.failure = Some(e.kind());
                return result;
            }
        };
        debug!(step = step.order, status = response.status, "response received");

        result.status_code = StatusCode::Code(response.status);
        result.latency_ms = response.latency_ms;
        result.response_headers = response.headers;
        result.response_body = decode_body(response.body);

        let snapshot = ResponseSnapshot {
            status: result.status_code,
            latency_ms: result.latency_ms,
            body: &result.response_body,
        };
        result.assertions = evaluate_all(&step.assertions, &snapshot);
        result.success = response.status < 400 && result.assertions.iter().all(|a| a.passed);
        result
    }
}

/// Why the step with order `reader` cannot apply `mapping`, if it cannot:
/// the mapping is incomplete, or it references the step itself or a later one.
#[must_use]
pub fn mapping_problem(mapping: &ParamMapping, reader: u32) -> Option<String> {
    if !mapping.is_complete() {
        return Some(
            "incomplete mapping: fromStep, fromField and toField are all required".to_string(),
        );
    }
    (mapping.from_step >= reader).then(|| {
        format!(
            "dependency on step {} rejected: it must reference an earlier step",
            mapping.from_step
        )
    })
}

/// Split a step's dependencies into usable ones and rejected ones
/// (see [`mapping_problem`]).
#[must_use]
pub fn partition_dependencies(step: &Step) -> (Vec<&ParamMapping>, Vec<&ParamMapping>) {
    step.dependencies
        .iter()
        .partition(|mapping| mapping_problem(mapping, step.order).is_none())
}

/// Response text as JSON when it parses, otherwise as a string.
fn decode_body(text: String) -> Value {
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

/// Default parallelism based on available CPUs.
#[must_use]
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

/// Run independent scenarios, each with its own context.
///
/// # Arguments
/// * `runner` - Runner shared by all scenarios
/// * `scenarios` - Scenarios to run
/// * `parallel` - Global limit on concurrent runs (None = sequential)
/// * `progress` - Optional progress sender for real-time updates
///
/// Reports are returned in input order.
pub async fn run_scenarios<D: Dispatch>(
    runner: &Runner<D>,
    scenarios: &[Scenario],
    parallel: Option<usize>,
    progress: Option<ProgressSender>,
) -> Vec<ScenarioReport> {
    use futures::{StreamExt, stream};

    let label = |scenario: &Scenario, report: RunReport| ScenarioReport {
        name: scenario.name.clone(),
        path: scenario.path.display().to_string(),
        report,
    };

    if let Some(n) = parallel {
        let n = n.max(1);
        let futures = scenarios.iter().enumerate().map(|(index, scenario)| {
            let progress = progress.clone();
            async move {
                let report = runner
                    .run_with_progress(&scenario.name, &scenario.steps, progress.as_ref())
                    .await;
                (index, label(scenario, report))
            }
        });

        let mut reports: Vec<(usize, ScenarioReport)> =
            stream::iter(futures).buffer_unordered(n).collect().await;
        reports.sort_by_key(|(index, _)| *index);
        reports.into_iter().map(|(_, report)| report).collect()
    } else {
        let mut reports = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            let report = runner
                .run_with_progress(&scenario.name, &scenario.steps, progress.as_ref())
                .await;
            reports.push(label(scenario, report));
        }
        reports
    }
}
