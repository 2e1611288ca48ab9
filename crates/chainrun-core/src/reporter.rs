//! Console reporter with cargo test-like formatting.

use crate::report::{failure_details, format_step_label};
use crate::types::{ExecutionSummary, ScenarioReport, StepResult};
use std::io::{self, Write};
use std::time::Duration;

/// Reporter configuration.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Show verbose output (per-assertion results).
    pub verbose: bool,
    /// Use colors in output.
    pub color: bool,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            color: true,
        }
    }
}

/// Run reporter with cargo test-like output.
#[derive(Debug, Clone)]
pub struct Reporter {
    config: ReporterConfig,
}

impl Reporter {
    /// Create a new reporter with the given configuration.
    #[must_use]
    pub const fn new(config: ReporterConfig) -> Self {
        Self { config }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if self.config.color {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn status(&self, passed: bool) -> String {
        if passed {
            self.paint("ok", "32")
        } else {
            self.paint("FAILED", "31")
        }
    }

    /// Line printed when a step finishes.
    #[must_use]
    pub fn step_line(&self, result: &StepResult) -> String {
        format!("{} ... {}", format_step_label(result), self.status(result.success))
    }

    /// Print the start of a scenario run.
    pub fn scenario_start(&self, name: &str, step_count: usize) {
        println!();
        println!("running {step_count} steps for {name}");
    }

    /// Print a step result line.
    pub fn step_result(&self, result: &StepResult) {
        println!("{}", self.step_line(result));

        if self.config.verbose {
            for assertion in &result.assertions {
                let mark = if assertion.passed {
                    self.paint("✓", "32")
                } else {
                    self.paint("✗", "31")
                };
                let field = assertion.field.as_deref().unwrap_or("");
                println!("    {mark} {} {field} (actual: {})", assertion.kind, assertion.actual);
            }
        }
    }

    /// Print failures section.
    pub fn failures(&self, scenarios: &[ScenarioReport]) {
        if scenarios.iter().all(|s| s.report.is_success()) {
            return;
        }

        println!();
        println!("failures:");
        println!();

        for scenario in scenarios {
            for step in scenario.report.steps.iter().filter(|s| !s.success) {
                println!("---- {}::step {} ----", scenario.name, step.order);
                let details = failure_details(step);
                if details.is_empty() {
                    println!("    status {}", step.status_code);
                }
                for detail in details {
                    println!("    {detail}");
                }
                println!();
            }
        }
    }

    /// Final summary line.
    #[must_use]
    pub fn summary_line(&self, summary: &ExecutionSummary, duration: Duration) -> String {
        format!(
            "run result: {}. {} passed; {} failed; {} scenarios; finished in {:.1}s",
            self.status(summary.failed_steps == 0),
            summary.passed_steps,
            summary.failed_steps,
            summary.total_scenarios,
            duration.as_secs_f64()
        )
    }

    /// Print the final summary.
    pub fn summary(&self, summary: &ExecutionSummary, duration: Duration) {
        println!();
        println!("{}", self.summary_line(summary, duration));
    }

    /// Print a warning message.
    pub fn warn(&self, message: &str) {
        eprintln!("{}: {message}", self.paint("warning", "33"));
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        eprintln!("{}: {message}", self.paint("error", "31"));
    }

    /// Flush stdout.
    pub fn flush(&self) {
        let _ = io::stdout().flush();
    }
}
