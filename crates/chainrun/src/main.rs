//! chainrun CLI - runs chained HTTP test scenarios.

use chainrun_core::{
    ApiCatalog, ConfigOverrides, ExecutionSummary, ProgressEvent, ReportFormat, Reporter,
    ReporterConfig, Runner, RunnerConfig, Scenario, ScenarioReport, StaticCatalog, StepResult,
    apply_overrides, build_execution_report, enrich_headers, format_report_json, load_config,
    load_config_file, load_scenario, resolve_scenario_paths, run_scenarios, validate_config,
};
use clap::Parser;
use comfy_table::{Cell, Color, Table};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "CHAINRUN_LOG";

// =============================================================================
// Progress Handling
// =============================================================================

/// Handles console output for table format.
struct TablePrinter {
    reporter: Reporter,
    enabled: bool,
}

impl TablePrinter {
    const fn new(reporter: Reporter, enabled: bool) -> Self {
        Self { reporter, enabled }
    }

    fn on_run_started(&self, scenario: &str, step_count: usize) {
        if !self.enabled {
            return;
        }
        self.reporter.scenario_start(scenario, step_count);
        self.reporter.flush();
    }

    fn on_step_completed(&self, result: &StepResult) {
        if !self.enabled {
            return;
        }
        self.reporter.step_result(result);
        self.reporter.flush();
    }
}

/// Exit codes for the CLI.
mod exit_code {
    pub const SUCCESS: u8 = 0;
    pub const RUN_FAILED: u8 = 1;
    pub const CONFIG_ERROR: u8 = 2;
    pub const EXECUTION_ERROR: u8 = 3;
}

#[derive(Parser)]
#[command(name = "chainrun")]
#[command(about = "Runs chained HTTP test scenarios")]
#[command(version)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Scenario files or directories (*.json, *.yaml, *.yml)
    #[arg(value_name = "SCENARIO", required = true)]
    scenarios: Vec<PathBuf>,

    /// Base URL for every step (overrides config and step base URLs)
    #[arg(long)]
    base_url: Option<String>,

    /// Per-request timeout in milliseconds (overrides config)
    #[arg(long)]
    timeout: Option<u64>,

    /// Verify TLS certificates (off by default)
    #[arg(long)]
    verify_tls: bool,

    /// API catalog file with pre-declared headers per endpoint
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Config file (default: ./chainrun.config.yaml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format: table, json
    #[arg(long, default_value = "table")]
    format: String,

    /// Number of scenarios run concurrently (0 = sequential)
    #[arg(short, long)]
    parallel: Option<usize>,

    /// Filter scenarios by name (substring match)
    #[arg(long)]
    filter: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, !cli.no_color);
    run_command(&cli).await
}

/// Log to stderr so stdout stays machine-readable.
fn init_tracing(verbose: bool, ansi: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(ansi)
                .with_target(false),
        )
        .try_init();
}

fn load_runner_config(cli: &Cli) -> Result<RunnerConfig, String> {
    let config = match &cli.config {
        Some(path) => load_config_file(path),
        None => load_config(Path::new(".")),
    }
    .map_err(|e| format!("Failed to load config: {e}"))?;

    let overrides = ConfigOverrides {
        base_url: cli.base_url.clone(),
        timeout: cli.timeout,
        verify_tls: if cli.verify_tls { Some(true) } else { None },
        parallel: cli.parallel,
    };
    let config = apply_overrides(config, &overrides);
    validate_config(&config).map_err(|e| format!("Invalid configuration: {e}"))?;
    Ok(config)
}

fn load_scenarios(inputs: &[PathBuf], filter: Option<&str>) -> Result<Vec<Scenario>, String> {
    let paths =
        resolve_scenario_paths(inputs).map_err(|e| format!("Failed to resolve scenarios: {e}"))?;
    if paths.is_empty() {
        return Err("No scenario files found".to_string());
    }

    let mut scenarios = Vec::with_capacity(paths.len());
    for path in &paths {
        let scenario = load_scenario(path).map_err(|e| format!("Failed to load scenario: {e}"))?;
        if filter.is_none_or(|f| scenario.name.contains(f)) {
            scenarios.push(scenario);
        }
    }
    Ok(scenarios)
}

fn apply_catalog(scenarios: &mut [Scenario], catalog: &impl ApiCatalog) {
    for scenario in scenarios {
        for step in &mut scenario.steps {
            enrich_headers(step, catalog);
        }
    }
}

fn print_results_table(reports: &[ScenarioReport]) {
    let mut table = Table::new();
    table.set_header(vec![
        "Scenario", "Step", "Method", "URL", "Status", "Latency", "Result",
    ]);

    for scenario in reports {
        for step in &scenario.report.steps {
            let result_cell = if step.success {
                Cell::new("ok").fg(Color::Green)
            } else {
                Cell::new("FAILED").fg(Color::Red)
            };

            table.add_row(vec![
                Cell::new(&scenario.name),
                Cell::new(step.order),
                Cell::new(&step.method),
                Cell::new(&step.url),
                Cell::new(step.status_code),
                Cell::new(format!("{}ms", step.latency_ms)),
                result_cell,
            ]);
        }
    }

    println!("{table}");
}

#[allow(clippy::too_many_lines)]
async fn run_command(cli: &Cli) -> ExitCode {
    let reporter = Reporter::new(ReporterConfig {
        verbose: cli.verbose,
        color: !cli.no_color,
    });

    // Parse format
    let report_format: ReportFormat = match cli.format.parse() {
        Ok(f) => f,
        Err(e) => {
            reporter.error(&format!("Invalid format: {e}"));
            return ExitCode::from(exit_code::CONFIG_ERROR);
        }
    };

    let config = match load_runner_config(cli) {
        Ok(config) => config,
        Err(e) => {
            reporter.error(&e);
            return ExitCode::from(exit_code::CONFIG_ERROR);
        }
    };

    let mut scenarios = match load_scenarios(&cli.scenarios, cli.filter.as_deref()) {
        Ok(scenarios) => scenarios,
        Err(e) => {
            reporter.error(&e);
            return ExitCode::from(exit_code::CONFIG_ERROR);
        }
    };

    if scenarios.is_empty() {
        reporter.warn(&format!(
            "No scenarios match filter '{}'",
            cli.filter.as_deref().unwrap_or("")
        ));
        return ExitCode::from(exit_code::SUCCESS);
    }

    let catalog = match &cli.catalog {
        Some(path) => match StaticCatalog::load(path) {
            Ok(catalog) => catalog,
            Err(e) => {
                reporter.error(&format!("Failed to load catalog: {e}"));
                return ExitCode::from(exit_code::CONFIG_ERROR);
            }
        },
        None => StaticCatalog::new(),
    };
    apply_catalog(&mut scenarios, &catalog);

    let runner = match Runner::from_config(&config) {
        Ok(runner) => runner,
        Err(e) => {
            reporter.error(&format!("Failed to initialize HTTP client: {e}"));
            return ExitCode::from(exit_code::EXECUTION_ERROR);
        }
    };

    // 0 = sequential
    let parallel = config.parallel.filter(|n| *n > 0);
    let show_progress = report_format == ReportFormat::Table;

    if show_progress {
        let parallel_str = parallel.map_or_else(String::new, |n| format!(" (parallel: {n})"));
        println!("Running {} scenario(s){parallel_str}...", scenarios.len());
    }

    // Set up progress channel for real-time output
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let table_printer = TablePrinter::new(reporter.clone(), show_progress);

    let progress_handle = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            match event {
                ProgressEvent::RunStarted {
                    scenario,
                    step_count,
                } => table_printer.on_run_started(&scenario, step_count),
                ProgressEvent::StepCompleted { result, .. } => {
                    table_printer.on_step_completed(&result);
                }
                ProgressEvent::StepStarted { .. } | ProgressEvent::RunCompleted { .. } => {}
            }
        }
    });

    let start_time = Instant::now();
    let reports = run_scenarios(&runner, &scenarios, parallel, Some(progress_tx)).await;
    let _ = progress_handle.await;
    let duration = start_time.elapsed();

    let summary = ExecutionSummary::from_scenarios(&reports);
    match report_format {
        ReportFormat::Json => {
            let report = build_execution_report(reports);
            println!("{}", format_report_json(&report));
        }
        ReportFormat::Table => {
            reporter.failures(&reports);
            if cli.verbose {
                println!("\n=== Detailed Results ===");
                print_results_table(&reports);
            }
            reporter.summary(&summary, duration);
        }
    }

    // Determine exit code based on overall pass/fail
    if summary.failed_scenarios == 0 {
        ExitCode::from(exit_code::SUCCESS)
    } else {
        ExitCode::from(exit_code::RUN_FAILED)
    }
}
