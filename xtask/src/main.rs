use std::env;
use std::path::PathBuf;
use std::process::{Command, ExitCode};

use anyhow::{Context, Result, bail};
use chainrun_core::{
    AssertionKind, Scenario, load_scenario, mapping_problem, resolve_scenario_paths,
};
use clap::{Parser, Subcommand};

/// Scenarios the CLI tests run against.
const FIXTURE_SCENARIOS: &str = "crates/chainrun/tests/fixtures/scenarios";

#[derive(Parser)]
#[command(name = "xtask", about = "Build tasks for chainrun")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run cargo fmt --check
    Fmt,
    /// Run cargo check
    Check,
    /// Run cargo clippy
    Clippy,
    /// Run cargo test
    Test,
    /// Run all CI checks (fmt, check, clippy, test, lint)
    Ci,
    /// Load scenario files and report entries the runner would reject
    Lint {
        /// Scenario files or directories (default: the CLI test fixtures)
        paths: Vec<PathBuf>,
    },
    /// Run chainrun against scenario files or directories
    Run {
        /// Arguments to pass to chainrun
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
    /// Build release and install to ~/.chainrun/bin/
    Install,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {e:?}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Fmt => cmd_fmt(),
        Commands::Check => cmd_check(),
        Commands::Clippy => cmd_clippy(),
        Commands::Test => cmd_test(),
        Commands::Ci => cmd_ci(),
        Commands::Lint { paths } => cmd_lint(&paths),
        Commands::Run { args } => cmd_run(&args),
        Commands::Install => cmd_install(),
    }
}

fn cmd_fmt() -> Result<()> {
    cargo(&["fmt", "--all", "--check"])
}

fn cmd_check() -> Result<()> {
    cargo(&["check", "--workspace", "--all-targets"])
}

fn cmd_clippy() -> Result<()> {
    cargo(&["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])
}

fn cmd_test() -> Result<()> {
    cargo(&["test", "--workspace"])
}

fn cmd_ci() -> Result<()> {
    cmd_fmt()?;
    cmd_check()?;
    cmd_clippy()?;
    cmd_test()?;
    cmd_lint(&[])
}

fn cmd_lint(paths: &[PathBuf]) -> Result<()> {
    let inputs = if paths.is_empty() {
        vec![PathBuf::from(FIXTURE_SCENARIOS)]
    } else {
        paths.to_vec()
    };
    let files = resolve_scenario_paths(&inputs).context("Failed to resolve scenario paths")?;
    if files.is_empty() {
        bail!("no scenario files found");
    }

    let mut flagged = 0;
    for file in &files {
        let scenario = match load_scenario(file) {
            Ok(scenario) => scenario,
            Err(e) => {
                eprintln!("{}: {e}", file.display());
                flagged += 1;
                continue;
            }
        };
        let issues = scenario_issues(&scenario);
        if issues.is_empty() {
            println!("ok    {} ({} steps)", file.display(), scenario.steps.len());
        } else {
            flagged += 1;
            for issue in issues {
                eprintln!("{}: {issue}", file.display());
            }
        }
    }

    if flagged > 0 {
        bail!("{flagged} of {} scenario file(s) need attention", files.len());
    }
    Ok(())
}

/// Entries that load fine but fail at run time.
fn scenario_issues(scenario: &Scenario) -> Vec<String> {
    let mut issues = Vec::new();
    for step in &scenario.steps {
        for mapping in &step.dependencies {
            if let Some(problem) = mapping_problem(mapping, step.order) {
                issues.push(format!("step {}: {problem}", step.order));
            }
        }
        let unsupported = step
            .assertions
            .iter()
            .filter(|a| a.kind == AssertionKind::Unsupported)
            .count();
        if unsupported > 0 {
            issues.push(format!(
                "step {}: {unsupported} assertion(s) with a missing or unknown type",
                step.order
            ));
        }
    }
    issues
}

fn cmd_run(args: &[String]) -> Result<()> {
    if args.is_empty() {
        bail!("no scenario given; usage: xtask run <SCENARIO>... [OPTIONS]");
    }
    let mut cmd_args = vec!["run", "-p", "chainrun", "--release", "--"];
    cmd_args.extend(args.iter().map(String::as_str));
    cargo(&cmd_args)
}

fn cmd_install() -> Result<()> {
    cargo(&["build", "--release", "-p", "chainrun"])?;

    let home = env::var_os("HOME").context("HOME environment variable not set")?;
    let bin_dir = PathBuf::from(home).join(".chainrun/bin");

    std::fs::create_dir_all(&bin_dir)
        .with_context(|| format!("Failed to create directory: {}", bin_dir.display()))?;

    let src = PathBuf::from("target/release").join("chainrun");
    let dst = bin_dir.join("chainrun");
    std::fs::copy(&src, &dst)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
    println!("Installed: {}", dst.display());

    println!();
    println!("Add to shell profile:");
    println!("  export PATH={}:$PATH", bin_dir.display());

    Ok(())
}

fn cargo(args: &[&str]) -> Result<()> {
    exec("cargo", args)
}

fn exec(program: &str, args: &[&str]) -> Result<()> {
    let cmd_line = format!("{program} {}", args.join(" "));
    eprintln!("$ {cmd_line}");

    let status = Command::new(program)
        .args(args)
        .status()
        .with_context(|| format!("Failed to execute: {cmd_line}"))?;

    if !status.success() {
        let code_info = match status.code() {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        };
        bail!("{cmd_line}: {code_info}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainrun_core::{DocumentFormat, parse_scenario};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_scenario_issues_lists_runtime_rejections() -> TestResult {
        let content = r#"[
            {"order": 1, "method": "GET", "path": "/a",
             "dependencies": [{"fromStep": 2, "fromField": "id", "toField": "id"}]},
            {"order": 2, "method": "GET", "path": "/b",
             "dependencies": [{"fromField": "id", "toField": "id"}],
             "assertions": [{"type": "status_code", "expected": 200}, {"field": "code"}]}
        ]"#;
        let scenario = parse_scenario(content, DocumentFormat::Json, "lint")?;

        let issues = scenario_issues(&scenario);
        assert_eq!(issues.len(), 3);
        assert!(issues[0].starts_with("step 1: dependency on step 2"));
        assert!(issues[1].contains("incomplete mapping"));
        assert!(issues[2].contains("1 assertion(s)"));
        Ok(())
    }

    #[test]
    fn test_clean_scenario_has_no_issues() -> TestResult {
        let content = r#"[
            {"order": 1, "method": "POST", "path": "/login"},
            {"order": 2, "method": "GET", "path": "/me",
             "dependencies": [{"fromStep": 1, "fromField": "token", "toField": "token"}]}
        ]"#;
        let scenario = parse_scenario(content, DocumentFormat::Json, "clean")?;
        assert!(scenario_issues(&scenario).is_empty());
        Ok(())
    }
}
