//! Report generation for run results.

use crate::config::ConfigError;
use crate::types::{ExecutionReport, ExecutionSummary, ScenarioReport, StepResult};
use time::OffsetDateTime;
use time::macros::format_description;

/// Format for report output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Table,
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::InvalidFormat(s.to_string())),
        }
    }
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
#[must_use]
pub fn timestamp_now() -> String {
    OffsetDateTime::now_utc()
        .format(&format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
        ))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Wrap scenario reports with a timestamp and summary counts.
#[must_use]
pub fn build_execution_report(scenarios: Vec<ScenarioReport>) -> ExecutionReport {
    let summary = ExecutionSummary::from_scenarios(&scenarios);
    ExecutionReport {
        timestamp: timestamp_now(),
        scenarios,
        summary,
    }
}

/// Generate the JSON report.
#[must_use]
pub fn format_report_json(report: &ExecutionReport) -> String {
    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
}

/// `step <order> <METHOD> <url>` label of a step line. Steps that never got
/// a URL show their order only.
#[must_use]
pub fn format_step_label(result: &StepResult) -> String {
    if result.url.is_empty() {
        format!("step {} {}", result.order, result.method)
            .trim_end()
            .to_string()
    } else {
        format!("step {} {} {}", result.order, result.method, result.url)
    }
}

/// Human-readable reasons a step failed.
#[must_use]
pub fn failure_details(result: &StepResult) -> Vec<String> {
    let mut details = Vec::new();
    if let Some(message) = &result.error_message {
        details.push(format!("error: {message}"));
    }
    for extraction in result.extractions.iter().filter(|e| !e.success) {
        details.push(format!(
            "extraction {}.{} -> {} {}: {}",
            extraction.from_step,
            extraction.from_field,
            extraction.to_location,
            extraction.to_field,
            extraction.error_message.as_deref().unwrap_or("not found")
        ));
    }
    for assertion in result.failed_assertions() {
        let expected = assertion
            .expected
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string);
        let field = assertion
            .field
            .as_deref()
            .map(|f| format!(" {f}"))
            .unwrap_or_default();
        details.push(format!(
            "assertion {}{field}: expected {expected}, got {}",
            assertion.kind, assertion.actual
        ));
    }
    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AssertionKind, AssertionResult, ExtractionRecord, ParamMapping, RunReport, Step,
        TargetLocation,
    };
    use serde_json::json;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_report_format_from_str() -> TestResult {
        assert_eq!("JSON".parse::<ReportFormat>()?, ReportFormat::Json);
        assert_eq!("table".parse::<ReportFormat>()?, ReportFormat::Table);
        assert!(matches!(
            "xml".parse::<ReportFormat>(),
            Err(ConfigError::InvalidFormat(_))
        ));
        Ok(())
    }

    #[test]
    fn test_timestamp_shape() {
        let ts = timestamp_now();
        assert_eq!(ts.len(), 24);
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[10..11], "T");
    }

    #[test]
    fn test_execution_report_json_shape() -> TestResult {
        let mut step = StepResult::pending(&Step::new(1, "get", "/x"));
        step.success = true;
        let report = build_execution_report(vec![ScenarioReport {
            name: "smoke".to_string(),
            path: "smoke.json".to_string(),
            report: RunReport::from_steps(vec![step]),
        }]);

        let value: serde_json::Value = serde_json::from_str(&format_report_json(&report))?;
        assert_eq!(value["summary"]["total_steps"], json!(1));
        assert_eq!(value["scenarios"][0]["report"]["status"], json!("success"));
        assert_eq!(value["scenarios"][0]["report"]["steps"][0]["method"], json!("GET"));
        Ok(())
    }

    #[test]
    fn test_step_label_and_failure_details() {
        let mut result = StepResult::pending(&Step::new(2, "post", "/orders"));
        assert_eq!(format_step_label(&result), "step 2 POST");

        result.url = "http://api.test/orders".to_string();
        result.error_message = Some("request timed out".to_string());
        result.extractions.push(ExtractionRecord::failed(
            &ParamMapping::new(1, "data.id", "orderId", TargetLocation::Body),
            "field data.id not found".to_string(),
        ));
        result.assertions.push(AssertionResult {
            kind: AssertionKind::FieldValue,
            field: Some("errcode".to_string()),
            expected: Some(json!(0)),
            actual: json!(1),
            passed: false,
        });

        assert_eq!(format_step_label(&result), "step 2 POST http://api.test/orders");
        assert_eq!(
            failure_details(&result),
            vec![
                "error: request timed out".to_string(),
                "extraction 1.data.id -> body orderId: field data.id not found".to_string(),
                "assertion field_value errcode: expected 0, got 1".to_string(),
            ]
        );
    }
}
