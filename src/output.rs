use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Mutex;

use serde::Serialize;
use tracing::warn;

use crate::check::Check;
use crate::controller::{CheckState, DisplaySurface, LinterReport};
use crate::parser::Issue;
use crate::parser::test_run::TestFailureReport;

const LIGHT_RUNNING: &str = "🟡";
const LIGHT_GOOD: &str = "🟢";
const LIGHT_BAD: &str = "🔴";

/// Human-readable dashboard printed line by line.
pub struct ConsoleSurface<W: Write + Send> {
    out: Mutex<W>,
}

impl ConsoleSurface<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleSurface<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(err) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
            warn!("failed to write dashboard output: {err}");
        }
    }
}

fn format_issue(issue: &Issue) -> String {
    if issue.is_raw() {
        return format!("    {}\n", issue.raw);
    }
    let mut text = format!(
        "    {}:{}:{}  {}\n",
        issue.path,
        issue.line,
        issue.column,
        issue.messages.first().map(String::as_str).unwrap_or_default()
    );
    for extra in issue.messages.iter().skip(1) {
        text.push_str(&format!("        {extra}\n"));
    }
    text
}

impl<W: Write + Send> DisplaySurface for ConsoleSurface<W> {
    fn check_started(&self, check: &Check) {
        self.emit(&format!("{LIGHT_RUNNING} {}: running\n", check.title));
    }

    fn linter_finished(&self, _check: &Check, report: &LinterReport) {
        let light = if report.issues.is_empty() {
            LIGHT_GOOD
        } else {
            LIGHT_BAD
        };
        let mut text = format!("{light} {}\n", report.summary);
        for issue in &report.issues {
            text.push_str(&format_issue(issue));
        }
        self.emit(&text);
    }

    fn progress(&self, check: &Check, percent: u8, has_failures: bool) {
        let light = if has_failures { LIGHT_BAD } else { LIGHT_RUNNING };
        self.emit(&format!("{light} {}: {percent:>3}%\n", check.title));
    }

    fn test_run_finished(&self, check: &Check, failures: &[TestFailureReport]) {
        if failures.is_empty() {
            self.emit(&format!("{LIGHT_GOOD} {}: all tests passed\n", check.title));
            return;
        }
        let mut text = format!("{LIGHT_BAD} {}: {} failed\n", check.title, failures.len());
        for failure in failures {
            text.push_str(&format!("  {} in {}\n", failure.name(), failure.path()));
            for line in &failure.captured_output {
                text.push_str(&format!("    {line}\n"));
            }
        }
        self.emit(&text);
    }

    fn check_failed(&self, check: &Check, message: &str) {
        self.emit(&format!("{LIGHT_BAD} {}: error\n    {message}\n", check.title));
    }
}

/// Final result of one check in the JSON document.
#[derive(Debug, Clone, Serialize)]
struct CheckRecord {
    title: String,
    state: CheckState,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    issues: Vec<Issue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<TestFailureReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl CheckRecord {
    fn new(check: &Check) -> Self {
        Self {
            title: check.title.clone(),
            state: CheckState::Running,
            summary: None,
            issues: Vec::new(),
            failures: Vec::new(),
            error: None,
        }
    }
}

/// Collects final results and renders them as one JSON object keyed by check name.
#[derive(Default)]
pub struct JsonSurface {
    records: Mutex<BTreeMap<String, CheckRecord>>,
}

impl JsonSurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, check: &Check, f: impl FnOnce(&mut CheckRecord)) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let record = records
            .entry(check.name.clone())
            .or_insert_with(|| CheckRecord::new(check));
        f(record);
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        serde_json::to_string_pretty(&*records)
    }
}

impl DisplaySurface for JsonSurface {
    fn check_started(&self, check: &Check) {
        self.update(check, |record| *record = CheckRecord::new(check));
    }

    fn linter_finished(&self, check: &Check, report: &LinterReport) {
        self.update(check, |record| {
            record.state = if report.issues.is_empty() {
                CheckState::Clean
            } else {
                CheckState::Issues
            };
            record.summary = Some(report.summary.clone());
            record.issues = report.issues.clone();
        });
    }

    fn progress(&self, _check: &Check, _percent: u8, _has_failures: bool) {}

    fn test_run_finished(&self, check: &Check, failures: &[TestFailureReport]) {
        self.update(check, |record| {
            record.state = if failures.is_empty() {
                CheckState::Clean
            } else {
                CheckState::Issues
            };
            record.failures = failures.to_vec();
        });
    }

    fn check_failed(&self, check: &Check, message: &str) {
        self.update(check, |record| {
            record.state = CheckState::Error;
            record.error = Some(message.to_string());
        });
    }
}
