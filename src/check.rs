use crate::config::{CheckConfig, DevdashConfig};
use crate::parser::linter::{MultiLineGrammar, SingleLineGrammar};
use crate::parser::{Issue, IssueGrammar, parse_issues};

/// Output grammar of a linter-style tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinterGrammar {
    /// One `path:line:col: message` per line (flake8).
    SingleLine,
    /// `path:line:col: error: message` plus continuation lines (mypy).
    MultiLine,
}

impl LinterGrammar {
    /// Parse a complete batch of output lines.
    pub fn parse<S: AsRef<str>>(self, lines: &[S]) -> Vec<Issue> {
        fn collect<G: IssueGrammar, S: AsRef<str>>(grammar: G, lines: &[S]) -> Vec<Issue> {
            parse_issues(grammar, lines.iter().map(AsRef::as_ref)).collect()
        }
        match self {
            LinterGrammar::SingleLine => collect(SingleLineGrammar, lines),
            LinterGrammar::MultiLine => collect(MultiLineGrammar::default(), lines),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    /// Batch tool whose output decodes into issues.
    Linter(LinterGrammar),
    /// Live test run with progress and failure reports.
    TestRun,
}

/// One quality check shown on the dashboard.
#[derive(Debug, Clone)]
pub struct Check {
    /// Stable key (`flake8`, `mypy`, `pytest`).
    pub name: String,
    /// Human title shown by the display.
    pub title: String,
    pub command: Vec<String>,
    pub kind: CheckKind,
}

impl Check {
    fn new(name: &str, title: &str, command: &[&str], kind: CheckKind) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            command: command.iter().map(|s| s.to_string()).collect(),
            kind,
        }
    }

    pub fn flake8() -> Self {
        Self::new(
            "flake8",
            "PEP8 compliance",
            &["flake8"],
            CheckKind::Linter(LinterGrammar::SingleLine),
        )
    }

    pub fn mypy() -> Self {
        Self::new(
            "mypy",
            "Type coherence",
            &["mypy", "--ignore-missing-imports", "--show-column-numbers", "."],
            CheckKind::Linter(LinterGrammar::MultiLine),
        )
    }

    pub fn pytest() -> Self {
        Self::new(
            "pytest",
            "Unit tests",
            &["pytest", "-v", "--color=yes", "--no-header"],
            CheckKind::TestRun,
        )
    }

    fn configured(mut self, config: &CheckConfig) -> Option<Self> {
        if !config.is_enabled() {
            return None;
        }
        if let Some(command) = &config.command {
            self.command = command.clone();
        }
        Some(self)
    }
}

/// The enabled checks, in display order.
pub fn checks_from_config(config: &DevdashConfig) -> Vec<Check> {
    [
        Check::flake8().configured(&config.flake8),
        Check::mypy().configured(&config.mypy),
        Check::pytest().configured(&config.pytest),
    ]
    .into_iter()
    .flatten()
    .collect()
}
