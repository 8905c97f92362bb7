//! Incremental decoder for a live `pytest -v` run.
//!
//! Phase 1 follows the progress column of the verbose report and records
//! failing tests as they happen. Phase 2, entered only if something failed,
//! captures each failure's section of the `FAILURES` report.

use serde::Serialize;
use tracing::debug;

use super::{ParseError, strip_ansi};

const SESSION_BANNER: &str = "test session starts";
const FAILURES_BANNER: &str = "FAILURES";
const BANNER_FENCE: &str = "====";
const HEADER_FENCE: &str = "____";
const FAILED_MARKER: &str = "FAILED";

/// Captured report of one failing test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestFailureReport {
    /// `path::name` as printed by the test runner.
    pub test_identifier: String,
    pub captured_output: Vec<String>,
}

impl TestFailureReport {
    /// File part of the identifier (before the first `::`).
    pub fn path(&self) -> &str {
        split_identifier(&self.test_identifier).0
    }

    /// Bare test name (after the last `::`).
    pub fn name(&self) -> &str {
        split_identifier(&self.test_identifier).1
    }
}

fn split_identifier(identifier: &str) -> (&str, &str) {
    let path = identifier
        .split_once("::")
        .map_or(identifier, |(path, _)| path);
    let name = identifier
        .rsplit_once("::")
        .map_or(identifier, |(_, name)| name);
    (path, name)
}

/// Something the display should learn about while the run is live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestRunUpdate {
    Progress { percent: u8, has_failures: bool },
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ExpectSessionBanner,
    ExpectCollecting,
    ExpectBlankAfterCollecting,
    Progress,
    ExpectFailuresBanner,
    ExpectFailureHeader(usize),
    ExpectBlankAfterHeader(usize),
    CaptureFailure(usize),
    Done,
}

impl State {
    fn expected(self) -> &'static str {
        match self {
            State::ExpectSessionBanner => "session banner",
            State::ExpectCollecting => "collection line",
            State::ExpectBlankAfterCollecting => "blank line after collection",
            State::Progress => "progress line or blank line",
            State::ExpectFailuresBanner => "FAILURES banner",
            State::ExpectFailureHeader(_) => "failure header",
            State::ExpectBlankAfterHeader(_) => "blank line after failure header",
            State::CaptureFailure(_) => "end of failure report",
            State::Done => "nothing",
        }
    }
}

/// State machine for one invocation of the test runner.
#[derive(Debug)]
pub struct TestRunParser {
    state: State,
    percent: u8,
    failures: Vec<TestFailureReport>,
}

impl Default for TestRunParser {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRunParser {
    pub fn new() -> Self {
        Self {
            state: State::ExpectSessionBanner,
            percent: 0,
            failures: Vec::new(),
        }
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Feed the next line of output (without its terminator).
    pub fn push_line(&mut self, raw: &str) -> Result<Vec<TestRunUpdate>, ParseError> {
        let clean = strip_ansi(raw);
        let line = clean.trim_end();
        let mut updates = Vec::new();

        match self.state {
            State::ExpectSessionBanner => {
                self.expect_fenced(line, BANNER_FENCE, SESSION_BANNER)?;
                self.state = State::ExpectCollecting;
            }
            State::ExpectCollecting => {
                if !line.starts_with("collecting") {
                    return Err(self.unexpected(line));
                }
                self.state = State::ExpectBlankAfterCollecting;
            }
            State::ExpectBlankAfterCollecting => {
                self.expect_blank(line)?;
                self.state = State::Progress;
            }
            State::Progress => {
                let line = line.trim();
                if line.is_empty() {
                    self.state = if self.failures.is_empty() {
                        State::Done
                    } else {
                        State::ExpectFailuresBanner
                    };
                    debug!(failures = self.failures.len(), "progress phase finished");
                    return Ok(updates);
                }
                self.percent = parse_percent(line)?;
                if line.contains(FAILED_MARKER)
                    && let Some(test) = line.split_whitespace().next()
                {
                    self.failures.push(TestFailureReport {
                        test_identifier: test.to_string(),
                        captured_output: Vec::new(),
                    });
                    updates.push(TestRunUpdate::Failed(test.to_string()));
                }
                updates.push(TestRunUpdate::Progress {
                    percent: self.percent,
                    has_failures: self.has_failures(),
                });
            }
            State::ExpectFailuresBanner => {
                self.expect_fenced(line, BANNER_FENCE, FAILURES_BANNER)?;
                self.state = State::ExpectFailureHeader(0);
            }
            State::ExpectFailureHeader(i) => {
                let name = self.failures[i].name().to_string();
                self.expect_fenced(line, HEADER_FENCE, &name)?;
                self.state = State::ExpectBlankAfterHeader(i);
            }
            State::ExpectBlankAfterHeader(i) => {
                self.expect_blank(line)?;
                self.state = State::CaptureFailure(i);
            }
            State::CaptureFailure(i) => {
                let total = self.failures.len();
                let report = &mut self.failures[i];
                let path = report.path().replace('\\', "/");
                if line.replace('\\', "/").contains(&path) {
                    self.state = if i + 1 < total {
                        State::ExpectFailureHeader(i + 1)
                    } else {
                        State::Done
                    };
                } else {
                    report.captured_output.push(raw.to_string());
                }
            }
            State::Done => {}
        }
        Ok(updates)
    }

    /// End of output. Succeeds only if the run reached its final state.
    pub fn finish(self) -> Result<Vec<TestFailureReport>, ParseError> {
        match self.state {
            State::Done => Ok(self.failures),
            state => Err(ParseError::UnexpectedEndOfStream {
                expected: state.expected().to_string(),
            }),
        }
    }

    fn expect_fenced(&self, line: &str, fence: &str, substr: &str) -> Result<(), ParseError> {
        if line.starts_with(fence) && line.ends_with(fence) && line.contains(substr) {
            Ok(())
        } else {
            Err(self.unexpected(line))
        }
    }

    fn expect_blank(&self, line: &str) -> Result<(), ParseError> {
        if line.trim().is_empty() {
            Ok(())
        } else {
            Err(self.unexpected(line))
        }
    }

    fn unexpected(&self, line: &str) -> ParseError {
        ParseError::UnexpectedLine {
            expected: self.state.expected().to_string(),
            line: line.to_string(),
        }
    }
}

/// Percentage from the trailing `[ NN%]` column of a progress line.
fn parse_percent(line: &str) -> Result<u8, ParseError> {
    line.strip_suffix("%]")
        .and_then(|head| head.rsplit_once('['))
        .and_then(|(_, digits)| digits.trim().parse::<u8>().ok())
        .ok_or_else(|| ParseError::BadProgress {
            line: line.to_string(),
        })
}
