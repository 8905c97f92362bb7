pub mod linter;
pub mod test_run;

use std::borrow::Cow;
use std::collections::VecDeque;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// One diagnostic reported by a linter-style tool.
///
/// Either the structured fields (`path`, `line`, `column`, `messages`) are
/// populated, or only `raw` is, holding a line the grammar could not decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub path: String,
    pub line: String,
    pub column: String,
    pub messages: Vec<String>,
    pub raw: String,
}

impl Issue {
    pub fn structured(
        path: impl Into<String>,
        line: impl Into<String>,
        column: impl Into<String>,
        messages: Vec<String>,
    ) -> Self {
        Self {
            path: path.into(),
            line: line.into(),
            column: column.into(),
            messages,
            raw: String::new(),
        }
    }

    pub fn raw(line: impl Into<String>) -> Self {
        Self {
            path: String::new(),
            line: String::new(),
            column: String::new(),
            messages: Vec::new(),
            raw: line.into(),
        }
    }

    pub fn is_raw(&self) -> bool {
        self.messages.is_empty() && !self.raw.is_empty()
    }
}

/// An incremental decoder turning tool output lines into `Issue`s.
///
/// A fresh grammar is used for every run of the tool.
pub trait IssueGrammar {
    /// Feed one line (without its terminator). Returns the issues it completed.
    fn push_line(&mut self, line: &str) -> Vec<Issue>;

    /// Signal end of input and flush whatever is still open.
    fn finish(self) -> Vec<Issue>;
}

/// Lazily decode `lines` with `grammar`.
pub fn parse_issues<G, I>(grammar: G, lines: I) -> Issues<G, I::IntoIter>
where
    G: IssueGrammar,
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    Issues {
        grammar: Some(grammar),
        lines: lines.into_iter(),
        ready: VecDeque::new(),
    }
}

/// Iterator returned by [`parse_issues`].
pub struct Issues<G, I> {
    grammar: Option<G>,
    lines: I,
    ready: VecDeque<Issue>,
}

impl<G, I> Iterator for Issues<G, I>
where
    G: IssueGrammar,
    I: Iterator,
    I::Item: AsRef<str>,
{
    type Item = Issue;

    fn next(&mut self) -> Option<Issue> {
        loop {
            if let Some(issue) = self.ready.pop_front() {
                return Some(issue);
            }
            let grammar = self.grammar.as_mut()?;
            match self.lines.next() {
                Some(line) => self.ready.extend(grammar.push_line(line.as_ref())),
                None => {
                    let grammar = self.grammar.take()?;
                    self.ready.extend(grammar.finish());
                }
            }
        }
    }
}

/// Structural mismatch between tool output and the expected grammar.
///
/// Distinct from "no issues": the run is reported as an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("expected {expected}, got line [{line}]")]
    UnexpectedLine { expected: String, line: String },
    #[error("output ended while expecting {expected}")]
    UnexpectedEndOfStream { expected: String },
    #[error("no progress percentage in line [{line}]")]
    BadProgress { line: String },
}

static ANSI_ESCAPE: OnceLock<Regex> = OnceLock::new();

/// Remove terminal color sequences (`ESC[...m`).
pub fn strip_ansi(s: &str) -> Cow<'_, str> {
    ANSI_ESCAPE
        .get_or_init(|| Regex::new("\x1b\\[.+?m").expect("invalid ANSI escape regex"))
        .replace_all(s, "")
}
