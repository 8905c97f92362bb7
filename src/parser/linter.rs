//! Grammars for linter-style tools that print one diagnostic per line
//! (flake8) or diagnostics with continuation lines (mypy).

use tracing::trace;

use super::{Issue, IssueGrammar};

/// `path:line:column: message`, one diagnostic per line.
#[derive(Debug, Default)]
pub struct SingleLineGrammar;

impl IssueGrammar for SingleLineGrammar {
    fn push_line(&mut self, line: &str) -> Vec<Issue> {
        let fields: Vec<&str> = line.splitn(4, ':').collect();
        if let [path, lineno, column, message] = fields[..] {
            let message = message.trim();
            if [path, lineno, column, message].iter().all(|f| f.is_empty()) {
                return Vec::new();
            }
            return vec![Issue::structured(
                path,
                lineno,
                column,
                vec![message.to_string()],
            )];
        }

        let line = line.trim();
        if line.is_empty() {
            Vec::new()
        } else {
            vec![Issue::raw(line)]
        }
    }

    fn finish(self) -> Vec<Issue> {
        Vec::new()
    }
}

const ERROR_MARKER: &str = "error:";
const SUMMARY_PREFIX: &str = "Found ";

/// `path:line:column: error: message` followed by `...: detail` continuation lines.
#[derive(Debug, Default)]
pub struct MultiLineGrammar {
    open: Option<Issue>,
}

impl IssueGrammar for MultiLineGrammar {
    fn push_line(&mut self, line: &str) -> Vec<Issue> {
        if line.starts_with(SUMMARY_PREFIX) {
            return Vec::new();
        }

        let mut done = Vec::new();
        if let Some((head, tail)) = line.split_once(ERROR_MARKER) {
            done.extend(self.open.take());
            let mut location = head.split(':').map(str::trim);
            let path = location.next().unwrap_or_default();
            let lineno = location.next().unwrap_or_default();
            let column = location.next().unwrap_or_default();
            self.open = Some(Issue::structured(
                path,
                lineno,
                column,
                vec![tail.trim().to_string()],
            ));
        } else if let Some((_, detail)) = line.rsplit_once(": ") {
            match self.open.as_mut() {
                Some(issue) => issue.messages.push(detail.trim().to_string()),
                None => trace!(line, "continuation without open diagnostic"),
            }
        } else {
            done.extend(self.open.take());
            let line = line.trim();
            if !line.is_empty() {
                done.push(Issue::raw(line));
            }
        }
        done
    }

    fn finish(self) -> Vec<Issue> {
        self.open.into_iter().collect()
    }
}
