use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::check::{Check, CheckKind, LinterGrammar};
use crate::parser::test_run::{TestFailureReport, TestRunParser, TestRunUpdate};
use crate::parser::{Issue, ParseError};
use crate::runner::{self, LaunchError};

/// Lifecycle of one monitored check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    Idle,
    Running,
    Clean,
    Issues,
    Error,
}

/// How a single run of a check ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Clean,
    Issues(usize),
    Error(String),
}

impl CheckOutcome {
    pub fn state(&self) -> CheckState {
        match self {
            CheckOutcome::Clean => CheckState::Clean,
            CheckOutcome::Issues(_) => CheckState::Issues,
            CheckOutcome::Error(_) => CheckState::Error,
        }
    }
}

/// Why a run could not produce a result.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error("unexpected output: {0}")]
    Parse(#[from] ParseError),
    #[error("failed to wait for check command: {0}")]
    Wait(#[from] std::io::Error),
}

/// Result of a linter-style run, as handed to the display.
#[derive(Debug, Clone, Serialize)]
pub struct LinterReport {
    pub title: String,
    pub issues: Vec<Issue>,
    pub summary: String,
}

impl LinterReport {
    pub fn new(title: &str, issues: Vec<Issue>) -> Self {
        let summary = if issues.is_empty() {
            format!("{title}: all good!")
        } else {
            format!("{title}: {} issues", issues.len())
        };
        Self {
            title: title.to_string(),
            issues,
            summary,
        }
    }
}

/// Sink for everything the dashboard shows. Implementations decide how to render.
pub trait DisplaySurface: Send + Sync {
    fn check_started(&self, check: &Check);
    fn linter_finished(&self, check: &Check, report: &LinterReport);
    fn progress(&self, check: &Check, percent: u8, has_failures: bool);
    fn test_run_finished(&self, check: &Check, failures: &[TestFailureReport]);
    fn check_failed(&self, check: &Check, message: &str);
}

#[derive(Debug)]
struct SlotStatus {
    state: CheckState,
    in_flight: bool,
    pending: bool,
}

struct Slot {
    check: Check,
    status: Mutex<SlotStatus>,
    idle: Notify,
}

impl Slot {
    fn status(&self) -> MutexGuard<'_, SlotStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Inner {
    slots: Vec<Arc<Slot>>,
    surface: Arc<dyn DisplaySurface>,
    cwd: PathBuf,
    /// Tools run one at a time; they share the project tree.
    run_lock: tokio::sync::Mutex<()>,
}

/// Runs checks on demand, at most one invocation per check at a time.
///
/// A trigger that arrives while the check is running is remembered and
/// causes exactly one more run; further triggers in that window coalesce.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Controller {
    pub fn new(checks: Vec<Check>, surface: Arc<dyn DisplaySurface>, cwd: &Path) -> Self {
        let slots = checks
            .into_iter()
            .map(|check| {
                Arc::new(Slot {
                    check,
                    status: Mutex::new(SlotStatus {
                        state: CheckState::Idle,
                        in_flight: false,
                        pending: false,
                    }),
                    idle: Notify::new(),
                })
            })
            .collect();
        Self {
            inner: Arc::new(Inner {
                slots,
                surface,
                cwd: cwd.to_path_buf(),
                run_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn checks(&self) -> impl Iterator<Item = &Check> {
        self.inner.slots.iter().map(|s| &s.check)
    }

    pub fn trigger_all(&self) {
        for slot in &self.inner.slots {
            self.schedule(Arc::clone(slot));
        }
    }

    /// Request a run of the named check. Returns false for an unknown name.
    pub fn trigger(&self, name: &str) -> bool {
        match self.slot(name) {
            Some(slot) => {
                self.schedule(slot);
                true
            }
            None => false,
        }
    }

    pub fn state(&self, name: &str) -> Option<CheckState> {
        self.slot(name).map(|slot| slot.status().state)
    }

    /// Wait until no check is running or queued.
    pub async fn wait_idle(&self) {
        for slot in &self.inner.slots {
            loop {
                let notified = slot.idle.notified();
                if !slot.status().in_flight {
                    break;
                }
                notified.await;
            }
        }
    }

    fn slot(&self, name: &str) -> Option<Arc<Slot>> {
        self.inner
            .slots
            .iter()
            .find(|s| s.check.name == name)
            .cloned()
    }

    fn schedule(&self, slot: Arc<Slot>) {
        {
            let mut status = slot.status();
            if status.in_flight {
                debug!(check = %slot.check.name, "run in progress, queueing rerun");
                status.pending = true;
                return;
            }
            status.in_flight = true;
            status.state = CheckState::Running;
        }
        let this = self.clone();
        tokio::spawn(async move { this.worker(slot).await });
    }

    async fn worker(&self, slot: Arc<Slot>) {
        loop {
            let outcome = {
                let _guard = self.inner.run_lock.lock().await;
                run_check(&slot.check, &self.inner.cwd, self.inner.surface.as_ref()).await
            };
            info!(check = %slot.check.name, ?outcome, "check finished");

            let mut status = slot.status();
            if status.pending {
                status.pending = false;
                status.state = CheckState::Running;
                continue;
            }
            status.state = outcome.state();
            status.in_flight = false;
            drop(status);
            slot.idle.notify_waiters();
            return;
        }
    }
}

/// Run `check` once in `cwd`, publishing progress and results to `surface`.
///
/// Launch failures and structural parse errors are reported through
/// `check_failed` and come back as `CheckOutcome::Error`.
pub async fn run_check(check: &Check, cwd: &Path, surface: &dyn DisplaySurface) -> CheckOutcome {
    surface.check_started(check);
    let result = match check.kind {
        CheckKind::Linter(grammar) => run_linter(check, grammar, cwd, surface).await,
        CheckKind::TestRun => run_test_run(check, cwd, surface).await,
    };
    match result {
        Ok(outcome) => outcome,
        Err(err) => {
            let message = err.to_string();
            warn!(check = %check.name, "{message}");
            surface.check_failed(check, &message);
            CheckOutcome::Error(message)
        }
    }
}

async fn run_linter(
    check: &Check,
    grammar: LinterGrammar,
    cwd: &Path,
    surface: &dyn DisplaySurface,
) -> Result<CheckOutcome, CheckError> {
    let output = runner::run_to_end(&check.command, cwd).await?;
    debug!(check = %check.name, status = %output.status, lines = output.lines.len(), "command exited");

    let report = LinterReport::new(&check.title, grammar.parse(&output.lines));
    surface.linter_finished(check, &report);
    Ok(match report.issues.len() {
        0 => CheckOutcome::Clean,
        n => CheckOutcome::Issues(n),
    })
}

async fn run_test_run(
    check: &Check,
    cwd: &Path,
    surface: &dyn DisplaySurface,
) -> Result<CheckOutcome, CheckError> {
    let mut command = runner::spawn(&check.command, cwd)?;
    let mut parser = TestRunParser::new();

    while let Some(line) = command.next_line().await {
        let updates = match parser.push_line(&line) {
            Ok(updates) => updates,
            Err(err) => {
                if let Err(kill_err) = command.kill().await {
                    debug!("failed to kill {}: {kill_err}", check.name);
                }
                return Err(err.into());
            }
        };
        for update in updates {
            match update {
                TestRunUpdate::Progress {
                    percent,
                    has_failures,
                } => surface.progress(check, percent, has_failures),
                TestRunUpdate::Failed(test) => debug!(%test, "test failed"),
            }
        }
        if parser.is_done() {
            command.drain().await;
        }
    }

    let status = command.wait().await?;
    debug!(check = %check.name, %status, "command exited");

    let failures = parser.finish()?;
    surface.test_run_finished(check, &failures);
    Ok(match failures.len() {
        0 => CheckOutcome::Clean,
        n => CheckOutcome::Issues(n),
    })
}
