use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::debug;

/// The check command could not be started or reaped.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("empty command")]
    EmptyCommand,
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to wait for `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// A child process whose combined stdout/stderr is readable line by line
/// while it runs.
pub struct RunningCommand {
    child: Child,
    lines: mpsc::UnboundedReceiver<String>,
}

/// Fully materialized output of a finished command.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub lines: Vec<String>,
}

/// Start `argv` in `cwd` with stdout and stderr merged into one line stream.
///
/// Both pipes are drained by background tasks as fast as the child writes,
/// so a chatty child never blocks on a full pipe buffer.
pub fn spawn(argv: &[String], cwd: &Path) -> Result<RunningCommand, LaunchError> {
    let (program, args) = argv.split_first().ok_or(LaunchError::EmptyCommand)?;

    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| LaunchError::Spawn {
            program: program.clone(),
            source,
        })?;
    debug!(?argv, pid = child.id(), "spawned check command");

    let (tx, rx) = mpsc::unbounded_channel();
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, tx));
    }

    Ok(RunningCommand { child, lines: rx })
}

/// Run `argv` to completion and collect every output line.
pub async fn run_to_end(argv: &[String], cwd: &Path) -> Result<CommandOutput, LaunchError> {
    let mut command = spawn(argv, cwd)?;
    let mut lines = Vec::new();
    while let Some(line) = command.next_line().await {
        lines.push(line);
    }
    let program = argv.first().cloned().unwrap_or_default();
    let status = command
        .wait()
        .await
        .map_err(|source| LaunchError::Wait { program, source })?;
    Ok(CommandOutput { status, lines })
}

impl RunningCommand {
    /// Next output line, or None once both streams are closed.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Discard the rest of the output so the child can run to exit.
    pub async fn drain(&mut self) {
        while self.lines.recv().await.is_some() {}
    }

    pub async fn wait(mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Tear the child down.
    pub async fn kill(mut self) -> io::Result<()> {
        self.child.kill().await
    }
}

async fn forward_lines<R>(stream: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => return,
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(line).is_err() {
                    return;
                }
            }
            Err(err) => {
                debug!("output stream closed: {err}");
                return;
            }
        }
    }
}
