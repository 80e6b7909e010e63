use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::message::OutboundMessage;
use crate::session::Session;

const STDERR_TAIL_LINES: usize = 20;
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Distinguishes runs that reused a request id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(pub u64);

/// How an operation process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Exit code 0.
    Success,
    /// Non-zero exit code or a spawn/wait error, with a diagnostic.
    Failure(String),
    /// No exit code: the process was killed by a signal.
    Killed,
}

/// Posted back to the hub when a run's process is gone.
#[derive(Debug)]
pub struct RunExit {
    pub request_id: String,
    pub run: RunId,
    pub outcome: RunOutcome,
}

/// One live operation process.
pub struct CommandRun {
    id: RunId,
    session: Session,
    command: String,
    cancel: CancellationToken,
    started_at: Instant,
}

impl fmt::Debug for CommandRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRun")
            .field("id", &self.id)
            .field("session", &self.session.id())
            .field("command", &self.command)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("elapsed", &self.started_at.elapsed())
            .finish()
    }
}

impl CommandRun {
    pub fn new(id: RunId, session: Session, command: String) -> Self {
        Self {
            id,
            session,
            command,
            cancel: CancellationToken::new(),
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Ask the supervising task to kill the process. Idempotent.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Drive `child` to completion, forwarding JSON stdout lines to `session`,
/// then report the outcome on `exits`.
pub(crate) async fn supervise(
    mut child: Child,
    request_id: String,
    run: RunId,
    session: Session,
    cancel: CancellationToken,
    exits: mpsc::UnboundedSender<RunExit>,
) {
    let stderr_tail = child.stderr.take().map(|stderr| tokio::spawn(collect_tail(stderr)));
    let mut stdout = child.stdout.take().map(|stdout| BufReader::new(stdout).lines());
    let mut stdout_open = stdout.is_some();
    let mut kill_requested = false;
    let mut kill_sent = false;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            _ = cancel.cancelled(), if !kill_requested => {
                kill_requested = true;
            }
            line = next_line(&mut stdout), if stdout_open => match line {
                Ok(Some(line)) => forward_line(&session, &request_id, &line),
                Ok(None) => stdout_open = false,
                Err(err) => {
                    debug!(request_id = %request_id, error = %err, "stdout read failed");
                    stdout_open = false;
                }
            },
        }

        if kill_requested && !kill_sent {
            kill_sent = true;
            debug!(request_id = %request_id, pid = ?child.id(), "killing operation process");
            if let Err(err) = child.start_kill() {
                debug!(request_id = %request_id, error = %err, "kill failed, process already gone");
            }
        }
    };

    // Output written just before exit is still buffered in the pipe.
    if stdout_open && !kill_requested {
        let drained = tokio::time::timeout(DRAIN_GRACE, async {
            while let Ok(Some(line)) = next_line(&mut stdout).await {
                forward_line(&session, &request_id, &line);
            }
        })
        .await;
        if drained.is_err() {
            trace!(request_id = %request_id, "stdout still open after exit");
        }
    }

    let tail = match stderr_tail {
        Some(handle) => match tokio::time::timeout(DRAIN_GRACE, handle).await {
            Ok(Ok(tail)) => tail,
            _ => String::new(),
        },
        None => String::new(),
    };

    let outcome = classify_exit(status, &tail);
    if exits
        .send(RunExit {
            request_id,
            run,
            outcome,
        })
        .is_err()
    {
        trace!("hub gone before run exit was delivered");
    }
}

/// Map a wait result to a [`RunOutcome`], folding `stderr_tail` into failures.
pub fn classify_exit(status: io::Result<ExitStatus>, stderr_tail: &str) -> RunOutcome {
    match status {
        Ok(status) if status.success() => RunOutcome::Success,
        Ok(status) => match status.code() {
            Some(code) if stderr_tail.is_empty() => {
                RunOutcome::Failure(format!("exited with code {code}"))
            }
            Some(code) => RunOutcome::Failure(format!("exited with code {code}: {stderr_tail}")),
            None => RunOutcome::Killed,
        },
        Err(err) => RunOutcome::Failure(format!("wait failed: {err}")),
    }
}

async fn next_line<R>(
    lines: &mut Option<tokio::io::Lines<BufReader<R>>>,
) -> io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    match lines {
        Some(lines) => lines.next_line().await,
        None => Ok(None),
    }
}

fn forward_line(session: &Session, request_id: &str, line: &str) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(payload) => {
            session.send(OutboundMessage::command_payload(request_id, payload));
        }
        Err(err) => {
            warn!(
                request_id = %request_id,
                error = %err,
                line = %trimmed,
                "dropping non-JSON worker output"
            );
        }
    }
}

async fn collect_tail<R>(stderr: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    #[test]
    fn zero_exit_is_success() {
        assert_eq!(
            classify_exit(Ok(ExitStatus::from_raw(0)), "noise"),
            RunOutcome::Success
        );
    }

    #[test]
    fn non_zero_exit_is_failure_with_stderr() {
        // Raw wait status: exit code lives in the high byte.
        let outcome = classify_exit(Ok(ExitStatus::from_raw(3 << 8)), "boom");
        assert_eq!(
            outcome,
            RunOutcome::Failure("exited with code 3: boom".to_string())
        );
        let quiet = classify_exit(Ok(ExitStatus::from_raw(1 << 8)), "");
        assert_eq!(quiet, RunOutcome::Failure("exited with code 1".to_string()));
    }

    #[test]
    fn signal_is_killed() {
        assert_eq!(
            classify_exit(Ok(ExitStatus::from_raw(9)), ""),
            RunOutcome::Killed
        );
    }

    #[test]
    fn wait_error_is_failure() {
        let outcome = classify_exit(Err(io::Error::other("gone")), "");
        assert!(matches!(outcome, RunOutcome::Failure(message) if message.contains("gone")));
    }

    #[tokio::test]
    async fn stderr_tail_keeps_the_last_lines() {
        let text: String = (0..30).map(|i| format!("line {i}\n")).collect();
        let tail = collect_tail(text.as_bytes()).await;
        let lines: Vec<_> = tail.lines().collect();
        assert_eq!(lines.len(), STDERR_TAIL_LINES);
        assert_eq!(lines[0], "line 10");
        assert_eq!(lines[STDERR_TAIL_LINES - 1], "line 29");
    }

    #[test]
    fn only_json_lines_are_forwarded() {
        let (session, mut out) = Session::channel();
        forward_line(&session, "r1", r#"{"status":"finish"}"#);
        forward_line(&session, "r1", "progress 50%");
        forward_line(&session, "r1", "   ");

        match out.try_recv().unwrap() {
            OutboundMessage::Command { request_id, result } => {
                assert_eq!(request_id, "r1");
                assert_eq!(result["status"], "finish");
            }
            other => panic!("unexpected message {other:?}"),
        }
        assert!(out.try_recv().is_err());
    }
}
