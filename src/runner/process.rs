//! Subprocess supervision
//!
//! Spawns one external command at a time, streams its output
//! incrementally, parses progress markers into structured events, and
//! enforces timeout and cancellation. Holds no mutable state across
//! invocations.

use crate::runner::progress::{parse_progress_line, RunnerEvent};
use crate::runner::tools::ToolLocator;
use crate::utils::error::ClipfetchError;
use anyhow::Result;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How many trailing output lines are retained per stream
const OUTPUT_TAIL_LINES: usize = 20;

/// How long output pipes may linger after the child exits
const DRAIN_WINDOW: Duration = Duration::from_millis(500);

/// One subprocess invocation
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Resolved executable path
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Option<Duration>,
}

/// Result of one subprocess invocation, produced exactly once per run
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// None when the child was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout_tail: Vec<String>,
    pub stderr_tail: Vec<String>,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn stderr_excerpt(&self) -> String {
        self.stderr_tail.join("\n")
    }

    /// Map a failed outcome onto the error taxonomy
    pub fn ensure_success(&self) -> Result<(), ClipfetchError> {
        if self.timed_out {
            return Err(ClipfetchError::ProcessTimedOut(self.elapsed));
        }
        if self.exit_code != Some(0) {
            return Err(ClipfetchError::ProcessFailed {
                exit_code: self.exit_code,
                stderr_tail: self.stderr_excerpt(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Spawns and supervises external commands
pub struct ProcessRunner {
    locator: ToolLocator,
    kill_grace: Duration,
}

impl ProcessRunner {
    pub fn new(locator: ToolLocator, kill_grace: Duration) -> Self {
        Self { locator, kill_grace }
    }

    /// Resolve a tool name against the injected search order
    pub fn locate_tool(&self, name: &str) -> Option<PathBuf> {
        self.locator.locate(name)
    }

    /// Run one command to completion.
    ///
    /// Output lines that parse as progress markers are forwarded as
    /// [`RunnerEvent::Progress`]; everything else goes out verbatim as
    /// [`RunnerEvent::Log`]. Cancellation and timeout both ask the
    /// child's process group to exit, then kill the group once the
    /// configured grace period runs out.
    pub async fn run(
        &self,
        request: RunRequest,
        events: mpsc::Sender<RunnerEvent>,
        cancel: CancellationToken,
    ) -> Result<ProcessOutcome> {
        let started = Instant::now();
        debug!(
            "Spawning {} {:?}",
            request.program.display(),
            request.args
        );

        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &request.working_dir {
            cmd.current_dir(dir);
        }
        // Own process group, so termination reaches grandchildren
        // forked by shell or downloader wrappers.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn()?;
        let pgid = child.id();

        let (line_tx, mut line_rx) = mpsc::channel::<(OutputStream, String)>(256);
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, OutputStream::Stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, OutputStream::Stderr, line_tx.clone());
        }
        drop(line_tx);

        let mut stdout_tail = VecDeque::with_capacity(OUTPUT_TAIL_LINES);
        let mut stderr_tail = VecDeque::with_capacity(OUTPUT_TAIL_LINES);
        let mut pipes_open = true;
        let mut timed_out = false;
        let mut terminated = false;
        let mut killed = false;

        let deadline = async {
            match request.timeout {
                Some(t) => tokio::time::sleep(t).await,
                None => futures::future::pending().await,
            }
        };
        tokio::pin!(deadline);
        // Armed only once termination starts
        let kill_timer = tokio::time::sleep(Duration::from_secs(0));
        tokio::pin!(kill_timer);

        // The child's exit ends the loop. Waiting for pipe EOF instead
        // would hang on a grandchild that inherited the write ends.
        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,
                line = line_rx.recv(), if pipes_open => {
                    match line {
                        Some((stream, text)) => {
                            forward_line(
                                stream,
                                text,
                                &mut stdout_tail,
                                &mut stderr_tail,
                                &events,
                            )
                            .await;
                        }
                        None => pipes_open = false,
                    }
                }
                _ = cancel.cancelled(), if !terminated => {
                    debug!("Cancellation requested, asking process group to exit");
                    terminated = true;
                    request_group_exit(pgid);
                    kill_timer
                        .as_mut()
                        .reset(tokio::time::Instant::now() + self.kill_grace);
                }
                _ = &mut deadline, if !terminated => {
                    warn!(
                        "Process exceeded deadline of {:?}, asking process group to exit",
                        request.timeout
                    );
                    timed_out = true;
                    terminated = true;
                    request_group_exit(pgid);
                    kill_timer
                        .as_mut()
                        .reset(tokio::time::Instant::now() + self.kill_grace);
                }
                _ = &mut kill_timer, if terminated && !killed => {
                    warn!("Grace period expired, killing process group");
                    killed = true;
                    kill_group(pgid);
                    let _ = child.start_kill();
                }
            }
        };

        // Collect what the readers still hold. Time-bounded: an
        // orphaned grandchild can keep the pipes open indefinitely.
        let drain_until = tokio::time::Instant::now() + DRAIN_WINDOW;
        while pipes_open {
            match tokio::time::timeout_at(drain_until, line_rx.recv()).await {
                Ok(Some((stream, text))) => {
                    forward_line(stream, text, &mut stdout_tail, &mut stderr_tail, &events)
                        .await;
                }
                Ok(None) => pipes_open = false,
                Err(_) => {
                    debug!("Output pipes still open after exit, dropping the rest");
                    break;
                }
            }
        }

        let outcome = ProcessOutcome {
            exit_code: status.code(),
            stdout_tail: stdout_tail.into_iter().collect(),
            stderr_tail: stderr_tail.into_iter().collect(),
            timed_out,
            elapsed: started.elapsed(),
        };
        debug!(
            "Process finished: exit={:?} timed_out={} elapsed={:?}",
            outcome.exit_code, outcome.timed_out, outcome.elapsed
        );
        Ok(outcome)
    }
}

async fn forward_line(
    stream: OutputStream,
    text: String,
    stdout_tail: &mut VecDeque<String>,
    stderr_tail: &mut VecDeque<String>,
    events: &mpsc::Sender<RunnerEvent>,
) {
    push_tail(
        match stream {
            OutputStream::Stdout => stdout_tail,
            OutputStream::Stderr => stderr_tail,
        },
        &text,
    );
    let event = match parse_progress_line(&text) {
        Some(progress) => RunnerEvent::Progress(progress),
        None => RunnerEvent::Log(text),
    };
    // A closed receiver means nobody is listening; the run carries on.
    let _ = events.send(event).await;
}

/// Ask the whole process group to exit. A child that traps the signal
/// gets the grace period to finish cleanly.
#[cfg(unix)]
fn request_group_exit(pgid: Option<u32>) {
    signal_group(pgid, libc::SIGTERM);
}

#[cfg(not(unix))]
fn request_group_exit(_pgid: Option<u32>) {}

#[cfg(unix)]
fn kill_group(pgid: Option<u32>) {
    signal_group(pgid, libc::SIGKILL);
}

#[cfg(not(unix))]
fn kill_group(_pgid: Option<u32>) {}

/// A negative pid addresses every process in the group
#[cfg(unix)]
fn signal_group(pgid: Option<u32>, signal: libc::c_int) {
    if let Some(pgid) = pgid {
        unsafe {
            libc::kill(-(pgid as i32), signal);
        }
    }
}

fn spawn_line_reader<R>(reader: R, stream: OutputStream, tx: mpsc::Sender<(OutputStream, String)>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send((stream, line)).await.is_err() {
                break;
            }
        }
    });
}

fn push_tail(tail: &mut VecDeque<String>, line: &str) {
    if tail.len() == OUTPUT_TAIL_LINES {
        tail.pop_front();
    }
    tail.push_back(line.to_string());
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;
    use crate::runner::progress::RunnerEvent;

    fn runner() -> ProcessRunner {
        ProcessRunner::new(ToolLocator::default(), Duration::from_millis(100))
    }

    fn sh(script: &str, timeout: Option<Duration>) -> RunRequest {
        RunRequest {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: None,
            timeout,
        }
    }

    #[tokio::test]
    async fn test_run_captures_output_and_exit_code() {
        let (tx, mut rx) = mpsc::channel(32);
        let outcome = runner()
            .run(sh("echo hello; echo oops >&2", None), tx, CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.success());
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout_tail, vec!["hello".to_string()]);
        assert_eq!(outcome.stderr_tail, vec!["oops".to_string()]);
        assert!(!outcome.timed_out);

        let mut saw_log = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, RunnerEvent::Log(ref l) if l == "hello") {
                saw_log = true;
            }
        }
        assert!(saw_log, "stdout line should be forwarded as a log event");
    }

    #[tokio::test]
    async fn test_run_nonzero_exit_maps_to_process_failed() {
        let (tx, _rx) = mpsc::channel(32);
        let outcome = runner()
            .run(sh("echo broken >&2; exit 3", None), tx, CancellationToken::new())
            .await
            .unwrap();

        assert!(!outcome.success());
        assert_eq!(outcome.exit_code, Some(3));

        let err = outcome.ensure_success().unwrap_err();
        match err {
            ClipfetchError::ProcessFailed { exit_code, stderr_tail } => {
                assert_eq!(exit_code, Some(3));
                assert!(stderr_tail.contains("broken"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_emits_progress_events() {
        let (tx, mut rx) = mpsc::channel(32);
        let script = "echo '[download]  50.0% of 2.00MiB at 1.00MiB/s ETA 00:01'";
        runner()
            .run(sh(script, None), tx, CancellationToken::new())
            .await
            .unwrap();

        let event = rx.recv().await.expect("one event expected");
        match event {
            RunnerEvent::Progress(p) => {
                assert_eq!(p.fraction, Some(0.5));
                assert_eq!(p.rate_label.as_deref(), Some("1.00MiB/s"));
            }
            RunnerEvent::Log(l) => panic!("expected progress event, got log: {}", l),
        }
    }

    #[tokio::test]
    async fn test_run_timeout_kills_child() {
        let (tx, _rx) = mpsc::channel(32);
        let started = Instant::now();
        let outcome = runner()
            .run(
                sh("sleep 30", Some(Duration::from_millis(100))),
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(outcome.timed_out);
        assert!(!outcome.success());
        assert_eq!(outcome.exit_code, None, "killed child has no exit code");
        assert!(started.elapsed() < Duration::from_secs(5));

        match outcome.ensure_success().unwrap_err() {
            ClipfetchError::ProcessTimedOut(_) => {}
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_cancellation_terminates_within_grace() {
        let (tx, _rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let outcome = runner()
            .run(sh("sleep 30", None), tx, cancel)
            .await
            .unwrap();

        assert!(!outcome.timed_out, "cancellation is not a timeout");
        assert_eq!(outcome.exit_code, None);
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "child must be gone shortly after the grace period"
        );
    }

    #[tokio::test]
    async fn test_run_returns_when_grandchild_holds_pipes() {
        // A backgrounded grandchild inherits the output pipes; run()
        // must return on the child's exit, not on pipe EOF.
        let (tx, _rx) = mpsc::channel(32);
        let started = Instant::now();
        let outcome = runner()
            .run(
                sh("echo started; sleep 30 &", None),
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(outcome.success());
        assert_eq!(outcome.stdout_tail, vec!["started".to_string()]);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancellation_signals_before_killing() {
        // A child that traps the exit signal gets to finish cleanly
        // within the grace period.
        let (tx, _rx) = mpsc::channel(32);
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let script = "trap 'echo got-term; exit 0' TERM; echo ready; while :; do :; done";
        let outcome = runner().run(sh(script, None), tx, cancel).await.unwrap();

        assert_eq!(outcome.exit_code, Some(0), "clean exit from the trap");
        assert!(
            outcome.stdout_tail.contains(&"got-term".to_string()),
            "trap must have run: {:?}",
            outcome.stdout_tail
        );
    }

    #[tokio::test]
    async fn test_output_tail_is_bounded() {
        let (tx, mut rx) = mpsc::channel(2048);
        let outcome = runner()
            .run(
                sh("i=0; while [ $i -lt 100 ]; do echo line $i; i=$((i+1)); done", None),
                tx,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.stdout_tail.len(), OUTPUT_TAIL_LINES);
        assert_eq!(outcome.stdout_tail.last().unwrap(), "line 99");

        // All 100 lines still went out as events
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 100);
    }
}
