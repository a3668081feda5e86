//! Build subprocess supervision
//!
//! Each supervised process is owned by a dedicated task that pumps its
//! combined stdout/stderr into an event channel and reports termination
//! exactly once, on every exit path. Callers never block on the process;
//! they read events and can request termination through the handle.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const EVENT_CHANNEL_SIZE: usize = 256;

/// Event emitted by a supervised process.
///
/// Line events arrive in capture order. Exactly one `Exited` event follows
/// the last line; no line is delivered after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// One line of combined stdout/stderr output
    Line(String),
    /// The process terminated
    Exited(ExitOutcome),
}

/// How a supervised process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The process exited on its own with this code. Code -1 stands in for
    /// a process torn down by a signal nobody here sent.
    Completed(i32),
    /// The process was stopped via [`ProcessHandle::terminate`]
    Killed,
}

/// Control handle for a supervised process.
///
/// Dropping the handle does not stop the process; the supervision task
/// runs until the process exits.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: Option<u32>,
    kill_tx: mpsc::Sender<()>,
}

impl ProcessHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Request termination: SIGTERM now, SIGKILL after the grace period
    /// configured at spawn. Idempotent, returns immediately.
    pub fn terminate(&self) {
        let _ = self.kill_tx.try_send(());
    }
}

/// Spawn `command` under supervision.
///
/// Returns the control handle plus the event stream: every captured output
/// line in arrival order, then exactly one [`ProcessEvent::Exited`]. A
/// spawn failure is returned here synchronously and produces no events.
pub fn spawn_supervised(
    mut command: Command,
    grace: Duration,
) -> std::io::Result<(ProcessHandle, mpsc::Receiver<ProcessEvent>)> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    let pid = child.id();

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
    let (kill_tx, kill_rx) = mpsc::channel(1);

    let stdout_pump = child.stdout.take().map(|out| spawn_line_pump(out, event_tx.clone()));
    let stderr_pump = child.stderr.take().map(|err| spawn_line_pump(err, event_tx.clone()));

    tokio::spawn(supervise(
        child,
        pid,
        grace,
        kill_rx,
        event_tx,
        stdout_pump,
        stderr_pump,
    ));

    Ok((ProcessHandle { pid, kill_tx }, event_rx))
}

/// Forward one output pipe into the event channel, line by line.
///
/// Keeps draining to EOF even after the receiver is gone so the child can
/// never stall on a full pipe.
fn spawn_line_pump<R>(reader: R, tx: mpsc::Sender<ProcessEvent>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        let mut receiver_gone = false;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if !receiver_gone && tx.send(ProcessEvent::Line(line)).await.is_err() {
                        receiver_gone = true;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("output pipe closed early: {}", e);
                    break;
                }
            }
        }
    })
}

async fn supervise(
    mut child: Child,
    pid: Option<u32>,
    grace: Duration,
    mut kill_rx: mpsc::Receiver<()>,
    event_tx: mpsc::Sender<ProcessEvent>,
    stdout_pump: Option<JoinHandle<()>>,
    stderr_pump: Option<JoinHandle<()>>,
) {
    let mut killed = false;

    let status = tokio::select! {
        status = child.wait() => status,
        Some(()) = kill_rx.recv() => {
            killed = true;
            terminate_with_grace(&mut child, pid, grace).await
        }
    };

    // Both pipes must reach EOF before the terminal event goes out; this is
    // what guarantees no line event after Exited.
    if let Some(pump) = stdout_pump {
        let _ = pump.await;
    }
    if let Some(pump) = stderr_pump {
        let _ = pump.await;
    }

    let outcome = if killed {
        ExitOutcome::Killed
    } else {
        match status {
            Ok(status) => ExitOutcome::Completed(status.code().unwrap_or(-1)),
            Err(e) => {
                warn!(?pid, "failed to collect exit status: {}", e);
                ExitOutcome::Completed(-1)
            }
        }
    };

    debug!(?pid, ?outcome, "build process finished");
    let _ = event_tx.send(ProcessEvent::Exited(outcome)).await;
}

/// SIGTERM first; SIGKILL once the grace period runs out.
async fn terminate_with_grace(
    child: &mut Child,
    pid: Option<u32>,
    grace: Duration,
) -> std::io::Result<std::process::ExitStatus> {
    #[cfg(unix)]
    if let Some(pid) = pid {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(?pid, "process ignored SIGTERM, killing");
            let _ = child.start_kill();
            child.wait().await
        }
    }
}
