//! Build record
//!
//! Canonical state of one build attempt. The registry owns the record;
//! everything else holds `Arc` references and mutates only through these
//! methods, each taking the state lock for the minimal critical section
//! (append a line, flip the status).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, broadcast};
use uuid::Uuid;

use kiln_core::domain::{Build, BuildStatus, LogLine, RepoSource, ResourceLimits};

const BROADCAST_CAPACITY: usize = 1024;

/// Event fanned out to log subscribers of one build
#[derive(Debug, Clone)]
pub enum BuildEvent {
    /// One captured output line, in capture order
    Line(LogLine),
    /// The build reached a terminal state; the stream ends here
    Finished {
        status: BuildStatus,
        error: Option<String>,
    },
}

/// Outcome of a cancellation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The record was still queued; it moved straight to cancelled and no
    /// subprocess will ever run for it
    CancelledBeforeStart,
    /// The record was running; intent is recorded and the subprocess is
    /// being signalled
    Signalled,
    /// The record was already terminal; nothing to do
    AlreadyFinished,
}

#[derive(Debug)]
struct RecordState {
    status: BuildStatus,
    log: VecDeque<LogLine>,
    /// Number the next captured line will get; grows past the cap
    next_number: usize,
    finished_at: Option<DateTime<Utc>>,
    error: Option<String>,
    cancel_requested: bool,
}

/// State object for one build attempt
#[derive(Debug)]
pub struct BuildRecord {
    pub id: Uuid,
    pub name: String,
    pub source: RepoSource,
    pub limits: ResourceLimits,
    pub started_at: DateTime<Utc>,
    log_cap: usize,
    state: Mutex<RecordState>,
    events: broadcast::Sender<BuildEvent>,
    cancel: Notify,
}

impl BuildRecord {
    pub(crate) fn new(
        name: impl Into<String>,
        source: RepoSource,
        limits: ResourceLimits,
        log_cap: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            source,
            limits,
            started_at: Utc::now(),
            log_cap,
            state: Mutex::new(RecordState {
                status: BuildStatus::Queued,
                log: VecDeque::new(),
                next_number: 0,
                finished_at: None,
                error: None,
                cancel_requested: false,
            }),
            events,
            cancel: Notify::new(),
        }
    }

    pub fn status(&self) -> BuildStatus {
        self.state.lock().unwrap().status
    }

    pub fn cancel_requested(&self) -> bool {
        self.state.lock().unwrap().cancel_requested
    }

    /// Point-in-time copy of the record as exposed to API callers.
    pub fn snapshot(&self) -> Build {
        let state = self.state.lock().unwrap();
        self.build_from(&state)
    }

    /// Snapshot plus the log from line `since` on, taken under one lock so
    /// status and log always agree with each other.
    pub fn status_with_log(&self, since: usize) -> (Build, Vec<LogLine>, usize) {
        let state = self.state.lock().unwrap();
        let build = self.build_from(&state);
        let log = state
            .log
            .iter()
            .filter(|line| line.number >= since)
            .cloned()
            .collect();
        (build, log, state.next_number)
    }

    fn build_from(&self, state: &RecordState) -> Build {
        Build {
            id: self.id,
            name: self.name.clone(),
            source: self.source.clone(),
            limits: self.limits.clone(),
            status: state.status,
            started_at: self.started_at,
            finished_at: state.finished_at,
            error: state.error.clone(),
        }
    }

    /// Captured lines from line `since` on, plus the number the next line
    /// will get.
    pub fn log_since(&self, since: usize) -> (Vec<LogLine>, usize) {
        let state = self.state.lock().unwrap();
        let log = state
            .log
            .iter()
            .filter(|line| line.number >= since)
            .cloned()
            .collect();
        (log, state.next_number)
    }

    /// Last up to `n` captured lines.
    pub fn log_tail(&self, n: usize) -> Vec<LogLine> {
        let state = self.state.lock().unwrap();
        let skip = state.log.len().saturating_sub(n);
        state.log.iter().skip(skip).cloned().collect()
    }

    /// Append one captured output line and relay it to subscribers.
    ///
    /// Ignored once the record is terminal: the log is frozen after the
    /// terminal transition.
    pub fn append_line(&self, message: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        if state.status.is_terminal() {
            return;
        }
        let line = LogLine {
            number: state.next_number,
            timestamp: Utc::now(),
            message: message.into(),
        };
        state.next_number += 1;
        state.log.push_back(line.clone());
        if state.log.len() > self.log_cap {
            state.log.pop_front();
        }
        // No subscribers is fine
        let _ = self.events.send(BuildEvent::Line(line));
    }

    /// Move the record from queued to running once the subprocess is
    /// confirmed started. Returns false if the record went terminal in the
    /// meantime (cancelled before the spawn completed) and the caller must
    /// stop the fresh subprocess.
    pub fn mark_running(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.status == BuildStatus::Queued {
            state.status = BuildStatus::Running;
            true
        } else {
            !state.status.is_terminal()
        }
    }

    /// Terminal transition. The first caller wins; later calls are no-ops,
    /// so a terminal record never changes again.
    pub fn finish(&self, status: BuildStatus, error: Option<String>) {
        debug_assert!(status.is_terminal());
        let mut state = self.state.lock().unwrap();
        if state.status.is_terminal() {
            return;
        }
        state.status = status;
        state.finished_at = Some(Utc::now());
        state.error = if status == BuildStatus::Failed {
            error
        } else {
            None
        };
        let _ = self.events.send(BuildEvent::Finished {
            status,
            error: state.error.clone(),
        });
    }

    /// Record cancellation intent.
    ///
    /// The intent is visible synchronously (a racing admission or status
    /// query sees it); the subprocess, if any, is signalled asynchronously
    /// by whoever waits on [`BuildRecord::cancelled`].
    pub fn request_cancel(&self) -> CancelOutcome {
        let mut state = self.state.lock().unwrap();
        match state.status {
            BuildStatus::Queued => {
                state.cancel_requested = true;
                state.status = BuildStatus::Cancelled;
                state.finished_at = Some(Utc::now());
                let _ = self.events.send(BuildEvent::Finished {
                    status: BuildStatus::Cancelled,
                    error: None,
                });
                CancelOutcome::CancelledBeforeStart
            }
            BuildStatus::Running => {
                state.cancel_requested = true;
                self.cancel.notify_one();
                CancelOutcome::Signalled
            }
            _ => CancelOutcome::AlreadyFinished,
        }
    }

    /// Completes once cancellation has been requested for this record.
    pub async fn cancelled(&self) {
        if self.cancel_requested() {
            return;
        }
        self.cancel.notified().await;
    }

    /// Attach a subscriber to the record's event stream.
    ///
    /// History snapshot and receiver are taken under the state lock, so the
    /// history and the first live event line up with no gap and no overlap.
    pub fn subscribe(self: Arc<Self>, with_history: bool) -> Subscription {
        let (history, next_number, terminal, receiver) = {
            let state = self.state.lock().unwrap();
            let receiver = self.events.subscribe();
            let history: Vec<LogLine> = if with_history {
                state.log.iter().cloned().collect()
            } else {
                Vec::new()
            };
            let terminal = if state.status.is_terminal() {
                Some((state.status, state.error.clone()))
            } else {
                None
            };
            (history, state.next_number, terminal, receiver)
        };
        Subscription {
            record: self,
            history,
            next_number,
            terminal,
            receiver,
        }
    }
}

/// One subscriber's view of a build's log stream.
pub struct Subscription {
    /// The record subscribed to, for catching up after receiver lag
    pub record: Arc<BuildRecord>,
    /// Lines captured before the subscription, empty in follow-only mode
    pub history: Vec<LogLine>,
    /// Number the next live line will carry
    pub next_number: usize,
    /// Set when the build was already terminal at subscribe time; the
    /// receiver will never yield a Finished event in that case
    pub terminal: Option<(BuildStatus, Option<String>)>,
    pub receiver: broadcast::Receiver<BuildEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Arc<BuildRecord> {
        Arc::new(BuildRecord::new(
            "course-env",
            RepoSource::new("https://example.com/x.git", None),
            ResourceLimits::default(),
            100,
        ))
    }

    #[test]
    fn append_and_incremental_read() {
        let record = record();
        record.append_line("Fetching...");
        record.append_line("Building...");

        let (log, next) = record.log_since(0);
        assert_eq!(next, 2);
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].number, 0);
        assert_eq!(log[1].message, "Building...");

        let (tail, next) = record.log_since(1);
        assert_eq!(next, 2);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].message, "Building...");
    }

    #[test]
    fn log_cap_keeps_numbers_stable() {
        let source = RepoSource::new("https://example.com/x.git", None);
        let record = BuildRecord::new("env", source, ResourceLimits::default(), 3);
        for i in 0..5 {
            record.append_line(format!("line {}", i));
        }

        let (log, next) = record.log_since(0);
        assert_eq!(next, 5);
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].number, 2);
        assert_eq!(log[2].message, "line 4");
    }

    #[test]
    fn log_is_frozen_after_terminal() {
        let record = record();
        record.append_line("one");
        record.finish(BuildStatus::Succeeded, None);
        record.append_line("late");

        let (log, next) = record.log_since(0);
        assert_eq!(next, 1);
        assert_eq!(log.len(), 1);
        assert_eq!(record.status(), BuildStatus::Succeeded);
    }

    #[test]
    fn terminal_transition_is_final_and_idempotent() {
        let record = record();
        record.finish(BuildStatus::Failed, Some("exit 7".to_string()));
        record.finish(BuildStatus::Succeeded, None);

        let build = record.snapshot();
        assert_eq!(build.status, BuildStatus::Failed);
        assert_eq!(build.error.as_deref(), Some("exit 7"));
        assert!(build.finished_at.is_some());
    }

    #[test]
    fn error_is_kept_only_for_failures() {
        let record = record();
        record.finish(BuildStatus::Cancelled, Some("ignored".to_string()));
        assert!(record.snapshot().error.is_none());
    }

    #[test]
    fn cancel_of_queued_record_never_runs() {
        let record = record();
        assert_eq!(record.request_cancel(), CancelOutcome::CancelledBeforeStart);
        assert_eq!(record.status(), BuildStatus::Cancelled);
        assert!(!record.mark_running());
        assert_eq!(record.request_cancel(), CancelOutcome::AlreadyFinished);
    }

    #[tokio::test]
    async fn cancel_of_running_record_signals_waiter() {
        let record = record();
        assert!(record.mark_running());
        assert_eq!(record.request_cancel(), CancelOutcome::Signalled);
        assert!(record.cancel_requested());
        // Intent was recorded before we started waiting; must not hang
        tokio::time::timeout(std::time::Duration::from_secs(1), record.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn subscribers_observe_identical_sequences() {
        let record = record();
        record.append_line("one");

        let mut early = Arc::clone(&record).subscribe(true);
        record.append_line("two");
        let mut late = Arc::clone(&record).subscribe(true);
        record.append_line("three");
        record.finish(BuildStatus::Succeeded, None);

        let collect = |sub: &mut Subscription| {
            let mut messages: Vec<String> =
                sub.history.iter().map(|l| l.message.clone()).collect();
            loop {
                match sub.receiver.try_recv() {
                    Ok(BuildEvent::Line(line)) => messages.push(line.message),
                    Ok(BuildEvent::Finished { .. }) => break,
                    Err(_) => break,
                }
            }
            messages
        };

        assert_eq!(collect(&mut early), vec!["one", "two", "three"]);
        assert_eq!(collect(&mut late), vec!["one", "two", "three"]);
    }

    #[test]
    fn follow_only_skips_history() {
        let record = record();
        record.append_line("old");

        let sub = Arc::clone(&record).subscribe(false);
        assert!(sub.history.is_empty());
        assert_eq!(sub.next_number, 1);
        assert!(sub.terminal.is_none());
    }

    #[test]
    fn subscribing_to_terminal_record_reports_it() {
        let record = record();
        record.append_line("only");
        record.finish(BuildStatus::Failed, Some("boom".to_string()));

        let sub = Arc::clone(&record).subscribe(true);
        assert_eq!(sub.history.len(), 1);
        let (status, error) = sub.terminal.expect("terminal at subscribe time");
        assert_eq!(status, BuildStatus::Failed);
        assert_eq!(error.as_deref(), Some("boom"));
    }
}
