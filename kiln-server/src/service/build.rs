//! Build service
//!
//! Validates build requests, admits them into the registry, and supervises
//! the build subprocess through to a terminal state. All record mutation
//! funnels through the registry's records; the supervision task owns the
//! subprocess and nothing else touches it.

use std::sync::Arc;

use kiln_builder::process::{self, ExitOutcome, ProcessEvent};
use kiln_builder::repo2docker;
use kiln_core::domain::{Build, BuildStatus, RepoSource, ResourceLimits};
use kiln_core::dto::build::{BuildStatusResponse, CancelResponse, StartBuild};

use crate::config::Config;
use crate::registry::{BuildRecord, BuildRegistry, CancelOutcome, Subscription};

/// Service error type
#[derive(Debug, PartialEq, Eq)]
pub enum BuildError {
    /// An active build already holds the target name
    AlreadyBuilding(String),
    /// The repository reference is malformed; no record was created
    InvalidSource(String),
    /// The request itself is malformed; no record was created
    InvalidRequest(String),
    /// No build record exists for the name
    NotFound(String),
}

/// How many trailing log lines feed a failure summary
const FAILURE_CONTEXT_LINES: usize = 3;

/// Validate and admit a build request, then start supervising it.
///
/// Admission is synchronous: when this returns Ok the record exists in
/// queued state and holds its name exclusively. The subprocess is spawned
/// by a background task.
pub fn start_build(
    registry: &Arc<BuildRegistry>,
    config: &Arc<Config>,
    req: StartBuild,
) -> Result<Build, BuildError> {
    validate_name(&req.name)?;

    let source = RepoSource::new(req.repository, req.reference);
    validate_source(&source)?;

    let limits = ResourceLimits {
        memory: req.memory.or_else(|| config.default_memory.clone()),
        cpu: req.cpu.or_else(|| config.default_cpu.clone()),
    };

    let record = registry
        .admit(&req.name, source, limits)
        .map_err(|rejected| BuildError::AlreadyBuilding(rejected.0))?;

    tracing::info!("build admitted: {} ({})", record.name, record.id);

    let supervised = Arc::clone(&record);
    let config = Arc::clone(config);
    tokio::spawn(async move {
        run_build(supervised, config).await;
    });

    Ok(record.snapshot())
}

/// Get a build's status plus its log from `since_line` on.
pub fn get_build(
    registry: &Arc<BuildRegistry>,
    name: &str,
    since_line: Option<usize>,
) -> Result<BuildStatusResponse, BuildError> {
    let record = registry
        .lookup(name)
        .ok_or_else(|| BuildError::NotFound(name.to_string()))?;

    let (build, log, next_line) = record.status_with_log(since_line.unwrap_or(0));
    Ok(BuildStatusResponse {
        build,
        log,
        next_line,
    })
}

/// List all known builds, most recent first.
pub fn list_builds(registry: &Arc<BuildRegistry>) -> Vec<Build> {
    registry
        .list()
        .iter()
        .map(|record| record.snapshot())
        .collect()
}

/// Cancel a build by name.
///
/// Records intent synchronously; the subprocess, if one is running, is
/// signalled asynchronously by the supervision task. Cancelling a build
/// that already finished reports `cancelled: false`.
pub fn cancel_build(
    registry: &Arc<BuildRegistry>,
    name: &str,
) -> Result<CancelResponse, BuildError> {
    let record = registry
        .lookup(name)
        .ok_or_else(|| BuildError::NotFound(name.to_string()))?;

    let cancelled = match record.request_cancel() {
        CancelOutcome::CancelledBeforeStart => {
            tracing::info!("build {} cancelled before start", name);
            true
        }
        CancelOutcome::Signalled => {
            tracing::info!("build {} cancellation requested", name);
            true
        }
        CancelOutcome::AlreadyFinished => false,
    };

    Ok(CancelResponse {
        name: name.to_string(),
        cancelled,
    })
}

/// Attach a log subscriber to a build.
pub fn subscribe_logs(
    registry: &Arc<BuildRegistry>,
    name: &str,
    with_history: bool,
) -> Result<Subscription, BuildError> {
    let record = registry
        .lookup(name)
        .ok_or_else(|| BuildError::NotFound(name.to_string()))?;

    Ok(record.subscribe(with_history))
}

/// Own the build subprocess from spawn to terminal state.
async fn run_build(record: Arc<BuildRecord>, config: Arc<Config>) {
    let command = repo2docker::build_command(
        &config.builder_cmd,
        &record.name,
        &record.source,
        &record.limits,
    );

    let (handle, mut events) = match process::spawn_supervised(command, config.kill_grace) {
        Ok(spawned) => spawned,
        Err(e) => {
            tracing::error!("failed to start build process for {}: {}", record.name, e);
            record.finish(
                BuildStatus::Failed,
                Some(format!("failed to start build process: {}", e)),
            );
            return;
        }
    };

    if record.mark_running() {
        tracing::info!("build running: {} (pid {:?})", record.name, handle.pid());
    } else {
        // Cancelled between admission and spawn; stop the fresh process
        handle.terminate();
    }

    // Relay cancellation intent to the subprocess
    let canceller = {
        let record = Arc::clone(&record);
        let handle = handle.clone();
        tokio::spawn(async move {
            record.cancelled().await;
            handle.terminate();
        })
    };

    while let Some(event) = events.recv().await {
        match event {
            ProcessEvent::Line(line) => record.append_line(line),
            ProcessEvent::Exited(outcome) => finish_from_outcome(&record, outcome),
        }
    }

    canceller.abort();
}

/// Map a process exit onto the record's terminal state.
///
/// A recorded cancel intent wins over whatever the exit code says.
fn finish_from_outcome(record: &BuildRecord, outcome: ExitOutcome) {
    if record.cancel_requested() {
        record.finish(BuildStatus::Cancelled, None);
        return;
    }

    match outcome {
        ExitOutcome::Completed(0) => record.finish(BuildStatus::Succeeded, None),
        ExitOutcome::Completed(code) => {
            record.finish(BuildStatus::Failed, Some(summarize_failure(record, code)));
        }
        // Killed without a cancel request: somebody outside tore the
        // process down; that is a failure, not a cancellation
        ExitOutcome::Killed => {
            record.finish(
                BuildStatus::Failed,
                Some("build process terminated by signal".to_string()),
            );
        }
    }
}

fn summarize_failure(record: &BuildRecord, code: i32) -> String {
    let tail = record.log_tail(FAILURE_CONTEXT_LINES);
    if tail.is_empty() {
        format!("build exited with code {}", code)
    } else {
        let context: Vec<String> = tail.into_iter().map(|line| line.message).collect();
        format!("build exited with code {}: {}", code, context.join(" | "))
    }
}

// =============================================================================
// Validation
// =============================================================================

fn validate_name(name: &str) -> Result<(), BuildError> {
    if name.is_empty() {
        return Err(BuildError::InvalidRequest("name cannot be empty".to_string()));
    }
    if name.len() > 128 {
        return Err(BuildError::InvalidRequest(
            "name cannot exceed 128 characters".to_string(),
        ));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or_default();
    if !first.is_ascii_alphanumeric() {
        return Err(BuildError::InvalidRequest(
            "name must start with a letter or digit".to_string(),
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
    {
        return Err(BuildError::InvalidRequest(
            "name may contain only lowercase letters, digits, '-', '_' and '.'".to_string(),
        ));
    }
    Ok(())
}

fn validate_source(source: &RepoSource) -> Result<(), BuildError> {
    let repo = source.repository.trim();
    if repo.is_empty() {
        return Err(BuildError::InvalidSource(
            "repository cannot be empty".to_string(),
        ));
    }

    let known_scheme = repo.starts_with("http://")
        || repo.starts_with("https://")
        || repo.starts_with("git://")
        || repo.starts_with("git@");
    if !known_scheme {
        return Err(BuildError::InvalidSource(format!(
            "unsupported repository reference: {}",
            repo
        )));
    }

    if source.reference.is_empty() || source.reference.len() > 256 {
        return Err(BuildError::InvalidSource("invalid revision".to_string()));
    }
    if source.reference.starts_with('-') || source.reference.chars().any(char::is_whitespace) {
        return Err(BuildError::InvalidSource(format!(
            "invalid revision: {}",
            source.reference
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Config whose "builder" is a shell script; the repo2docker arguments
    /// appended by build_command land in the script's positional
    /// parameters and are ignored.
    fn stub_config(script: &str) -> Arc<Config> {
        Arc::new(Config {
            builder_cmd: vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                script.to_string(),
                "builder".to_string(),
            ],
            kill_grace: Duration::from_millis(200),
            log_cap: 100,
            ..Config::default()
        })
    }

    fn request(name: &str) -> StartBuild {
        StartBuild {
            name: name.to_string(),
            repository: "https://example.com/x.git".to_string(),
            reference: None,
            memory: None,
            cpu: None,
        }
    }

    async fn wait_terminal(registry: &Arc<BuildRegistry>, name: &str) -> Build {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let build = get_build(registry, name, None).unwrap().build;
                if build.status.is_terminal() {
                    return build;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("build did not reach a terminal state in time")
    }

    #[tokio::test]
    async fn successful_build_captures_log_in_order() {
        let registry = Arc::new(BuildRegistry::new(100));
        let config = stub_config("echo 'Fetching...'; echo 'Building...'; echo 'Done'");

        let build = start_build(&registry, &config, request("foo")).unwrap();
        assert_eq!(build.status, BuildStatus::Queued);

        // Second admission for the same name conflicts, any interleaving
        let conflict = start_build(&registry, &config, request("foo"));
        assert_eq!(conflict.unwrap_err(), BuildError::AlreadyBuilding("foo".to_string()));

        let finished = wait_terminal(&registry, "foo").await;
        assert_eq!(finished.status, BuildStatus::Succeeded);
        assert!(finished.error.is_none());

        let response = get_build(&registry, "foo", None).unwrap();
        let messages: Vec<&str> = response.log.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["Fetching...", "Building...", "Done"]);
        assert_eq!(response.next_line, 3);
    }

    #[tokio::test]
    async fn nonzero_exit_fails_with_summary() {
        let registry = Arc::new(BuildRegistry::new(100));
        let config = stub_config("echo 'no space left on device' >&2; exit 7");

        start_build(&registry, &config, request("broken")).unwrap();
        let finished = wait_terminal(&registry, "broken").await;

        assert_eq!(finished.status, BuildStatus::Failed);
        let error = finished.error.expect("failed build carries an error");
        assert!(error.contains("7"), "summary should name the exit code: {}", error);
        assert!(error.contains("no space left on device"));
    }

    #[tokio::test]
    async fn terminal_status_queries_are_idempotent() {
        let registry = Arc::new(BuildRegistry::new(100));
        let config = stub_config("echo done");

        start_build(&registry, &config, request("idem")).unwrap();
        wait_terminal(&registry, "idem").await;

        let first = get_build(&registry, "idem", None).unwrap();
        let second = get_build(&registry, "idem", None).unwrap();
        assert_eq!(first.build.status, second.build.status);
        assert_eq!(first.next_line, second.next_line);
        assert_eq!(first.log.len(), second.log.len());
        assert_eq!(first.build.finished_at, second.build.finished_at);
    }

    #[tokio::test]
    async fn cancel_running_build() {
        let registry = Arc::new(BuildRegistry::new(100));
        let config = stub_config("echo started; sleep 30");

        start_build(&registry, &config, request("slow")).unwrap();

        // Wait for the subprocess to be confirmed running
        tokio::time::timeout(Duration::from_secs(5), async {
            while get_build(&registry, "slow", None).unwrap().build.status != BuildStatus::Running {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let response = cancel_build(&registry, "slow").unwrap();
        assert!(response.cancelled);

        let finished = wait_terminal(&registry, "slow").await;
        assert_eq!(finished.status, BuildStatus::Cancelled);
        assert!(finished.error.is_none());

        // Cancelling again reports nothing left to cancel
        assert!(!cancel_build(&registry, "slow").unwrap().cancelled);
    }

    #[tokio::test]
    async fn spawn_failure_fails_the_record() {
        let registry = Arc::new(BuildRegistry::new(100));
        let config = Arc::new(Config {
            builder_cmd: vec!["/nonexistent/kiln-build-tool".to_string()],
            ..Config::default()
        });

        start_build(&registry, &config, request("ghost")).unwrap();
        let finished = wait_terminal(&registry, "ghost").await;

        assert_eq!(finished.status, BuildStatus::Failed);
        assert!(finished.error.unwrap().contains("failed to start build process"));
    }

    #[tokio::test]
    async fn invalid_source_creates_no_record() {
        let registry = Arc::new(BuildRegistry::new(100));
        let config = stub_config("echo unused");

        let mut req = request("env");
        req.repository = "not-a-url".to_string();
        assert!(matches!(
            start_build(&registry, &config, req),
            Err(BuildError::InvalidSource(_))
        ));
        assert!(registry.lookup("env").is_none());
    }

    #[tokio::test]
    async fn invalid_name_creates_no_record() {
        let registry = Arc::new(BuildRegistry::new(100));
        let config = stub_config("echo unused");

        assert!(matches!(
            start_build(&registry, &config, request("")),
            Err(BuildError::InvalidRequest(_))
        ));
        assert!(matches!(
            start_build(&registry, &config, request("UPPER CASE")),
            Err(BuildError::InvalidRequest(_))
        ));
    }

    #[test]
    fn name_validation() {
        assert!(validate_name("course-env.v2").is_ok());
        assert!(validate_name("3d-models").is_ok());
        assert!(validate_name("-leading-dash").is_err());
        assert!(validate_name("has space").is_err());
        assert!(validate_name(&"x".repeat(129)).is_err());
    }

    #[test]
    fn source_validation() {
        let ok = RepoSource::new("https://example.com/x.git", None);
        assert!(validate_source(&ok).is_ok());

        let ssh = RepoSource::new("git@example.com:user/repo.git", None);
        assert!(validate_source(&ssh).is_ok());

        let bad_scheme = RepoSource::new("ftp://example.com/x", None);
        assert!(validate_source(&bad_scheme).is_err());

        let bad_ref = RepoSource::new("https://example.com/x.git", Some("--exec=evil".to_string()));
        assert!(validate_source(&bad_ref).is_err());
    }
}
