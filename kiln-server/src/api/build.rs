//! Build API Handlers
//!
//! HTTP endpoints for the build lifecycle: start, status/log polling, live
//! log streaming over SSE, and cancellation.

use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};

use kiln_core::domain::{Build, BuildStatus, LogLine};
use kiln_core::dto::build::{
    BuildCreated, BuildStatusResponse, CancelResponse, LogQuery, StartBuild,
};

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::registry::{BuildEvent, Subscription};
use crate::service::build_service;

/// POST /api/builds
/// Validate and start a new build
pub async fn start_build(
    State(state): State<AppState>,
    Json(req): Json<StartBuild>,
) -> ApiResult<(StatusCode, Json<BuildCreated>)> {
    tracing::info!("build requested: {} from {}", req.name, req.repository);

    let build = build_service::start_build(&state.registry, &state.config, req)?;

    Ok((
        StatusCode::CREATED,
        Json(BuildCreated {
            id: build.id,
            name: build.name,
            status: build.status,
        }),
    ))
}

/// GET /api/builds
/// List all known builds, most recent first
pub async fn list_builds(State(state): State<AppState>) -> ApiResult<Json<Vec<Build>>> {
    tracing::debug!("listing builds");

    Ok(Json(build_service::list_builds(&state.registry)))
}

/// GET /api/builds/{name}
/// Get build status plus full or incremental log
pub async fn get_build(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<BuildStatusResponse>> {
    tracing::debug!("getting build: {}", name);

    let response = build_service::get_build(&state.registry, &name, query.since_line)?;
    Ok(Json(response))
}

/// POST /api/builds/{name}/cancel
/// Cancel an active build
pub async fn cancel_build(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    tracing::info!("cancel requested for build: {}", name);

    let response = build_service::cancel_build(&state.registry, &name)?;
    Ok(Json(response))
}

/// Query parameters for the log stream
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Skip captured history; deliver only lines that arrive after attach
    #[serde(default)]
    pub follow_only: bool,
}

/// GET /api/builds/{name}/logs
/// Stream a build's log as server-sent events until it reaches a terminal
/// state or the client disconnects
pub async fn stream_logs(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<StreamQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    tracing::debug!("log subscriber attaching to build: {}", name);

    let subscription = build_service::subscribe_logs(&state.registry, &name, !query.follow_only)?;

    let (tx, rx) = mpsc::channel::<Event>(64);
    tokio::spawn(forward_events(subscription, tx));

    let stream = ReceiverStream::new(rx).map(Ok::<Event, Infallible>);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Pump one subscription into an SSE channel.
///
/// Tracks the next expected line number so a lagged broadcast receiver is
/// caught up from the record instead of dropping lines. The stream always
/// ends with a `finished` event unless the client disconnects first.
async fn forward_events(mut subscription: Subscription, tx: mpsc::Sender<Event>) {
    for line in std::mem::take(&mut subscription.history) {
        if tx.send(line_event(&line)).await.is_err() {
            return;
        }
    }

    // Already terminal at subscribe time: the broadcast channel carries
    // nothing more for us
    if let Some((status, error)) = subscription.terminal.take() {
        let _ = tx.send(finished_event(status, error.as_deref())).await;
        return;
    }

    let mut next = subscription.next_number;
    loop {
        match subscription.receiver.recv().await {
            Ok(BuildEvent::Line(line)) => {
                if line.number < next {
                    continue;
                }
                if line.number > next && !catch_up(&subscription, &mut next, line.number, &tx).await
                {
                    return;
                }
                if tx.send(line_event(&line)).await.is_err() {
                    return;
                }
                next = line.number + 1;
            }
            Ok(BuildEvent::Finished { status, error }) => {
                let (missed, _) = subscription.record.log_since(next);
                for line in missed {
                    if tx.send(line_event(&line)).await.is_err() {
                        return;
                    }
                }
                let _ = tx.send(finished_event(status, error.as_deref())).await;
                return;
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!("log subscriber lagged by {} events", n);
                // The next Line or Finished event triggers catch-up
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

/// Re-send lines the broadcast channel dropped, up to (not including)
/// `upto`. Returns false once the client is gone.
async fn catch_up(
    subscription: &Subscription,
    next: &mut usize,
    upto: usize,
    tx: &mpsc::Sender<Event>,
) -> bool {
    let (missed, _) = subscription.record.log_since(*next);
    for line in missed.into_iter().filter(|line| line.number < upto) {
        if tx.send(line_event(&line)).await.is_err() {
            return false;
        }
        *next = line.number + 1;
    }
    true
}

fn line_event(line: &LogLine) -> Event {
    Event::default()
        .event("line")
        .json_data(line)
        .unwrap_or_else(|_| Event::default().event("line").data(line.message.clone()))
}

fn finished_event(status: BuildStatus, error: Option<&str>) -> Event {
    let payload = serde_json::json!({ "status": status, "error": error });
    Event::default()
        .event("finished")
        .json_data(&payload)
        .unwrap_or_else(|_| Event::default().event("finished").data(status.as_str()))
}
