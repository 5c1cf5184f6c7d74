// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core HTTP handlers: dashboard, component listings, task submission,
//! queue management, and session reconciliation.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::{AgentClient, AgentTaskRequest, SubmitOutcome, STATUS_TIMEOUT, SUBMIT_TIMEOUT};
use crate::component::{kind_or_default, AgentKind, ComponentStatus, ComponentType};
use crate::error::HubError;
use crate::queue::{terminal_state, QueueFull, QueueRequest, QueuedTask, TaskSource, TaskState};
use crate::session::{Session, SessionOptions};
use crate::state::HubState;
use crate::transport::http_auth::OkResponse;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TaskSubmitRequest {
    #[serde(default)]
    pub agent_url: Option<String>,
    #[serde(default)]
    pub agent_kind: Option<AgentKind>,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
    #[serde(default)]
    pub source: Option<TaskSource>,
    #[serde(default)]
    pub source_job: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskSubmitResponse {
    pub task_id: String,
    pub agent_url: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct QueueAddResponse {
    pub queue_id: String,
    pub position: usize,
    pub state: TaskState,
}

#[derive(Debug, Serialize)]
pub struct QueueTaskSummary {
    pub queue_id: String,
    pub prompt: String,
    pub state: TaskState,
    pub source: TaskSource,
    pub agent_kind: AgentKind,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatched_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_error: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub agent_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct QueueStatusResponse {
    pub depth: usize,
    pub dispatched: usize,
    pub max_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_age_seconds: Option<u64>,
    pub tasks: Vec<QueueTaskSummary>,
}

#[derive(Debug, Deserialize)]
pub struct TaskStatusQuery {
    #[serde(default)]
    pub agent_url: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionTaskRequest {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub agent_url: String,
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub struct TaskStateRequest {
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Serialize)]
struct DashboardResponse {
    agents: Vec<ComponentStatus>,
    directors: Vec<ComponentStatus>,
    helpers: Vec<ComponentStatus>,
    sessions: Vec<Session>,
    queue: QueueStatusResponse,
}

// -- Helpers ------------------------------------------------------------------

/// ETag of a response body: first 8 bytes of its SHA-256, hex, quoted.
fn body_etag(bytes: &[u8]) -> String {
    use std::fmt::Write;

    use sha2::{Digest, Sha256};

    let digest = Sha256::digest(bytes);
    let mut hex = String::with_capacity(16);
    for b in &digest[..8] {
        let _ = write!(hex, "{b:02x}");
    }
    format!("\"{hex}\"")
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|e| {
        HubError::ParseError.to_http_response(format!("invalid body: {e}")).into_response()
    })
}

fn summarise(tasks: &[QueuedTask]) -> QueueStatusResponse {
    let mut position = 0usize;
    let summaries = tasks
        .iter()
        .map(|t| {
            let position = if t.state == TaskState::Pending {
                position += 1;
                Some(position)
            } else {
                None
            };
            QueueTaskSummary {
                queue_id: t.queue_id.clone(),
                prompt: t.prompt.clone(),
                state: t.state,
                source: t.source,
                agent_kind: t.agent_kind,
                created_at: t.created_at,
                dispatched_at: t.dispatched_at,
                attempts: t.attempts,
                last_error: t.last_error.clone(),
                agent_url: t.agent_url.clone(),
                task_id: t.task_id.clone(),
                position,
            }
        })
        .collect();

    let depth = tasks.iter().filter(|t| t.state == TaskState::Pending).count();
    let dispatched = tasks
        .iter()
        .filter(|t| matches!(t.state, TaskState::Dispatching | TaskState::Working))
        .count();
    let oldest_age_seconds = tasks
        .iter()
        .find(|t| t.state == TaskState::Pending)
        .map(|t| (Utc::now() - t.created_at).num_seconds().max(0) as u64);

    QueueStatusResponse { depth, dispatched, max_size: 0, oldest_age_seconds, tasks: summaries }
}

async fn queue_overview(s: &Arc<HubState>) -> QueueStatusResponse {
    let tasks = s.queue.get_all().await;
    let mut overview = summarise(&tasks);
    overview.max_size = s.config.max_queue_size;
    overview
}

async fn enqueue(s: &Arc<HubState>, req: QueueRequest) -> Response {
    match s.queue.add(req).await {
        Ok((task, position)) => (
            StatusCode::CREATED,
            Json(QueueAddResponse { queue_id: task.queue_id, position, state: task.state }),
        )
            .into_response(),
        Err(e) if e.downcast_ref::<QueueFull>().is_some() => {
            HubError::QueueFull.to_http_response(e.to_string()).into_response()
        }
        Err(e) => {
            tracing::error!(err = %e, "queue add failed");
            HubError::QueueError.to_http_response("failed to enqueue task").into_response()
        }
    }
}

// -- Handlers -----------------------------------------------------------------

/// `GET /status`: the hub's own component status (no auth).
pub async fn status(State(s): State<Arc<HubState>>) -> Response {
    Json(s.own_status()).into_response()
}

const DASHBOARD_HTML: &str = "<!DOCTYPE html><html><body>\
<h1>agency hub</h1><p>See <code>/api/dashboard</code>.</p></body></html>";

/// `GET /`: dashboard shell (real markup ships with the web frontend).
pub async fn dashboard_page() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

/// `GET /api/dashboard`: aggregated fleet view with conditional-GET
/// support. The ETag is a pure function of the serialised body.
pub async fn dashboard(State(s): State<Arc<HubState>>, headers: HeaderMap) -> Response {
    let body = DashboardResponse {
        agents: s.discovery.agents().await,
        directors: s.discovery.directors().await,
        helpers: s.discovery.helpers().await,
        sessions: s.sessions.get_all().await,
        queue: queue_overview(&s).await,
    };
    let bytes = match serde_json::to_vec(&body) {
        Ok(bytes) => bytes,
        Err(e) => {
            return HubError::MarshalError.to_http_response(e.to_string()).into_response();
        }
    };
    let etag = body_etag(&bytes);

    let if_none_match = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok());
    if if_none_match == Some(etag.as_str()) {
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response();
    }

    (
        StatusCode::OK,
        [
            (header::ETAG, etag),
            (header::CONTENT_TYPE, "application/json".to_owned()),
        ],
        bytes,
    )
        .into_response()
}

/// `GET /api/agents`
pub async fn agents(State(s): State<Arc<HubState>>) -> Response {
    Json(s.discovery.agents().await).into_response()
}

/// `GET /api/directors`
pub async fn directors(State(s): State<Arc<HubState>>) -> Response {
    Json(s.discovery.directors().await).into_response()
}

/// `GET /api/helpers`
pub async fn helpers(State(s): State<Arc<HubState>>) -> Response {
    Json(s.discovery.helpers().await).into_response()
}

/// `POST /api/task`: submit a task to a named agent, or enqueue it when
/// `agent_url` is absent.
pub async fn submit_task(State(s): State<Arc<HubState>>, body: Bytes) -> Response {
    let req: TaskSubmitRequest = match parse_body(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if req.prompt.trim().is_empty() {
        return HubError::ValidationError.to_http_response("prompt is required").into_response();
    }

    let agent_url = match req.agent_url.as_deref() {
        Some(url) if !url.is_empty() => url.trim_end_matches('/').to_owned(),
        _ => {
            // No agent named: the task goes on the queue and the
            // dispatcher finds a worker for it.
            return enqueue(
                &s,
                QueueRequest {
                    prompt: req.prompt,
                    tier: req.tier,
                    timeout_seconds: req.timeout_seconds,
                    session_id: req.session_id,
                    env: req.env,
                    agent_kind: req.agent_kind,
                    source: req.source,
                    source_job: req.source_job,
                },
            )
            .await;
        }
    };

    let Some(component) = s.discovery.get(&agent_url).await else {
        return HubError::AgentNotFound
            .to_http_response(format!("no discovered agent at {agent_url}"))
            .into_response();
    };
    if component.kind != ComponentType::Agent {
        return HubError::AgentNotFound
            .to_http_response(format!("component at {agent_url} is not an agent"))
            .into_response();
    }
    let requested = kind_or_default(req.agent_kind);
    if component.effective_kind() != requested {
        return HubError::AgentKindMismatch
            .to_http_response(format!(
                "agent at {agent_url} runs {}, not {}",
                component.effective_kind().as_str(),
                requested.as_str()
            ))
            .into_response();
    }

    let client = AgentClient::new(&agent_url, SUBMIT_TIMEOUT);
    let agent_req = AgentTaskRequest {
        prompt: req.prompt.clone(),
        tier: req.tier,
        timeout_seconds: req.timeout_seconds,
        session_id: req.session_id,
        env: req.env,
    };

    match client.submit_task(&agent_req).await {
        Ok(SubmitOutcome::Created(created)) => {
            let source = req.source.unwrap_or_default();
            s.sessions
                .add_task(
                    &created.session_id,
                    &agent_url,
                    &created.task_id,
                    "working",
                    &req.prompt,
                    SessionOptions {
                        source: Some(source.as_str().to_owned()),
                        source_job: req.source_job,
                    },
                )
                .await;
            (
                StatusCode::CREATED,
                Json(TaskSubmitResponse {
                    task_id: created.task_id,
                    agent_url,
                    session_id: created.session_id,
                }),
            )
                .into_response()
        }
        Ok(SubmitOutcome::Busy) => {
            HubError::AgentBusy.to_http_response("agent is busy").into_response()
        }
        Ok(SubmitOutcome::Rejected { status, body }) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            body,
        )
            .into_response(),
        Err(e) => {
            HubError::AgentError.to_http_response(format!("agent unreachable: {e}")).into_response()
        }
    }
}

/// `POST /api/queue/task`: enqueue without naming an agent.
pub async fn queue_task(State(s): State<Arc<HubState>>, body: Bytes) -> Response {
    let req: TaskSubmitRequest = match parse_body(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if req.prompt.trim().is_empty() {
        return HubError::ValidationError.to_http_response("prompt is required").into_response();
    }

    enqueue(
        &s,
        QueueRequest {
            prompt: req.prompt,
            tier: req.tier,
            timeout_seconds: req.timeout_seconds,
            session_id: req.session_id,
            env: req.env,
            agent_kind: req.agent_kind,
            source: req.source,
            source_job: req.source_job,
        },
    )
    .await
}

/// `GET /api/queue`
pub async fn queue_status(State(s): State<Arc<HubState>>) -> Response {
    Json(queue_overview(&s).await).into_response()
}

/// `GET /api/queue/{id}`
pub async fn queue_get(State(s): State<Arc<HubState>>, Path(id): Path<String>) -> Response {
    match s.queue.get(&id).await {
        Some(task) => Json(task).into_response(),
        None => HubError::NotFound.to_http_response("unknown queue entry").into_response(),
    }
}

/// `POST /api/queue/{id}/cancel`
pub async fn queue_cancel(State(s): State<Arc<HubState>>, Path(id): Path<String>) -> Response {
    match s.queue.cancel(&id).await {
        Some(task) => {
            tracing::info!(queue_id = %task.queue_id, "queued task cancelled");
            Json(serde_json::json!({
                "queue_id": task.queue_id,
                "state": TaskState::Cancelled,
            }))
            .into_response()
        }
        None => HubError::NotFound.to_http_response("unknown queue entry").into_response(),
    }
}

/// `GET /api/task/{id}?agent_url=…&session_id=…`: task status passthrough
/// with history fallback and session reconciliation.
///
/// When the caller names a session, a terminal state observed here is
/// written back to the session store. This repairs the race where a client
/// disappears before reporting its own state update while the worker has
/// already rotated the task into history.
pub async fn task_status(
    State(s): State<Arc<HubState>>,
    Path(id): Path<String>,
    Query(query): Query<TaskStatusQuery>,
) -> Response {
    let Some(agent_url) = query.agent_url.filter(|u| !u.is_empty()) else {
        return HubError::ValidationError.to_http_response("agent_url is required").into_response();
    };

    let client = AgentClient::new(&agent_url, STATUS_TIMEOUT);
    match client.fetch_task(&id).await {
        Ok(Some(view)) => {
            if let Some(session_id) = query.session_id.filter(|sid| !sid.is_empty()) {
                if let Some(state) = view.state.as_deref() {
                    if terminal_state(state).is_some() {
                        s.sessions.update_task_state(&session_id, &id, state).await;
                    }
                }
            }
            Json(view.body).into_response()
        }
        Ok(None) => HubError::NotFound.to_http_response("task not found").into_response(),
        Err(e) => {
            HubError::AgentError.to_http_response(format!("agent unreachable: {e}")).into_response()
        }
    }
}

/// `GET /api/history/{id}?agent_url=…`
pub async fn task_history(
    Path(id): Path<String>,
    Query(query): Query<TaskStatusQuery>,
) -> Response {
    let Some(agent_url) = query.agent_url.filter(|u| !u.is_empty()) else {
        return HubError::ValidationError.to_http_response("agent_url is required").into_response();
    };

    let client = AgentClient::new(&agent_url, STATUS_TIMEOUT);
    match client.fetch_history(&id).await {
        Ok(Some(body)) => Json(body).into_response(),
        Ok(None) => HubError::NotFound.to_http_response("task not found").into_response(),
        Err(e) => {
            HubError::AgentError.to_http_response(format!("agent unreachable: {e}")).into_response()
        }
    }
}

/// `GET /api/sessions`: non-archived sessions, newest first.
pub async fn sessions_list(State(s): State<Arc<HubState>>) -> Response {
    Json(s.sessions.get_all().await).into_response()
}

/// `POST /api/sessions`: a client reports a task it started directly.
pub async fn sessions_add(State(s): State<Arc<HubState>>, body: Bytes) -> Response {
    let req: SessionTaskRequest = match parse_body(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if req.session_id.is_empty()
        || req.agent_url.is_empty()
        || req.task_id.is_empty()
        || req.state.is_empty()
    {
        return HubError::ValidationError
            .to_http_response("session_id, agent_url, task_id and state are required")
            .into_response();
    }

    s.sessions
        .add_task(
            &req.session_id,
            &req.agent_url,
            &req.task_id,
            &req.state,
            &req.prompt,
            SessionOptions::default(),
        )
        .await;
    (StatusCode::CREATED, Json(OkResponse { ok: true })).into_response()
}

/// `PUT /api/sessions/{sid}/tasks/{tid}`: a client reports a state change.
pub async fn sessions_update_task(
    State(s): State<Arc<HubState>>,
    Path((sid, tid)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let req: TaskStateRequest = match parse_body(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    if req.state.is_empty() {
        return HubError::ValidationError.to_http_response("state is required").into_response();
    }

    if s.sessions.update_task_state(&sid, &tid, &req.state).await {
        Json(OkResponse { ok: true }).into_response()
    } else {
        HubError::NotFound.to_http_response("unknown session or task").into_response()
    }
}

/// `POST /api/sessions/{sid}/archive`
pub async fn sessions_archive(State(s): State<Arc<HubState>>, Path(sid): Path<String>) -> Response {
    if s.sessions.archive(&sid).await {
        Json(OkResponse { ok: true }).into_response()
    } else {
        HubError::NotFound.to_http_response("unknown session").into_response()
    }
}

/// `DELETE /api/sessions/{sid}`
pub async fn sessions_delete(State(s): State<Arc<HubState>>, Path(sid): Path<String>) -> Response {
    if s.sessions.delete(&sid).await {
        Json(OkResponse { ok: true }).into_response()
    } else {
        HubError::NotFound.to_http_response("unknown session").into_response()
    }
}

/// `POST /api/shutdown`: stop the hub, when enabled by configuration.
pub async fn shutdown(State(s): State<Arc<HubState>>) -> Response {
    if !s.config.enable_shutdown {
        return HubError::ShutdownUnavailable
            .to_http_response("remote shutdown is disabled")
            .into_response();
    }

    tracing::info!("shutdown requested via api");
    let token = s.shutdown.clone();
    tokio::spawn(async move {
        // Let the response flush before tearing the listeners down.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        token.cancel();
    });
    Json(OkResponse { ok: true }).into_response()
}
