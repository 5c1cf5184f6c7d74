// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end hub scenarios.
//!
//! Spawns in-process mock worker agents on real loopback listeners and
//! drives the hub's discovery, queue, and dispatcher against them.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use agency_hub::config::HubConfig;
use agency_hub::state::HubState;

/// What the mock answers to the next `POST /task`.
#[derive(Debug, Clone)]
pub enum SubmitPlan {
    /// 409: the agent claims to be busy.
    Busy,
    /// 201 with the given identifiers.
    Created { task_id: String, session_id: String },
}

#[derive(Default)]
pub struct MockAgentState {
    kind: String,
    agent_state: Mutex<String>,
    submit_plan: Mutex<VecDeque<SubmitPlan>>,
    received_prompts: Mutex<Vec<String>>,
    live_tasks: Mutex<HashMap<String, String>>,
    history_tasks: Mutex<HashMap<String, String>>,
    status_count: AtomicU32,
    fail_statuses_after_first: AtomicBool,
}

/// A mock worker agent served over real loopback HTTP. The listener stops
/// when the harness is dropped.
pub struct MockAgent {
    pub url: String,
    pub port: u16,
    state: Arc<MockAgentState>,
    cancel: CancellationToken,
}

impl Drop for MockAgent {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl MockAgent {
    pub async fn spawn(kind: &str) -> anyhow::Result<Self> {
        let state = Arc::new(MockAgentState {
            kind: kind.to_owned(),
            agent_state: Mutex::new("idle".to_owned()),
            ..MockAgentState::default()
        });

        let router = Router::new()
            .route("/status", get(mock_status))
            .route("/task", post(mock_submit))
            .route("/task/{id}", get(mock_task))
            .route("/history/{id}", get(mock_history))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
        });

        Ok(Self { url: format!("http://127.0.0.1:{port}"), port, state, cancel })
    }

    /// Queue a 409 for the next submission.
    pub async fn plan_busy(&self) {
        self.state.submit_plan.lock().await.push_back(SubmitPlan::Busy);
    }

    /// Queue a 201 with the given IDs for the next submission.
    pub async fn plan_created(&self, task_id: &str, session_id: &str) {
        self.state.submit_plan.lock().await.push_back(SubmitPlan::Created {
            task_id: task_id.to_owned(),
            session_id: session_id.to_owned(),
        });
    }

    /// Prompts received over `/task`, in arrival order.
    pub async fn received_prompts(&self) -> Vec<String> {
        self.state.received_prompts.lock().await.clone()
    }

    /// Set a live task's reported state.
    pub async fn set_live_state(&self, task_id: &str, state: &str) {
        self.state.live_tasks.lock().await.insert(task_id.to_owned(), state.to_owned());
    }

    /// Rotate a task out of the live registry into history.
    pub async fn move_to_history(&self, task_id: &str, state: &str) {
        self.state.live_tasks.lock().await.remove(task_id);
        self.state.history_tasks.lock().await.insert(task_id.to_owned(), state.to_owned());
    }

    /// Make every `/status` after the first fail, simulating a worker that
    /// died right after being discovered.
    pub fn fail_future_statuses(&self) {
        self.state.fail_statuses_after_first.store(true, Ordering::SeqCst);
    }

    pub async fn set_agent_state(&self, state: &str) {
        *self.state.agent_state.lock().await = state.to_owned();
    }
}

async fn mock_status(State(s): State<Arc<MockAgentState>>) -> Response {
    let count = s.status_count.fetch_add(1, Ordering::SeqCst);
    if s.fail_statuses_after_first.load(Ordering::SeqCst) && count > 0 {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let state = s.agent_state.lock().await.clone();
    Json(serde_json::json!({
        "type": "agent",
        "agent_kind": s.kind,
        "interfaces": ["statusable", "taskable"],
        "version": "0.0.1",
        "state": state,
        "uptime_seconds": 1
    }))
    .into_response()
}

async fn mock_submit(
    State(s): State<Arc<MockAgentState>>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    if let Some(prompt) = body.get("prompt").and_then(|v| v.as_str()) {
        s.received_prompts.lock().await.push(prompt.to_owned());
    }

    let plan = s.submit_plan.lock().await.pop_front();
    match plan {
        Some(SubmitPlan::Busy) => StatusCode::CONFLICT.into_response(),
        Some(SubmitPlan::Created { task_id, session_id }) => {
            s.live_tasks.lock().await.insert(task_id.clone(), "working".to_owned());
            (
                StatusCode::CREATED,
                Json(serde_json::json!({"task_id": task_id, "session_id": session_id})),
            )
                .into_response()
        }
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn mock_task(State(s): State<Arc<MockAgentState>>, UrlPath(id): UrlPath<String>) -> Response {
    match s.live_tasks.lock().await.get(&id) {
        Some(state) => Json(serde_json::json!({"task_id": id, "state": state})).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn mock_history(
    State(s): State<Arc<MockAgentState>>,
    UrlPath(id): UrlPath<String>,
) -> Response {
    match s.history_tasks.lock().await.get(&id) {
        Some(state) => Json(serde_json::json!({"task_id": id, "state": state, "archived": true}))
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// -- Hub harness --------------------------------------------------------------

/// Hub configuration pointed at a single mock-agent port, with tight
/// intervals for fast tests.
pub fn hub_config(dir: &Path, scan_port: u16) -> HubConfig {
    let mut config = HubConfig::parse_from(["agency-hub"]);
    config.state_dir = dir.to_path_buf();
    config.password = Some("hunter2".to_owned());
    config.port_start = scan_port;
    config.port_end = scan_port;
    config.refresh_ms = 50;
    config.probe_timeout_ms = 250;
    config.dispatch_poll_ms = 25;
    config.track_poll_ms = 25;
    config
}

pub fn build_state(config: HubConfig) -> anyhow::Result<(Arc<HubState>, CancellationToken)> {
    let shutdown = CancellationToken::new();
    let state = Arc::new(HubState::new(config, shutdown.clone())?);
    Ok((state, shutdown))
}
