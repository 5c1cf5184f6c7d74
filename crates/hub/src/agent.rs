// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for communicating with a single worker agent.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeout for forwarding a task to a worker.
pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for task status and history polls.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(5);

/// Payload for `POST /task` on a worker. Only populated fields go on the
/// wire.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentTaskRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
}

/// A worker's 201 answer to a task submission.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskCreated {
    pub task_id: String,
    pub session_id: String,
}

/// Outcome of a task submission that reached the worker.
#[derive(Debug)]
pub enum SubmitOutcome {
    Created(TaskCreated),
    /// 409: the worker became busy between discovery refresh and submit.
    Busy,
    /// Any other status; forwarded to callers verbatim.
    Rejected { status: u16, body: String },
}

/// A task's state as seen by the worker, live or from history.
#[derive(Debug, Clone)]
pub struct TaskView {
    pub state: Option<String>,
    pub body: serde_json::Value,
    pub from_history: bool,
}

/// Extract the `state` field from a worker task body.
pub fn body_state(body: &serde_json::Value) -> Option<String> {
    body.get("state").and_then(|v| v.as_str()).map(str::to_owned)
}

/// HTTP client wrapper for one worker. Workers terminate TLS on loopback
/// with auto-generated certs, so the client accepts self-signed chains.
pub struct AgentClient {
    base_url: String,
    client: reqwest::Client,
}

impl AgentClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .unwrap_or_default();
        Self { base_url: base_url.trim_end_matches('/').to_owned(), client }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Forward a task to the worker's `/task` endpoint.
    pub async fn submit_task(&self, req: &AgentTaskRequest) -> anyhow::Result<SubmitOutcome> {
        let resp = self.client.post(self.url("/task")).json(req).send().await?;
        match resp.status().as_u16() {
            201 => Ok(SubmitOutcome::Created(resp.json().await?)),
            409 => Ok(SubmitOutcome::Busy),
            status => {
                Ok(SubmitOutcome::Rejected { status, body: resp.text().await.unwrap_or_default() })
            }
        }
    }

    /// Fetch a task's status with automatic history fallback.
    ///
    /// `GET /task/<id>`; a 404 means the worker rotated the task into
    /// history, so `GET /history/<id>` is consulted. `Ok(None)` means both
    /// endpoints answered 404; any other status is a transport error.
    pub async fn fetch_task(&self, task_id: &str) -> anyhow::Result<Option<TaskView>> {
        let resp = self.client.get(self.url(&format!("/task/{task_id}"))).send().await?;
        match resp.status().as_u16() {
            200 => {
                let body: serde_json::Value = resp.json().await?;
                Ok(Some(TaskView { state: body_state(&body), body, from_history: false }))
            }
            404 => match self.fetch_history(task_id).await? {
                Some(body) => {
                    Ok(Some(TaskView { state: body_state(&body), body, from_history: true }))
                }
                None => Ok(None),
            },
            status => anyhow::bail!("unexpected status {status} from {}", self.url("/task")),
        }
    }

    /// Fetch a task's historical record. `Ok(None)` on 404.
    pub async fn fetch_history(&self, task_id: &str) -> anyhow::Result<Option<serde_json::Value>> {
        let resp = self.client.get(self.url(&format!("/history/{task_id}"))).send().await?;
        match resp.status().as_u16() {
            200 => Ok(Some(resp.json().await?)),
            404 => Ok(None),
            status => anyhow::bail!("unexpected status {status} from {}", self.url("/history")),
        }
    }
}
