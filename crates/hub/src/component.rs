// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types shared by discovery, dispatch, and the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Capability tag: the component answers `/status`.
pub const IFACE_STATUSABLE: &str = "statusable";
/// Capability tag: the component accepts `POST /task`.
pub const IFACE_TASKABLE: &str = "taskable";
/// Capability tag: the component exposes observation endpoints.
pub const IFACE_OBSERVABLE: &str = "observable";

/// What a discovered peer is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    Agent,
    Director,
    Helper,
    View,
}

/// Which agent variant a component runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    #[default]
    Claude,
    Codex,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
        }
    }
}

/// Resolve an optional kind to its default: an absent kind means claude.
pub fn kind_or_default(kind: Option<AgentKind>) -> AgentKind {
    kind.unwrap_or_default()
}

/// A component's view of the task it is currently executing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRef {
    pub id: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// A scheduled job exposed by a helper component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub name: String,
    pub schedule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_task_id: Option<String>,
}

/// Status report of a discovered component.
///
/// Decoded from a worker's `GET /status` body; `url` and `last_seen` are
/// stamped by the scanner, never trusted from the peer. `fail_count` is
/// internal bookkeeping and never serialised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentStatus {
    #[serde(default)]
    pub url: String,
    #[serde(rename = "type")]
    pub kind: ComponentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_kind: Option<AgentKind>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub uptime_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<TaskRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobs: Option<Vec<JobStatus>>,
    #[serde(default = "Utc::now")]
    pub last_seen: DateTime<Utc>,
    #[serde(skip)]
    pub fail_count: u32,
}

impl ComponentStatus {
    pub fn has_interface(&self, tag: &str) -> bool {
        self.interfaces.iter().any(|i| i == tag)
    }

    /// Effective agent kind: an empty kind is treated as claude.
    pub fn effective_kind(&self) -> AgentKind {
        kind_or_default(self.agent_kind)
    }

    pub fn is_idle(&self) -> bool {
        self.state == "idle"
    }
}

#[cfg(test)]
#[path = "component_tests.rs"]
mod tests;
