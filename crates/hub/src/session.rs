// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory store of conversation sessions keyed by worker-assigned ID.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// One task within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTask {
    pub task_id: String,
    pub state: String,
    pub prompt: String,
}

/// A conversation: an ordered sequence of tasks sharing one worker context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub agent_url: String,
    pub tasks: Vec<SessionTask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_job: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub archived: bool,
}

/// Options applied once when a session is first created.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub source: Option<String>,
    pub source_job: Option<String>,
}

/// Session map. Sessions are memory-resident: they live until explicitly
/// deleted or cleared, and `archive` only hides them from listings.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task to a session, creating the session on first sight.
    ///
    /// `opts` (source/source_job) only take effect at creation; re-adding
    /// to an existing session never changes its source.
    pub async fn add_task(
        &self,
        session_id: &str,
        agent_url: &str,
        task_id: &str,
        state: &str,
        prompt: &str,
        opts: SessionOptions,
    ) {
        let mut sessions = self.sessions.write().await;
        let now = Utc::now();
        let session = sessions.entry(session_id.to_owned()).or_insert_with(|| Session {
            id: session_id.to_owned(),
            agent_url: agent_url.to_owned(),
            tasks: Vec::new(),
            source: opts.source,
            source_job: opts.source_job,
            created_at: now,
            updated_at: now,
            archived: false,
        });
        session.tasks.push(SessionTask {
            task_id: task_id.to_owned(),
            state: state.to_owned(),
            prompt: prompt.to_owned(),
        });
        session.updated_at = now;
    }

    /// Update a task's state. Returns false when the session or task is
    /// unknown.
    pub async fn update_task_state(&self, session_id: &str, task_id: &str, state: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(session_id) else {
            return false;
        };
        let Some(task) = session.tasks.iter_mut().find(|t| t.task_id == task_id) else {
            return false;
        };
        task.state = state.to_owned();
        session.updated_at = Utc::now();
        true
    }

    pub async fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Non-archived sessions ordered by `updated_at` descending.
    pub async fn get_all(&self) -> Vec<Session> {
        let sessions = self.sessions.read().await;
        let mut list: Vec<Session> =
            sessions.values().filter(|s| !s.archived).cloned().collect();
        list.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        list
    }

    pub async fn delete(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    /// Hide a session from listings while retaining its data.
    pub async fn archive(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(session_id) {
            Some(session) => {
                session.archived = true;
                session.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub async fn clear(&self) {
        self.sessions.write().await.clear();
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
