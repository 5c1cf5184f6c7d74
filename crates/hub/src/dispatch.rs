// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background dispatcher: pairs pending queue entries with idle agents and
//! tracks dispatched tasks to completion.

use std::sync::Arc;

use crate::agent::{AgentClient, AgentTaskRequest, SubmitOutcome, STATUS_TIMEOUT, SUBMIT_TIMEOUT};
use crate::component::ComponentStatus;
use crate::queue::{terminal_state, QueuedTask, TaskState};
use crate::session::SessionOptions;
use crate::state::HubState;

/// Spawn the dispatcher loop. One task is considered per tick; multiple
/// idle agents drain over successive ticks, preserving queue order.
pub fn spawn_dispatcher(state: Arc<HubState>) {
    let interval = state.config.dispatch_poll_interval();

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            dispatch_tick(&state).await;
        }
    });
}

/// One dispatcher pass over the queue head.
pub async fn dispatch_tick(state: &Arc<HubState>) {
    let Some(task) = state.queue.next_pending().await else {
        return;
    };
    let Some(agent) = pick_agent(state, &task).await else {
        return;
    };

    state.queue.set_state(&task.queue_id, TaskState::Dispatching).await;

    let client = AgentClient::new(&agent.url, SUBMIT_TIMEOUT);
    let req = AgentTaskRequest {
        prompt: task.prompt.clone(),
        tier: task.tier.clone(),
        timeout_seconds: task.timeout_seconds,
        session_id: task.session_id.clone(),
        env: task.env.clone(),
    };

    match client.submit_task(&req).await {
        Ok(SubmitOutcome::Created(created)) => {
            state
                .queue
                .set_dispatched(&task.queue_id, &agent.url, &created.task_id, &created.session_id)
                .await;
            state
                .sessions
                .add_task(
                    &created.session_id,
                    &agent.url,
                    &created.task_id,
                    "working",
                    &task.prompt,
                    SessionOptions {
                        source: Some(task.source.as_str().to_owned()),
                        source_job: task.source_job.clone(),
                    },
                )
                .await;
            tracing::info!(
                queue_id = %task.queue_id,
                agent = %agent.url,
                task_id = %created.task_id,
                "dispatched queued task"
            );
            spawn_completion_tracker(
                Arc::clone(state),
                TrackedTask {
                    queue_id: task.queue_id,
                    agent_url: agent.url,
                    task_id: created.task_id,
                    session_id: created.session_id,
                },
            );
        }
        Ok(SubmitOutcome::Busy) => {
            // The agent picked up other work between the discovery refresh
            // and our submit. Not an attempt; the task goes to the tail.
            tracing::debug!(queue_id = %task.queue_id, agent = %agent.url, "agent busy, requeueing");
            state.queue.requeue_at_back(&task.queue_id).await;
        }
        Ok(SubmitOutcome::Rejected { status, body }) => {
            record_failed_attempt(state, &task, &format!("agent returned {status}: {body}")).await;
        }
        Err(e) => {
            record_failed_attempt(state, &task, &format!("agent unreachable: {e}")).await;
        }
    }
}

async fn record_failed_attempt(state: &Arc<HubState>, task: &QueuedTask, error: &str) {
    let attempts = state.queue.record_attempt(&task.queue_id, error).await;
    if attempts >= state.config.max_attempts {
        tracing::warn!(
            queue_id = %task.queue_id,
            attempts,
            err = %error,
            "task failed after max dispatch attempts"
        );
        state.queue.set_state(&task.queue_id, TaskState::Failed).await;
        state.queue.remove(&task.queue_id).await;
    } else {
        tracing::debug!(queue_id = %task.queue_id, attempts, err = %error, "dispatch attempt failed");
    }
}

/// First idle, healthy agent of the task's kind, by URL order.
async fn pick_agent(state: &Arc<HubState>, task: &QueuedTask) -> Option<ComponentStatus> {
    state
        .discovery
        .agents()
        .await
        .into_iter()
        .find(|a| a.is_idle() && a.fail_count == 0 && a.effective_kind() == task.agent_kind)
}

/// Identity of a dispatched task being tracked to completion.
pub struct TrackedTask {
    pub queue_id: String,
    pub agent_url: String,
    pub task_id: String,
    pub session_id: String,
}

/// Spawn a tracker polling the worker until the task reaches a terminal
/// state. Transport errors poll again; the worker is assumed to recover or
/// be aged out. The tracker stops on its own when the queue entry is gone
/// (cancelled or removed).
pub fn spawn_completion_tracker(state: Arc<HubState>, tracked: TrackedTask) {
    let interval = state.config.track_poll_interval();

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            if state.queue.get(&tracked.queue_id).await.is_none() {
                break;
            }

            let client = AgentClient::new(&tracked.agent_url, STATUS_TIMEOUT);
            let view = match client.fetch_task(&tracked.task_id).await {
                Ok(Some(view)) => view,
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!(task_id = %tracked.task_id, err = %e, "completion poll failed");
                    continue;
                }
            };

            let Some(terminal) = view.state.as_deref().and_then(terminal_state) else {
                continue;
            };

            state
                .sessions
                .update_task_state(&tracked.session_id, &tracked.task_id, terminal.as_str())
                .await;
            state.queue.remove(&tracked.queue_id).await;
            tracing::info!(
                queue_id = %tracked.queue_id,
                task_id = %tracked.task_id,
                state = terminal.as_str(),
                "tracked task reached terminal state"
            );
            break;
        }
    });
}
