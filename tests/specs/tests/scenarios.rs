// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios: discovery, dispatch, reconciliation, age-out.

use std::time::Duration;

use agency_hub::dispatch::dispatch_tick;
use agency_hub::queue::{QueueRequest, TaskState};
use agency_hub::session::SessionOptions;
use agency_hub::transport::build_internal_router;
use axum_test::TestServer;

use agency_specs::{build_state, hub_config, MockAgent};

fn req(prompt: &str) -> QueueRequest {
    QueueRequest { prompt: prompt.to_owned(), ..QueueRequest::default() }
}

#[tokio::test]
async fn fifo_dispatch_preserves_order() -> anyhow::Result<()> {
    let mock = MockAgent::spawn("claude").await?;
    mock.plan_created("T1", "S1").await;
    mock.plan_created("T2", "S1").await;
    mock.plan_created("T3", "S1").await;

    let dir = tempfile::tempdir()?;
    let (state, _shutdown) = build_state(hub_config(dir.path(), mock.port))?;

    state.queue.add(req("a")).await?;
    state.queue.add(req("b")).await?;
    state.queue.add(req("c")).await?;

    state.discovery.scan_once().await;
    assert_eq!(state.discovery.agents().await.len(), 1);

    // One task per tick, FIFO.
    dispatch_tick(&state).await;
    dispatch_tick(&state).await;
    dispatch_tick(&state).await;

    assert_eq!(state.queue.depth().await, 0);
    assert_eq!(state.queue.dispatched_count().await, 3);
    assert_eq!(mock.received_prompts().await, vec!["a", "b", "c"]);

    let session = state.sessions.get("S1").await.ok_or_else(|| anyhow::anyhow!("no session"))?;
    let task_ids: Vec<&str> = session.tasks.iter().map(|t| t.task_id.as_str()).collect();
    assert_eq!(task_ids, vec!["T1", "T2", "T3"]);
    Ok(())
}

#[tokio::test]
async fn busy_agent_requeues_without_charging_attempts() -> anyhow::Result<()> {
    let mock = MockAgent::spawn("claude").await?;
    mock.plan_busy().await;
    mock.plan_created("T1", "S1").await;
    mock.plan_created("T2", "S1").await;

    let dir = tempfile::tempdir()?;
    let (state, _shutdown) = build_state(hub_config(dir.path(), mock.port))?;

    let (a, _) = state.queue.add(req("a")).await?;
    let (b, _) = state.queue.add(req("b")).await?;

    state.discovery.scan_once().await;

    // First tick: the worker answers 409, so "a" moves to the tail.
    dispatch_tick(&state).await;
    let order: Vec<String> =
        state.queue.get_all().await.into_iter().map(|t| t.queue_id).collect();
    assert_eq!(order, vec![b.queue_id.clone(), a.queue_id.clone()]);

    // Both tasks then dispatch, and nothing ever counted as an attempt.
    dispatch_tick(&state).await;
    dispatch_tick(&state).await;

    assert_eq!(state.queue.depth().await, 0);
    for task in state.queue.get_all().await {
        assert_eq!(task.state, TaskState::Working);
        assert_eq!(task.attempts, 0);
    }
    assert_eq!(mock.received_prompts().await, vec!["a", "b", "a"]);
    Ok(())
}

#[tokio::test]
async fn failed_submissions_exhaust_the_attempt_budget() -> anyhow::Result<()> {
    // A mock with an empty submission plan answers 500 to every submit.
    let mock = MockAgent::spawn("claude").await?;

    let dir = tempfile::tempdir()?;
    let mut config = hub_config(dir.path(), mock.port);
    config.max_attempts = 3;
    let (state, _shutdown) = build_state(config)?;

    let (task, _) = state.queue.add(req("doomed")).await?;
    state.discovery.scan_once().await;

    dispatch_tick(&state).await;
    let entry = state.queue.get(&task.queue_id).await.ok_or_else(|| anyhow::anyhow!("gone"))?;
    assert_eq!(entry.state, TaskState::Pending);
    assert_eq!(entry.attempts, 1);
    assert!(entry.last_error.contains("500"));

    dispatch_tick(&state).await;
    dispatch_tick(&state).await;

    // Third failure exhausted the budget: the task is failed and removed.
    assert!(state.queue.get(&task.queue_id).await.is_none());
    assert_eq!(state.queue.depth().await, 0);
    Ok(())
}

#[tokio::test]
async fn completion_tracker_finishes_dispatched_tasks() -> anyhow::Result<()> {
    let mock = MockAgent::spawn("claude").await?;
    mock.plan_created("T1", "S1").await;

    let dir = tempfile::tempdir()?;
    let (state, shutdown) = build_state(hub_config(dir.path(), mock.port))?;

    let (task, _) = state.queue.add(req("a")).await?;
    state.discovery.scan_once().await;
    dispatch_tick(&state).await;
    assert!(state.queue.get(&task.queue_id).await.is_some());

    // The worker finishes; the tracker notices, reconciles, and removes
    // the queue entry.
    mock.set_live_state("T1", "completed").await;

    let mut cleared = false;
    for _ in 0..200 {
        if state.queue.get(&task.queue_id).await.is_none() {
            cleared = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(cleared, "tracker never removed the finished task");

    let session = state.sessions.get("S1").await.ok_or_else(|| anyhow::anyhow!("no session"))?;
    assert_eq!(session.tasks[0].state, "completed");

    shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn tracker_follows_tasks_rotated_into_history() -> anyhow::Result<()> {
    let mock = MockAgent::spawn("claude").await?;
    mock.plan_created("T1", "S1").await;

    let dir = tempfile::tempdir()?;
    let (state, shutdown) = build_state(hub_config(dir.path(), mock.port))?;

    let (task, _) = state.queue.add(req("a")).await?;
    state.discovery.scan_once().await;
    dispatch_tick(&state).await;

    // The worker completes the task and immediately rotates it out of the
    // live registry.
    mock.move_to_history("T1", "completed").await;

    let mut cleared = false;
    for _ in 0..200 {
        if state.queue.get(&task.queue_id).await.is_none() {
            cleared = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(cleared, "tracker never resolved the task via history");

    shutdown.cancel();
    Ok(())
}

#[tokio::test]
async fn history_fallback_reconciles_the_session() -> anyhow::Result<()> {
    let mock = MockAgent::spawn("claude").await?;
    mock.move_to_history("T", "completed").await;

    let dir = tempfile::tempdir()?;
    let (state, _shutdown) = build_state(hub_config(dir.path(), mock.port))?;
    state.sessions.add_task("S", &mock.url, "T", "working", "p", SessionOptions::default()).await;

    let server = TestServer::new(build_internal_router(state.clone()))
        .map_err(|e| anyhow::anyhow!("test server: {e}"))?;

    let resp = server
        .get("/api/task/T")
        .add_query_param("agent_url", &mock.url)
        .add_query_param("session_id", "S")
        .await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["state"], "completed");
    assert_eq!(body["archived"], true);

    let session = state.sessions.get("S").await.ok_or_else(|| anyhow::anyhow!("no session"))?;
    assert_eq!(session.tasks[0].state, "completed");

    // Unknown on both endpoints: a not-found envelope.
    let resp = server.get("/api/task/NOPE").add_query_param("agent_url", &mock.url).await;
    resp.assert_status(axum::http::StatusCode::NOT_FOUND);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["error"], "not_found");
    Ok(())
}

#[tokio::test]
async fn status_poll_without_session_id_skips_reconciliation() -> anyhow::Result<()> {
    let mock = MockAgent::spawn("claude").await?;
    mock.move_to_history("T", "completed").await;

    let dir = tempfile::tempdir()?;
    let (state, _shutdown) = build_state(hub_config(dir.path(), mock.port))?;
    state.sessions.add_task("S", &mock.url, "T", "working", "p", SessionOptions::default()).await;

    let server = TestServer::new(build_internal_router(state.clone()))
        .map_err(|e| anyhow::anyhow!("test server: {e}"))?;

    let resp = server.get("/api/task/T").add_query_param("agent_url", &mock.url).await;
    resp.assert_status_ok();

    let session = state.sessions.get("S").await.ok_or_else(|| anyhow::anyhow!("no session"))?;
    assert_eq!(session.tasks[0].state, "working");
    Ok(())
}

#[tokio::test]
async fn dead_worker_ages_out_after_max_failures() -> anyhow::Result<()> {
    let mock = MockAgent::spawn("claude").await?;
    mock.fail_future_statuses();

    let dir = tempfile::tempdir()?;
    let mut config = hub_config(dir.path(), mock.port);
    config.max_failures = 2;
    let (state, _shutdown) = build_state(config)?;

    state.discovery.scan_once().await;
    assert_eq!(state.discovery.agents().await.len(), 1);

    state.discovery.scan_once().await;
    assert_eq!(state.discovery.agents().await.len(), 1, "one miss must not evict");

    state.discovery.scan_once().await;
    assert_eq!(state.discovery.agents().await.len(), 0);
    Ok(())
}

#[tokio::test]
async fn busy_worker_is_skipped_until_idle() -> anyhow::Result<()> {
    let mock = MockAgent::spawn("claude").await?;
    mock.set_agent_state("working").await;

    let dir = tempfile::tempdir()?;
    let (state, _shutdown) = build_state(hub_config(dir.path(), mock.port))?;

    let (task, _) = state.queue.add(req("a")).await?;
    state.discovery.scan_once().await;

    // The only worker reports "working": nothing dispatches.
    dispatch_tick(&state).await;
    let entry = state.queue.get(&task.queue_id).await.ok_or_else(|| anyhow::anyhow!("gone"))?;
    assert_eq!(entry.state, TaskState::Pending);
    assert!(mock.received_prompts().await.is_empty());

    // Once it reports idle again, the task goes out.
    mock.set_agent_state("idle").await;
    mock.plan_created("T1", "S1").await;
    state.discovery.scan_once().await;
    dispatch_tick(&state).await;
    assert_eq!(state.queue.dispatched_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn kind_mismatch_prevents_dispatch() -> anyhow::Result<()> {
    let mock = MockAgent::spawn("codex").await?;

    let dir = tempfile::tempdir()?;
    let (state, _shutdown) = build_state(hub_config(dir.path(), mock.port))?;

    // Default kind is claude; the only worker runs codex.
    state.queue.add(req("a")).await?;
    state.discovery.scan_once().await;
    dispatch_tick(&state).await;

    assert_eq!(state.queue.depth().await, 1);
    assert!(mock.received_prompts().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn background_loops_dispatch_end_to_end() -> anyhow::Result<()> {
    let mock = MockAgent::spawn("claude").await?;
    mock.plan_created("T1", "S1").await;

    let dir = tempfile::tempdir()?;
    let (state, shutdown) = build_state(hub_config(dir.path(), mock.port))?;

    agency_hub::discovery::spawn_scanner(state.clone());
    agency_hub::dispatch::spawn_dispatcher(state.clone());

    state.queue.add(req("hello")).await?;

    let mut dispatched = false;
    for _ in 0..200 {
        if state.sessions.get("S1").await.is_some() {
            dispatched = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(dispatched, "task never dispatched via background loops");

    mock.set_live_state("T1", "completed").await;
    let mut finished = false;
    for _ in 0..200 {
        if state.queue.get_all().await.is_empty() {
            finished = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(finished, "queue never drained");

    shutdown.cancel();
    Ok(())
}
