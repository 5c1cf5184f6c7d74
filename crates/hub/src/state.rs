// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::access_log::AccessLog;
use crate::auth::rate_limit::RateLimiter;
use crate::auth::store::AuthStore;
use crate::component::{ComponentStatus, ComponentType, IFACE_STATUSABLE};
use crate::config::HubConfig;
use crate::discovery::Discovery;
use crate::queue::WorkQueue;
use crate::session::SessionStore;

/// Shared hub state.
pub struct HubState {
    pub config: HubConfig,
    pub discovery: Discovery,
    pub queue: WorkQueue,
    pub sessions: SessionStore,
    pub auth: AuthStore,
    pub limiter: RateLimiter,
    pub access_log: AccessLog,
    pub shutdown: CancellationToken,
    pub started_at: Instant,
}

impl HubState {
    /// Build all stores. Failure to open the access log, create the state
    /// directory, or load the queue file aborts initialisation.
    pub fn new(config: HubConfig, shutdown: CancellationToken) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.state_dir)?;
        let access_log = AccessLog::open(&config.access_log_path())?;
        let auth = AuthStore::open(&config.auth_store_path(), config.password.as_deref())?;
        let queue = WorkQueue::open(&config.queue_dir(), config.max_queue_size)?;
        let discovery = Discovery::new(&config);

        Ok(Self {
            config,
            discovery,
            queue,
            sessions: SessionStore::new(),
            auth,
            limiter: RateLimiter::new(),
            access_log,
            shutdown,
            started_at: Instant::now(),
        })
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// The hub's own status report, served on `GET /status` so peers can
    /// discover it.
    pub fn own_status(&self) -> ComponentStatus {
        ComponentStatus {
            url: format!("https://{}:{}", self.config.host, self.config.port),
            kind: ComponentType::Director,
            agent_kind: None,
            interfaces: vec![IFACE_STATUSABLE.to_owned()],
            version: env!("CARGO_PKG_VERSION").to_owned(),
            state: "running".to_owned(),
            uptime_seconds: self.uptime_seconds(),
            current_task: None,
            jobs: None,
            last_seen: chrono::Utc::now(),
            fail_count: 0,
        }
    }
}
