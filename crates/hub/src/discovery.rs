// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Port-range scanner maintaining the live component cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::component::{ComponentStatus, ComponentType, IFACE_OBSERVABLE, IFACE_TASKABLE};
use crate::config::HubConfig;
use crate::state::HubState;

/// Spawn the background scanner. The first scan runs immediately; later
/// scans run once per refresh interval until shutdown.
pub fn spawn_scanner(state: Arc<HubState>) {
    let interval = state.config.refresh_interval();

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }
            state.discovery.scan_once().await;
        }
    });
}

/// Live map of component URL → last decoded status.
pub struct Discovery {
    cache: RwLock<HashMap<String, ComponentStatus>>,
    port_start: u16,
    port_end: u16,
    excluded_port: u16,
    probe_timeout: Duration,
    max_failures: u32,
}

impl Discovery {
    pub fn new(config: &HubConfig) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            port_start: config.port_start,
            port_end: config.port_end,
            excluded_port: config.excluded_port(),
            probe_timeout: config.probe_timeout(),
            max_failures: config.max_failures,
        }
    }

    /// Probe every port in the range concurrently and fold the results into
    /// the cache. Probes never retry within a tick.
    pub async fn scan_once(&self) {
        let client = reqwest::Client::builder()
            .timeout(self.probe_timeout)
            .build()
            .unwrap_or_default();

        let probes = (self.port_start..=self.port_end)
            .filter(|port| *port != self.excluded_port)
            .map(|port| probe(client.clone(), port));
        let results = futures_util::future::join_all(probes).await;

        for (url, status) in results {
            self.apply_probe(&url, status).await;
        }
    }

    /// Fold one probe result into the cache.
    ///
    /// Success resets the failure counter and upserts by URL. Failure bumps
    /// the counter for a known URL; at `max_failures` consecutive misses the
    /// entry is dropped.
    pub async fn apply_probe(&self, url: &str, status: Option<ComponentStatus>) {
        let mut cache = self.cache.write().await;
        match status {
            Some(mut status) => {
                status.url = url.to_owned();
                status.last_seen = Utc::now();
                status.fail_count = 0;
                cache.insert(url.to_owned(), status);
            }
            None => {
                if let Some(entry) = cache.get_mut(url) {
                    entry.fail_count += 1;
                    if entry.fail_count >= self.max_failures {
                        let failures = entry.fail_count;
                        cache.remove(url);
                        tracing::warn!(
                            url = %url,
                            failures,
                            "dropping component after consecutive probe failures"
                        );
                    }
                }
            }
        }
    }

    pub async fn get(&self, url: &str) -> Option<ComponentStatus> {
        self.cache.read().await.get(url).cloned()
    }

    /// Snapshot of every cached component, ordered by URL.
    pub async fn all(&self) -> Vec<ComponentStatus> {
        let cache = self.cache.read().await;
        let mut list: Vec<ComponentStatus> = cache.values().cloned().collect();
        list.sort_by(|a, b| a.url.cmp(&b.url));
        list
    }

    pub async fn agents(&self) -> Vec<ComponentStatus> {
        self.filtered(|c| c.kind == ComponentType::Agent).await
    }

    pub async fn directors(&self) -> Vec<ComponentStatus> {
        self.filtered(|c| c.kind == ComponentType::Director).await
    }

    pub async fn helpers(&self) -> Vec<ComponentStatus> {
        self.filtered(|c| c.kind == ComponentType::Helper).await
    }

    pub async fn taskables(&self) -> Vec<ComponentStatus> {
        self.filtered(|c| c.has_interface(IFACE_TASKABLE)).await
    }

    pub async fn observables(&self) -> Vec<ComponentStatus> {
        self.filtered(|c| c.has_interface(IFACE_OBSERVABLE)).await
    }

    async fn filtered(&self, pred: impl Fn(&ComponentStatus) -> bool) -> Vec<ComponentStatus> {
        let cache = self.cache.read().await;
        let mut list: Vec<ComponentStatus> = cache.values().filter(|c| pred(c)).cloned().collect();
        list.sort_by(|a, b| a.url.cmp(&b.url));
        list
    }
}

/// Probe one loopback port for a component status.
///
/// Success requires a 200 response whose body decodes as [`ComponentStatus`];
/// anything else (refused connection, timeout, non-200, garbage body) is a
/// silent miss.
async fn probe(client: reqwest::Client, port: u16) -> (String, Option<ComponentStatus>) {
    let url = format!("http://127.0.0.1:{port}");
    let status = match client.get(format!("{url}/status")).send().await {
        Ok(resp) if resp.status().as_u16() == 200 => {
            resp.json::<ComponentStatus>().await.ok()
        }
        Ok(_) | Err(_) => None,
    };
    (url, status)
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod tests;
