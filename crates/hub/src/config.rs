// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

/// Configuration for the agency hub.
#[derive(Debug, Clone, clap::Parser)]
pub struct HubConfig {
    /// Host to bind the public HTTPS listener on.
    #[arg(long, default_value = "0.0.0.0", env = "AGENCY_HOST")]
    pub host: String,

    /// Public HTTPS port.
    #[arg(long, default_value_t = 4443, env = "AGENCY_PORT")]
    pub port: u16,

    /// Optional loopback-only plain-HTTP port for sibling services (no auth).
    #[arg(long, env = "AGENCY_INTERNAL_PORT")]
    pub internal_port: Option<u16>,

    /// First port of the discovery scan range.
    #[arg(long, default_value_t = 4200, env = "AGENCY_PORT_START")]
    pub port_start: u16,

    /// Last port of the discovery scan range (inclusive).
    #[arg(long, default_value_t = 4299, env = "AGENCY_PORT_END")]
    pub port_end: u16,

    /// Port the hub itself occupies, excluded from the scan. 0 means the public port.
    #[arg(long, default_value_t = 0, env = "AGENCY_SELF_PORT")]
    pub self_port: u16,

    /// Discovery scan interval in milliseconds.
    #[arg(long, default_value_t = 10000, env = "AGENCY_REFRESH_MS")]
    pub refresh_ms: u64,

    /// Per-port probe timeout in milliseconds.
    #[arg(long, default_value_t = 500, env = "AGENCY_PROBE_TIMEOUT_MS")]
    pub probe_timeout_ms: u64,

    /// Max consecutive probe failures before a component is dropped.
    #[arg(long, default_value_t = 3, env = "AGENCY_MAX_FAILURES")]
    pub max_failures: u32,

    /// Dispatcher poll interval in milliseconds.
    #[arg(long, default_value_t = 1000, env = "AGENCY_DISPATCH_POLL_MS")]
    pub dispatch_poll_ms: u64,

    /// Completion tracker poll interval in milliseconds.
    #[arg(long, default_value_t = 5000, env = "AGENCY_TRACK_POLL_MS")]
    pub track_poll_ms: u64,

    /// Max dispatch attempts per queued task before it is failed.
    #[arg(long, default_value_t = 3, env = "AGENCY_MAX_ATTEMPTS")]
    pub max_attempts: u32,

    /// Maximum number of tasks held in the work queue.
    #[arg(long, default_value_t = 100, env = "AGENCY_MAX_QUEUE_SIZE")]
    pub max_queue_size: usize,

    /// Directory for all persisted state (auth store, queue, certs, access log).
    #[arg(long, default_value = "agency-data", env = "AGENCY_STATE_DIR")]
    pub state_dir: PathBuf,

    /// Password for browser login. Unset means login always fails.
    #[arg(long, env = "AGENCY_PASSWORD")]
    pub password: Option<String>,

    /// TLS certificate path. Defaults to `<state_dir>/cert.pem`.
    #[arg(long, env = "AGENCY_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// TLS key path. Defaults to `<state_dir>/key.pem`.
    #[arg(long, env = "AGENCY_TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    /// Generate a self-signed certificate when none exists.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, env = "AGENCY_TLS_AUTO")]
    pub tls_auto_generate: bool,

    /// Allow `POST /api/shutdown` to stop the hub.
    #[arg(long, default_value_t = false, env = "AGENCY_ENABLE_SHUTDOWN")]
    pub enable_shutdown: bool,
}

impl HubConfig {
    pub fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.refresh_ms)
    }

    pub fn probe_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn dispatch_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.dispatch_poll_ms)
    }

    pub fn track_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.track_poll_ms)
    }

    /// Port excluded from discovery scans.
    pub fn excluded_port(&self) -> u16 {
        if self.self_port == 0 {
            self.port
        } else {
            self.self_port
        }
    }

    pub fn auth_store_path(&self) -> PathBuf {
        self.state_dir.join("auth.json")
    }

    pub fn queue_dir(&self) -> PathBuf {
        self.state_dir.join("queue")
    }

    pub fn access_log_path(&self) -> PathBuf {
        self.state_dir.join("access.log")
    }

    pub fn tls_cert_path(&self) -> PathBuf {
        self.tls_cert.clone().unwrap_or_else(|| self.state_dir.join("cert.pem"))
    }

    pub fn tls_key_path(&self) -> PathBuf {
        self.tls_key.clone().unwrap_or_else(|| self.state_dir.join("key.pem"))
    }
}
