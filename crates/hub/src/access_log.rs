// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only request log: one line per request.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};

/// Access-log writer. Failing to open the file at startup is fatal;
/// write failures after that are logged and dropped.
pub struct AccessLog {
    file: Mutex<File>,
}

impl AccessLog {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }

    /// Record one request:
    /// `<RFC3339 time> <ip> <method> <path> <status> auth_ok|auth_fail`.
    pub fn record(&self, ip: &str, method: &str, path: &str, status: u16, auth_ok: bool) {
        let time = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let auth = if auth_ok { "auth_ok" } else { "auth_fail" };
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(file, "{time} {ip} {method} {path} {status} {auth}") {
            tracing::debug!(err = %e, "access log write failed");
        }
    }
}
