// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser authentication: password login, device pairing, rate limiting.

pub mod rate_limit;
pub mod store;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Sliding lifetime of a password-login session.
pub const AUTH_SESSION_TTL_HOURS: i64 = 12;
/// Lifetime of an unredeemed pairing code.
pub const PAIRING_CODE_TTL_SECS: i64 = 600;
/// Length of a pairing code.
pub const PAIRING_CODE_LEN: usize = 8;

const PAIRING_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// How a browser session was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Password login; expires unless refreshed.
    Auth,
    /// Paired device; never expires.
    Device,
}

/// A browser's credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: SessionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Absent for device sessions: they never expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub user_agent: String,
}

impl AuthSession {
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() > expires_at,
            None => false,
        }
    }
}

/// A one-shot device-enrolment token. Only the Argon2id hash of the code
/// is kept; used or expired codes are pruned on the next mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingCode {
    pub code_hash: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub used: bool,
}

impl PairingCode {
    pub fn is_dead(&self) -> bool {
        self.used || Utc::now() > self.expires_at
    }
}

/// Generate a 64-hex session ID from 32 random bytes.
pub fn new_session_id() -> String {
    use std::fmt::Write;

    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    let mut hex = String::with_capacity(64);
    for b in &bytes {
        let _ = write!(hex, "{b:02x}");
    }
    hex
}

/// Generate an 8-character base32 pairing code.
pub fn new_pairing_code() -> String {
    let mut rng = rand::rng();
    (0..PAIRING_CODE_LEN)
        .map(|_| PAIRING_ALPHABET[rng.random_range(0..PAIRING_ALPHABET.len())] as char)
        .collect()
}

/// Expiry timestamp for a fresh or refreshed login session.
pub fn auth_session_deadline(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::hours(AUTH_SESSION_TTL_HOURS)
}
