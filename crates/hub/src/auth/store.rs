// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auth store: password verification plus session and pairing-code
//! persistence in a single owner-only JSON file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::auth::{
    auth_session_deadline, new_pairing_code, new_session_id, AuthSession, PairingCode,
    SessionKind, PAIRING_CODE_TTL_SECS,
};
use crate::persist;

/// Sliding-expiry refreshes are persisted at most this often per session.
const REFRESH_MIN_SECS: i64 = 60;

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedAuth {
    sessions: Vec<AuthSession>,
    pairing_codes: Vec<PairingCode>,
}

#[derive(Default)]
struct AuthInner {
    sessions: HashMap<String, AuthSession>,
    pairing_codes: Vec<PairingCode>,
}

/// Owner of all browser credentials.
pub struct AuthStore {
    inner: Mutex<AuthInner>,
    path: PathBuf,
    password_hash: Option<String>,
}

impl AuthStore {
    /// Open the store, creating its directory and filtering stale entries
    /// from any persisted file. A missing password disables login.
    pub fn open(path: &Path, password: Option<&str>) -> anyhow::Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let password_hash = match password {
            Some(password) if !password.is_empty() => Some(hash_secret(password)?),
            _ => None,
        };

        let mut inner = AuthInner::default();
        if path.exists() {
            let loaded: PersistedAuth = persist::load(path)?;
            for session in loaded.sessions {
                if !session.is_expired() {
                    inner.sessions.insert(session.id.clone(), session);
                }
            }
            inner.pairing_codes =
                loaded.pairing_codes.into_iter().filter(|c| !c.is_dead()).collect();
        }

        Ok(Self { inner: Mutex::new(inner), path: path.to_owned(), password_hash })
    }

    /// Verify the login password and mint an auth session on success.
    pub async fn login(
        &self,
        password: &str,
        ip_address: &str,
        user_agent: &str,
    ) -> anyhow::Result<Option<AuthSession>> {
        let Some(ref hash) = self.password_hash else {
            return Ok(None);
        };
        if !verify_secret(password, hash) {
            return Ok(None);
        }

        let now = Utc::now();
        let session = AuthSession {
            id: new_session_id(),
            kind: SessionKind::Auth,
            label: None,
            created_at: now,
            last_seen: now,
            expires_at: Some(auth_session_deadline(now)),
            ip_address: ip_address.to_owned(),
            user_agent: user_agent.to_owned(),
        };

        let mut inner = self.inner.lock().await;
        inner.sessions.insert(session.id.clone(), session.clone());
        self.persist_locked(&inner)?;
        Ok(Some(session))
    }

    /// Mint a pairing code, storing only its hash. Returns the plaintext.
    pub async fn create_pairing_code(&self) -> anyhow::Result<String> {
        let code = new_pairing_code();
        let pairing = PairingCode {
            code_hash: hash_secret(&code)?,
            expires_at: Utc::now() + Duration::seconds(PAIRING_CODE_TTL_SECS),
            used: false,
        };

        let mut inner = self.inner.lock().await;
        inner.pairing_codes.retain(|c| !c.is_dead());
        inner.pairing_codes.push(pairing);
        self.persist_locked(&inner)?;
        Ok(code)
    }

    /// Redeem a pairing code for a device session. The code transitions
    /// `used` exactly once; a second redemption fails.
    pub async fn redeem_pairing_code(
        &self,
        code: &str,
        label: Option<&str>,
        ip_address: &str,
        user_agent: &str,
    ) -> anyhow::Result<Option<AuthSession>> {
        let mut inner = self.inner.lock().await;
        inner.pairing_codes.retain(|c| !c.is_dead());

        let Some(matched) = inner
            .pairing_codes
            .iter_mut()
            .find(|c| !c.used && verify_secret(code, &c.code_hash))
        else {
            self.persist_locked(&inner)?;
            return Ok(None);
        };
        matched.used = true;

        let now = Utc::now();
        let session = AuthSession {
            id: new_session_id(),
            kind: SessionKind::Device,
            label: label.map(str::to_owned),
            created_at: now,
            last_seen: now,
            expires_at: None,
            ip_address: ip_address.to_owned(),
            user_agent: user_agent.to_owned(),
        };
        inner.sessions.insert(session.id.clone(), session.clone());
        self.persist_locked(&inner)?;
        Ok(Some(session))
    }

    /// Look up a session by cookie value. Expired sessions are dropped;
    /// live login sessions get their sliding expiry pushed out.
    pub async fn validate(&self, session_id: &str) -> Option<AuthSession> {
        let mut inner = self.inner.lock().await;
        let expired = match inner.sessions.get(session_id) {
            Some(session) => session.is_expired(),
            None => return None,
        };
        if expired {
            inner.sessions.remove(session_id);
            self.persist_best_effort(&inner);
            return None;
        }

        let now = Utc::now();
        let mut refreshed = false;
        if let Some(session) = inner.sessions.get_mut(session_id) {
            if now - session.last_seen > Duration::seconds(REFRESH_MIN_SECS) {
                session.last_seen = now;
                if session.kind == SessionKind::Auth {
                    session.expires_at = Some(auth_session_deadline(now));
                }
                refreshed = true;
            }
        }
        if refreshed {
            self.persist_best_effort(&inner);
        }
        inner.sessions.get(session_id).cloned()
    }

    /// Remove a session. Returns false when it was unknown.
    pub async fn revoke(&self, session_id: &str) -> anyhow::Result<bool> {
        let mut inner = self.inner.lock().await;
        let removed = inner.sessions.remove(session_id).is_some();
        if removed {
            self.persist_locked(&inner)?;
        }
        Ok(removed)
    }

    /// All paired-device sessions.
    pub async fn devices(&self) -> Vec<AuthSession> {
        let inner = self.inner.lock().await;
        let mut list: Vec<AuthSession> = inner
            .sessions
            .values()
            .filter(|s| s.kind == SessionKind::Device)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        list
    }

    fn persist_locked(&self, inner: &AuthInner) -> anyhow::Result<()> {
        let state = PersistedAuth {
            sessions: inner.sessions.values().filter(|s| !s.is_expired()).cloned().collect(),
            pairing_codes: inner.pairing_codes.iter().filter(|c| !c.is_dead()).cloned().collect(),
        };
        persist::save(&self.path, &state)
    }

    fn persist_best_effort(&self, inner: &AuthInner) {
        if let Err(e) = self.persist_locked(inner) {
            tracing::error!(path = %self.path.display(), err = %e, "failed to persist auth store");
        }
    }
}

fn hash_secret(secret: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("argon2 hash failed: {e}"))?;
    Ok(hash.to_string())
}

fn verify_secret(secret: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default().verify_password(secret.as_bytes(), &parsed).is_ok()
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
