// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable error codes for the hub API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubError {
    ValidationError,
    AgentNotFound,
    AgentBusy,
    AgentKindMismatch,
    AgentError,
    ParseError,
    ReadError,
    NotFound,
    QueueFull,
    QueueError,
    RateLimited,
    Unauthorized,
    InvalidCode,
    SessionError,
    ShutdownUnavailable,
    MarshalError,
}

impl HubError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ValidationError => 400,
            Self::AgentNotFound => 400,
            Self::AgentBusy => 409,
            Self::AgentKindMismatch => 400,
            Self::AgentError => 502,
            Self::ParseError => 400,
            Self::ReadError => 400,
            Self::NotFound => 404,
            Self::QueueFull => 503,
            Self::QueueError => 500,
            Self::RateLimited => 429,
            Self::Unauthorized => 401,
            Self::InvalidCode => 401,
            Self::SessionError => 500,
            Self::ShutdownUnavailable => 503,
            Self::MarshalError => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::AgentNotFound => "agent_not_found",
            Self::AgentBusy => "agent_busy",
            Self::AgentKindMismatch => "agent_kind_mismatch",
            Self::AgentError => "agent_error",
            Self::ParseError => "parse_error",
            Self::ReadError => "read_error",
            Self::NotFound => "not_found",
            Self::QueueFull => "queue_full",
            Self::QueueError => "queue_error",
            Self::RateLimited => "rate_limited",
            Self::Unauthorized => "unauthorized",
            Self::InvalidCode => "invalid_code",
            Self::SessionError => "session_error",
            Self::ShutdownUnavailable => "shutdown_unavailable",
            Self::MarshalError => "marshal_error",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorResponse {
        ErrorResponse { error: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_error_body(message)))
    }
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error envelope: machine-readable code plus human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
