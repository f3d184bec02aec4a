// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt::Formatter;

use code::ErrorCode;
use serde::{Deserialize, Serialize};
use snafu::{Location, Snafu};

pub mod code;
#[cfg(test)]
mod tests;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PushlineError {
    #[snafu(display("{message}"))]
    Generic {
        message: String,
        #[snafu(implicit)]
        location: Location,
        code: ErrorCode,
    },
}

pub type PushlineResult<T, E = PushlineError> = std::result::Result<T, E>;

impl PushlineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PushlineError::Generic { code, .. } => *code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            PushlineError::Generic { message, .. } => message,
        }
    }
}

/// The failure handed to request callers and stored as a task's failure data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequestError {
    pub reason: Option<String>,
    pub data: Option<Vec<u8>>,
    pub http_status_code: Option<u16>,
    /// The `code` field of the API error body, when the server sent one.
    pub api_code: Option<String>,
}

impl SendRequestError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn with_status(reason: impl Into<String>, http_status_code: u16) -> Self {
        Self {
            reason: Some(reason.into()),
            http_status_code: Some(http_status_code),
            ..Default::default()
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.http_status_code == Some(401)
    }
}

impl From<PushlineError> for SendRequestError {
    fn from(error: PushlineError) -> Self {
        match error {
            PushlineError::Generic {
                message,
                location,
                code,
            } => {
                tracing::debug!(
                    "request error: [{:#?}] {} at {:?}",
                    code,
                    message,
                    location
                );
                SendRequestError::new(message)
            }
        }
    }
}

impl std::fmt::Display for SendRequestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let reason = self.reason.as_deref().unwrap_or("unknown reason");
        match self.http_status_code {
            Some(status) => write!(f, "Error({}): {}", status, reason),
            None => write!(f, "Error: {}", reason),
        }
    }
}

impl std::error::Error for SendRequestError {}
