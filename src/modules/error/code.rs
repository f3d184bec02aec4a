// Copyright © 2025 pushline.io
// Licensed under Pushline License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

/// How a failure is treated by the task runner and surfaced to callers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorCategory {
    /// Retried with backoff until the attempt budget runs out.
    Transient,
    /// Routed to the auth manager and not counted against the attempt budget.
    Authentication,
    /// Failed immediately.
    Permanent,
    /// Returned synchronously to whoever touched the store.
    Storage,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum ErrorCode {
    // Client-side errors (10000–10999)
    InvalidParameter = 10000,
    MissingConfiguration = 10010,
    MissingIdentity = 10020,
    SerializationError = 10030,

    // Authentication errors (20000–20999)
    AuthTokenMissing = 20000,
    JwtAuthFailure = 20010,
    BadApiKey = 20020,

    // Resource errors (30000–30999)
    ResourceNotFound = 30000,
    TooManyRequest = 30010,

    // Network errors (40000–40999)
    NetworkError = 40000,
    ConnectionTimeout = 40010,
    HttpResponseError = 40020,

    // Storage errors (60000–60999)
    StorageError = 60000,

    // Internal errors (70000–70999)
    InternalError = 70000,
}

impl ErrorCode {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::NetworkError
            | ErrorCode::ConnectionTimeout
            | ErrorCode::TooManyRequest => ErrorCategory::Transient,
            ErrorCode::AuthTokenMissing | ErrorCode::JwtAuthFailure => {
                ErrorCategory::Authentication
            }
            ErrorCode::StorageError => ErrorCategory::Storage,
            ErrorCode::InvalidParameter
            | ErrorCode::MissingConfiguration
            | ErrorCode::MissingIdentity
            | ErrorCode::SerializationError
            | ErrorCode::BadApiKey
            | ErrorCode::ResourceNotFound
            | ErrorCode::HttpResponseError
            | ErrorCode::InternalError => ErrorCategory::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Transient)
    }
}
