use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::modules::{
    error::{PushlineResult, SendRequestError},
    network::transport::{HttpRequest, HttpResponse, NetworkTransport},
};

pub const JWT_ERROR_CODES: [&str; 3] = [
    "InvalidJwtPayload",
    "BadAuthorizationHeader",
    "JwtUserIdentifiersMismatched",
];

/// Classified result of one network call.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Success(Value),
    /// Network error, timeout, 408, 429 or 5xx.
    Transient(SendRequestError),
    /// 401 carrying one of [`JWT_ERROR_CODES`].
    Auth(SendRequestError),
    Permanent(SendRequestError),
}

pub fn matches_jwt_error_code(error: &SendRequestError) -> bool {
    error.is_unauthorized()
        && error
            .api_code
            .as_deref()
            .is_some_and(|code| JWT_ERROR_CODES.contains(&code))
}

#[derive(Clone)]
pub struct RequestSender {
    transport: Arc<dyn NetworkTransport>,
}

impl RequestSender {
    pub fn new(transport: Arc<dyn NetworkTransport>) -> Self {
        Self { transport }
    }

    pub async fn send(&self, request: HttpRequest) -> SendOutcome {
        debug!("{} {}", request.method, request.url);
        classify(self.transport.send(request).await)
    }
}

pub fn classify(result: PushlineResult<HttpResponse>) -> SendOutcome {
    let response = match result {
        Ok(response) => response,
        Err(e) => return SendOutcome::Transient(SendRequestError::new(e.message())),
    };

    let json = parse_body(&response.body);
    let status = response.status;

    if (200..300).contains(&status) {
        return match json {
            Ok(value) => SendOutcome::Success(value),
            Err(reason) => SendOutcome::Permanent(SendRequestError {
                reason: Some(reason),
                data: Some(response.body),
                http_status_code: Some(status),
                api_code: None,
            }),
        };
    }

    let body = json.ok();
    let message = body
        .as_ref()
        .and_then(|v| v.get("msg"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let api_code = body
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let default_reason = if status >= 500 {
        "Internal Server Error"
    } else {
        "Invalid Request"
    };
    let error = SendRequestError {
        reason: Some(message.unwrap_or_else(|| default_reason.to_string())),
        data: Some(response.body),
        http_status_code: Some(status),
        api_code,
    };

    match status {
        401 if matches_jwt_error_code(&error) => SendOutcome::Auth(error),
        408 | 429 => SendOutcome::Transient(error),
        s if s >= 500 => SendOutcome::Transient(error),
        _ => SendOutcome::Permanent(error),
    }
}

fn parse_body(body: &[u8]) -> Result<Value, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_slice(body).map_err(|e| format!("could not parse json: {}", e))
}
