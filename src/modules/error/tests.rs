use crate::{
    modules::error::{
        code::{ErrorCategory, ErrorCode},
        SendRequestError,
    },
    raise_error,
};

#[test]
fn error_codes_map_to_taxonomy() {
    assert_eq!(ErrorCode::NetworkError.category(), ErrorCategory::Transient);
    assert_eq!(ErrorCode::ConnectionTimeout.category(), ErrorCategory::Transient);
    assert_eq!(
        ErrorCode::JwtAuthFailure.category(),
        ErrorCategory::Authentication
    );
    assert_eq!(ErrorCode::StorageError.category(), ErrorCategory::Storage);
    assert_eq!(ErrorCode::BadApiKey.category(), ErrorCategory::Permanent);
    assert!(ErrorCode::TooManyRequest.is_retryable());
    assert!(!ErrorCode::InvalidParameter.is_retryable());
}

#[test]
fn generic_error_keeps_code_and_message() {
    let error = raise_error!("disk full".into(), ErrorCode::StorageError);
    assert_eq!(error.code(), ErrorCode::StorageError);
    assert_eq!(error.message(), "disk full");
    assert_eq!(error.to_string(), "disk full");

    let surfaced: SendRequestError = error.into();
    assert_eq!(surfaced.reason.as_deref(), Some("disk full"));
    assert_eq!(surfaced.http_status_code, None);
}

#[test]
fn send_request_error_display() {
    let error = SendRequestError::with_status("Invalid Request", 400);
    assert_eq!(error.to_string(), "Error(400): Invalid Request");
    assert!(!error.is_unauthorized());
    assert!(SendRequestError::with_status("jwt", 401).is_unauthorized());
}
