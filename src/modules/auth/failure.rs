use serde::{Deserialize, Serialize};

/// Why a token was rejected, as reported to the host.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AuthFailureReason {
    AuthTokenExpired,
    AuthTokenGenericError,
    AuthTokenExpirationInvalid,
    AuthTokenSignatureInvalid,
    AuthTokenFormatInvalid,
    AuthTokenInvalidated,
    AuthTokenPayloadInvalid,
    AuthTokenUserKeyInvalid,
    AuthTokenNull,
    AuthTokenGenerationError,
    AuthTokenMissing,
}

impl AuthFailureReason {
    /// Maps the server's error message to a reason.
    pub fn from_message(message: Option<&str>) -> Self {
        let Some(message) = message else {
            return AuthFailureReason::AuthTokenGenericError;
        };
        let message = message.to_lowercase();
        if message.contains("exp must be less than 1 year from iat") {
            AuthFailureReason::AuthTokenExpirationInvalid
        } else if message.contains("jwt format is invalid") {
            AuthFailureReason::AuthTokenFormatInvalid
        } else if message.contains("jwt token is expired") {
            AuthFailureReason::AuthTokenExpired
        } else if message.contains("jwt is invalid") {
            AuthFailureReason::AuthTokenSignatureInvalid
        } else if message.contains("jwt payload requires a value") {
            AuthFailureReason::AuthTokenPayloadInvalid
        } else if message.contains("jwt token has been invalidated") {
            AuthFailureReason::AuthTokenInvalidated
        } else if message.contains("invalid payload") {
            AuthFailureReason::AuthTokenPayloadInvalid
        } else if message.contains("jwt authorization header is not set") {
            AuthFailureReason::AuthTokenMissing
        } else {
            AuthFailureReason::AuthTokenGenericError
        }
    }
}

/// Sent to [`super::manager::AuthDelegate::on_auth_failure`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthFailure {
    /// Email or user id the token was issued for.
    pub user_key: Option<String>,
    pub failed_auth_token: Option<String>,
    /// Seconds since epoch.
    pub failed_request_time: i64,
    pub failure_reason: AuthFailureReason,
}

#[cfg(test)]
mod tests {
    use super::AuthFailureReason;

    #[test]
    fn maps_server_messages() {
        assert_eq!(
            AuthFailureReason::from_message(Some("JWT token is expired")),
            AuthFailureReason::AuthTokenExpired
        );
        assert_eq!(
            AuthFailureReason::from_message(Some("JWT Authorization header is not set")),
            AuthFailureReason::AuthTokenMissing
        );
        assert_eq!(
            AuthFailureReason::from_message(Some("something else")),
            AuthFailureReason::AuthTokenGenericError
        );
        assert_eq!(
            AuthFailureReason::from_message(None),
            AuthFailureReason::AuthTokenGenericError
        );
    }
}
