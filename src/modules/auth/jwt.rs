use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::Value;

/// Reads the `exp` claim (seconds since epoch) from a JWT without verifying
/// it. `None` when the token is not a JWT or carries no integer `exp`.
pub fn decode_expiration(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&decoded).ok()?;
    claims.get("exp")?.as_i64()
}

#[cfg(test)]
pub(crate) fn encode_for_test(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"email":"a@b.c","exp":{}}}"#, exp));
    format!("{}.{}.signature", header, payload)
}
