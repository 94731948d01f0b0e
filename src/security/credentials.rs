use axum::http::{header, HeaderMap};
use base64::Engine;

/// Header carrying the application key on every API request
pub const APP_KEY_HEADER: &str = "x-credentials";

/// Compare secrets without an early exit. Always walks the full expected
/// value, so timing reveals neither a matching prefix nor the provided length.
pub fn secrets_match(provided: &[u8], expected: &[u8]) -> bool {
    let mut diff = provided.len() ^ expected.len();

    for (i, byte) in expected.iter().enumerate() {
        let other = provided.get(i).copied().unwrap_or(!byte);
        diff |= usize::from(byte ^ other);
    }

    diff == 0
}

pub fn verify_app_key(provided: &str, expected: &str) -> bool {
    secrets_match(provided.as_bytes(), expected.as_bytes())
}

pub fn app_key_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers.get(APP_KEY_HEADER)?.to_str().ok()
}

/// Extract the token from `Authorization: Bearer <token>`.
/// The scheme is matched case-insensitively.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Decode `Authorization: Basic <base64(user:password)>`.
/// The password may itself contain ':'.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;

    Some((user.to_string(), password.to_string()))
}
