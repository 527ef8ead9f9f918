//! Bearer credential handling

/// Separator between a local identifier and the upstream session token
/// (URL-encoded `::`).
pub const CREDENTIAL_SEPARATOR: &str = "%3A%3A";

/// Extract the token from an `Authorization: Bearer <token>` header value.
/// The scheme name is matched case-insensitively.
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    let (scheme, token) = header?.trim().split_once(' ')?;
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

/// Drop the local identifier prefix from a credential, if present.
///
/// `"user%3A%3Atoken"` becomes `"token"`; anything without the separator is
/// returned unchanged.
pub fn normalize_credential(credential: &str) -> &str {
    credential
        .split(CREDENTIAL_SEPARATOR)
        .nth(1)
        .unwrap_or(credential)
}
