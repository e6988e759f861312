use crate::{errors::AppError, models::User, AppState};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use std::sync::Arc;
use uuid::Uuid;

/// The authenticated caller, resolved from an `Authorization: Token <key>`
/// header. Handlers that require identity take this as an extractor;
/// anything missing or unknown rejects with 401 before the handler runs.
pub struct AuthUser(pub User);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing Authorization header".to_string()))?;

        let key = token_key(header_value)
            .ok_or_else(|| AppError::Unauthorized("expected 'Token <key>' credentials".to_string()))?;

        match state.users.user_for_token(key).await? {
            Some(user) => Ok(AuthUser(user)),
            None => {
                tracing::warn!("Rejected request with unknown auth token");
                Err(AppError::Unauthorized("invalid token".to_string()))
            }
        }
    }
}

/// Extracts the key from a `Token <key>` authorization header value.
fn token_key(header_value: &str) -> Option<&str> {
    let key = header_value.strip_prefix("Token ")?.trim();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// Mints an opaque token key. Issuance is a deliberate step in user
/// provisioning, not a side effect hanging off user creation.
pub fn issue_token() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_token_scheme() {
        assert_eq!(token_key("Token abc123"), Some("abc123"));
        assert_eq!(token_key("Token   abc123  "), Some("abc123"));
    }

    #[test]
    fn rejects_other_schemes_and_empty_keys() {
        assert_eq!(token_key("Bearer abc123"), None);
        assert_eq!(token_key("Token "), None);
        assert_eq!(token_key("Token"), None);
        assert_eq!(token_key(""), None);
    }

    #[test]
    fn issued_tokens_are_distinct() {
        assert_ne!(issue_token(), issue_token());
    }
}
