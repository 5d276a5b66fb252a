//! Bearer-token authentication and admin gating.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};

use crate::error::{AppError, Result};
use crate::services::auth::Claims;
use crate::AppState;

/// Extracts the Bearer token from the Authorization header.
fn extract_bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Validates the bearer token and stores its claims in the request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    let token = extract_bearer_token(&request).ok_or(AppError::Unauthorized)?;
    let claims = state.auth_service().verify_token(token)?;

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Rejects callers whose token does not carry the admin role.
///
/// Must run after `auth_middleware`.
pub async fn require_admin(request: Request<Body>, next: Next) -> Result<Response> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or(AppError::Unauthorized)?;

    if !claims.is_admin() {
        tracing::debug!(user_id = claims.sub, "Admin route refused");
        return Err(AppError::Forbidden);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with(header: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder();
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_extract_bearer_token_valid() {
        let request = request_with(Some("Bearer my-token-123"));
        assert_eq!(extract_bearer_token(&request), Some("my-token-123"));
    }

    #[test]
    fn test_extract_bearer_token_missing_header() {
        assert_eq!(extract_bearer_token(&request_with(None)), None);
    }

    #[test]
    fn test_extract_bearer_token_wrong_scheme() {
        let request = request_with(Some("Basic dXNlcjpwYXNz"));
        assert_eq!(extract_bearer_token(&request), None);
    }

    #[test]
    fn test_extract_bearer_token_blank() {
        let request = request_with(Some("Bearer   "));
        assert_eq!(extract_bearer_token(&request), None);
    }
}
