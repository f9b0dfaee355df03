//! Authentication Middleware
//! Mission: Protect API endpoints with JWT validation

use crate::auth::jwt::JwtHandler;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Auth middleware that validates JWT tokens and stashes the claims in the
/// request extensions for the handlers.
pub async fn auth_middleware(
    State(jwt_handler): State<Arc<JwtHandler>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|t| t.to_string())
        .ok_or(AuthError::MissingToken)?;

    let claims = jwt_handler
        .validate_token(&token)
        .map_err(|_| AuthError::InvalidToken)?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Auth error types
#[derive(Debug)]
pub enum AuthError {
    MissingToken,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Missing authorization token"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid or expired token"),
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::{Claims, UserRole};
    use axum::{body::Body, http::Request as HttpRequest};
    use uuid::Uuid;

    #[test]
    fn test_auth_error_responses() {
        let missing = AuthError::MissingToken.into_response();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let invalid_token = AuthError::InvalidToken.into_response();
        assert_eq!(invalid_token.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_claims_travel_in_extensions() {
        let mut req = HttpRequest::new(Body::empty());
        assert!(req.extensions().get::<Claims>().is_none());

        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            username: "leagueadmin".to_string(),
            role: UserRole::Admin,
            exp: 1234567890,
        };
        req.extensions_mut().insert(claims);

        let extracted = req.extensions().get::<Claims>();
        assert!(extracted.is_some());
        assert_eq!(extracted.unwrap().username, "leagueadmin");
    }
}
