//! JWT authentication extractors
//!
//! - `AuthUser` for any authenticated caller
//! - `AdminUser` for callers holding the surveys admin permission

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use std::ops::Deref;

use crate::domain::{Identity, Tenant};
use crate::jwt::Claims;
use crate::state::HasServices;

/// Authenticated caller, as described by a verified access token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub claims: Claims,
}

impl AuthUser {
    pub fn actor(&self) -> Identity {
        self.claims.actor()
    }

    pub fn tenant(&self) -> Tenant {
        self.claims.tenant()
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.claims.has_permission(permission)
    }

    pub fn can_access(&self, app_id: &str, org_id: &str, system: bool) -> bool {
        self.claims.can_access(app_id, org_id, system)
    }
}

/// Authentication errors
#[derive(Debug, Clone)]
pub enum AuthError {
    /// No Authorization header present
    MissingToken,
    /// Invalid Authorization header format
    InvalidHeader(String),
    /// Token validation failed
    InvalidToken(String),
    /// Valid token without the required permission
    Forbidden,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            AuthError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "Missing authorization token",
                "UNAUTHORIZED",
            ),
            AuthError::InvalidHeader(_) => (
                StatusCode::UNAUTHORIZED,
                "Invalid authorization header",
                "UNAUTHORIZED",
            ),
            AuthError::InvalidToken(_) => {
                (StatusCode::UNAUTHORIZED, "Invalid token", "UNAUTHORIZED")
            }
            AuthError::Forbidden => (
                StatusCode::FORBIDDEN,
                "Surveys admin permission required",
                "FORBIDDEN",
            ),
        };

        let body = serde_json::json!({
            "error": message,
            "code": code
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Extract the Bearer token from the Authorization header
pub(crate) fn extract_bearer_token(headers: &axum::http::HeaderMap) -> Result<&str, AuthError> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidHeader("Invalid header encoding".to_string()))?;

    auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        AuthError::InvalidHeader("Authorization header must use Bearer scheme".to_string())
    })
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: HasServices + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)?;
        let claims = state
            .jwt_manager()
            .verify_token(token)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        Ok(AuthUser { claims })
    }
}

/// An [`AuthUser`] holding `surveys_admin` or `all_surveys`
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

impl Deref for AdminUser {
    type Target = AuthUser;

    fn deref(&self) -> &AuthUser {
        &self.0
    }
}

impl<S> FromRequestParts<S> for AdminUser
where
    S: HasServices + Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.claims.is_admin() {
            return Err(AuthError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_extract_bearer_token_missing() {
        let headers = HeaderMap::new();
        assert!(matches!(
            extract_bearer_token(&headers),
            Err(AuthError::MissingToken)
        ));
    }

    #[test]
    fn test_extract_bearer_token_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Basic dXNlcjpwYXNz".parse().unwrap());
        assert!(matches!(
            extract_bearer_token(&headers),
            Err(AuthError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_forbidden_response_status() {
        let response = AuthError::Forbidden.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
