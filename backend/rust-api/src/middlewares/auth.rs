use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::error::AppError;
use crate::models::user::{User, UserType};
use crate::services::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JwtClaims {
    pub sub: String,         // user id
    pub user_type: UserType, // admin checks read this
    pub exp: usize,          // expiration timestamp
    pub iat: usize,          // issued at timestamp
}

impl JwtClaims {
    pub fn is_admin(&self) -> bool {
        self.user_type == UserType::Admin
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    ExpiredToken,
    #[error("Missing authorization token")]
    MissingToken,
    #[error("Invalid token signature")]
    InvalidSignature,
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Unauthorized(err.to_string())
    }
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_seconds: i64,
}

impl JwtService {
    pub fn new(secret: &str, ttl_seconds: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_seconds,
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let now = chrono::Utc::now().timestamp();
        let claims = JwtClaims {
            sub: user.id.clone(),
            user_type: user.user_type,
            exp: (now + self.ttl_seconds).max(0) as usize,
            iat: now.max(0) as usize,
        };
        self.generate_token(&claims)
    }

    pub fn generate_token(&self, claims: &JwtClaims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|_| AuthError::InvalidToken)
    }

    pub fn verify(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);

        decode::<JwtClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                _ => AuthError::InvalidToken,
            })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verifies the bearer token and stores its claims in request extensions.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&headers).ok_or(AuthError::MissingToken)?;

    let claims = state.jwt.verify(token).map_err(|e| {
        tracing::warn!("JWT validation failed: {}", e);
        e
    })?;

    tracing::debug!(user_id = %claims.sub, user_type = claims.user_type.as_str(), "Authenticated request");

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

pub async fn admin_guard_middleware(request: Request, next: Next) -> Result<Response, AppError> {
    if let Some(claims) = request.extensions().get::<JwtClaims>() {
        if claims.is_admin() {
            return Ok(next.run(request).await);
        }
    }
    tracing::warn!("Access denied: admin role required");
    Err(AppError::access_denied("Admin access required"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(user_type: UserType) -> User {
        User::new("ada".into(), "ada@example.com".into(), "hash".into(), user_type)
    }

    #[test]
    fn test_jwt_generation_and_validation() {
        let service = JwtService::new("test-secret", 3600);
        let user = user(UserType::Admin);

        let token = service.issue(&user).unwrap();
        let claims = service.verify(&token).unwrap();

        assert_eq!(claims.sub, user.id);
        assert!(claims.is_admin());
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let token = JwtService::new("one", 3600).issue(&user(UserType::Regular)).unwrap();
        let err = JwtService::new("two", 3600).verify(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidSignature));
    }

    #[test]
    fn rejects_expired_token() {
        let service = JwtService::new("test-secret", 3600);
        let now = chrono::Utc::now().timestamp() as usize;
        let token = service
            .generate_token(&JwtClaims {
                sub: "u1".into(),
                user_type: UserType::Regular,
                exp: now - 7200,
                iat: now - 10_800,
            })
            .unwrap();

        assert!(matches!(service.verify(&token), Err(AuthError::ExpiredToken)));
    }

    #[test]
    fn bare_user_id_is_not_a_token() {
        let service = JwtService::new("test-secret", 3600);
        assert!(matches!(
            service.verify("64f1c2a9e4b0a1b2c3d4e5f6"),
            Err(AuthError::InvalidToken)
        ));
    }
}
