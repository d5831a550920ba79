//! Caller identity extractor.
//!
//! Tokens are verified by the gateway in front of the services, which
//! forwards the verified subject as `X-User-Id` alongside the original
//! `Authorization` header. The bearer is kept verbatim so it can be passed on
//! to downstream services.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use common::UserId;
pub use common::USER_ID_HEADER;

use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    /// Full `Authorization` header value, `Bearer` prefix included.
    pub bearer: String,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let bearer = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .filter(|v| {
                v.strip_prefix("Bearer ")
                    .is_some_and(|token| !token.trim().is_empty())
            })
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("user id is required".to_string()))?;

        Ok(Self {
            user_id: UserId::new(user_id),
            bearer: bearer.to_string(),
        })
    }
}
