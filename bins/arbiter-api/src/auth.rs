// Caller identity as forwarded by the authenticating gateway

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use arbiter_common::types::UserRef;

use crate::handlers::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";

/// The bearer credential itself is validated upstream; this only requires
/// that one was presented together with the resolved user id.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub UserRef);

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

impl AuthenticatedUser {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let token = header_value(headers, AUTHORIZATION.as_str())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty());
        if token.is_none() {
            return Err(ApiError::Unauthorized("Missing bearer token".into()));
        }

        let id = header_value(headers, USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("Missing user identity".into()))?;
        let name = header_value(headers, USER_NAME_HEADER).unwrap_or(id);

        Ok(Self(UserRef {
            id: id.to_string(),
            name: name.to_string(),
        }))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}
