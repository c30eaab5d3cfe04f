//! Request identity extraction.
//!
//! The gateway sits behind the dashboard's reverse proxy, which injects the
//! authenticated user's id as an `x-user-id` header. The extractor only
//! parses that header; ownership checks happen in the gateway service.

use axum::{extract::FromRequestParts, http::request::Parts};
use thiserror::Error;

/// Header carrying the authenticated user's id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Errors from identity extraction.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing {USER_ID_HEADER} header")]
    MissingHeader,

    #[error("invalid {USER_ID_HEADER} header")]
    InvalidHeader,
}

/// The user a request acts as.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub i64);

impl CurrentUser {
    /// Numeric user id.
    pub fn id(&self) -> i64 {
        self.0
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or(AuthError::MissingHeader)?;
        let user_id = value
            .to_str()
            .map_err(|_| AuthError::InvalidHeader)?
            .parse::<i64>()
            .map_err(|_| AuthError::InvalidHeader)?;
        Ok(CurrentUser(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<CurrentUser, AuthError> {
        let (mut parts, _) = request.into_parts();
        CurrentUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_valid_header() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "42")
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap().id(), 42);
    }

    #[tokio::test]
    async fn test_missing_header() {
        let request = Request::builder().body(()).unwrap();
        assert!(matches!(
            extract(request).await,
            Err(AuthError::MissingHeader)
        ));
    }

    #[tokio::test]
    async fn test_garbage_header() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "not-a-number")
            .body(())
            .unwrap();
        assert!(matches!(
            extract(request).await,
            Err(AuthError::InvalidHeader)
        ));
    }
}
