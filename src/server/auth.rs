//! Admin authentication gate.
//!
//! The endpoint consumes a yes/no "is this caller an admin" decision through
//! [`AdminAuthenticator`]. The gate runs before the body is parsed, so a
//! rejected caller never reaches validation or execution.

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing authorization header")]
    MissingCredentials,

    #[error("invalid admin credentials")]
    InvalidCredentials,

    #[error("no admin credential is configured")]
    NotConfigured,
}

/// Decides whether a request comes from an authorized administrator.
#[async_trait]
pub trait AdminAuthenticator: Send + Sync {
    async fn require_admin(&self, headers: &HeaderMap) -> Result<(), AuthError>;
}

/// Accepts `Authorization: Bearer <token>` matching the configured token.
///
/// An empty configured token denies every request.
#[derive(Clone)]
pub struct BearerTokenAuthenticator {
    token: String,
}

impl std::fmt::Debug for BearerTokenAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenAuthenticator")
            .field("configured", &!self.token.is_empty())
            .finish()
    }
}

impl BearerTokenAuthenticator {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl AdminAuthenticator for BearerTokenAuthenticator {
    async fn require_admin(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        if self.token.is_empty() {
            return Err(AuthError::NotConfigured);
        }

        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthError::MissingCredentials)?;

        let expected = format!("Bearer {}", self.token);
        if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[tokio::test]
    async fn test_valid_token_accepted() {
        let auth = BearerTokenAuthenticator::new("s3cret");
        assert!(auth.require_admin(&headers_with("Bearer s3cret")).await.is_ok());
    }

    #[tokio::test]
    async fn test_wrong_or_missing_token_rejected() {
        let auth = BearerTokenAuthenticator::new("s3cret");
        assert_eq!(
            auth.require_admin(&headers_with("Bearer nope")).await,
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(
            auth.require_admin(&headers_with("s3cret")).await,
            Err(AuthError::InvalidCredentials)
        );
        assert_eq!(
            auth.require_admin(&HeaderMap::new()).await,
            Err(AuthError::MissingCredentials)
        );
    }

    #[tokio::test]
    async fn test_empty_token_denies_everyone() {
        let auth = BearerTokenAuthenticator::new("");
        assert_eq!(
            auth.require_admin(&headers_with("Bearer ")).await,
            Err(AuthError::NotConfigured)
        );
    }

    #[test]
    fn test_debug_does_not_print_token() {
        let auth = BearerTokenAuthenticator::new("s3cret");
        assert!(!format!("{:?}", auth).contains("s3cret"));
    }

    #[tokio::test]
    async fn test_token_prefix_and_extension_rejected() {
        let auth = BearerTokenAuthenticator::new("s3cret");
        for presented in ["Bearer s3cre", "Bearer s3cret2", "Bearer s3cres", "bearer s3cret"] {
            assert_eq!(
                auth.require_admin(&headers_with(presented)).await,
                Err(AuthError::InvalidCredentials),
                "presented {:?}",
                presented
            );
        }
    }
}
