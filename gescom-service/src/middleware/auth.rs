//! Caller identity extractor.
//!
//! The gateway authenticates users and forwards identity in trusted
//! headers (`x-user-id`, `x-user-role`); this extractor makes that
//! identity available to handlers. Requests without headers run as the
//! default agent identity, which the capability checker rejects for
//! elevated operations when enforcement is on.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use gescom_core::capability::{extract_auth_context, AuthContext};
use gescom_core::error::AppError;

/// Caller identity extracted from trusted gateway headers.
#[derive(Debug, Clone)]
pub struct AuthUser(pub AuthContext);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = extract_auth_context(&parts.headers);

        let span = tracing::Span::current();
        span.record("user_id", ctx.user_id.as_str());

        Ok(AuthUser(ctx))
    }
}
