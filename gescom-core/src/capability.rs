//! Role-based capability checking.
//!
//! The upstream gateway authenticates users and forwards their identity in
//! trusted headers; this module decides whether that identity may perform
//! an operation. When disabled (tests, local development) every check
//! passes but the caller identity is still extracted for logging.

use crate::error::AppError;
use axum::http::HeaderMap;

/// Caller role as forwarded by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Agent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Agent => "agent",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "admin" => Role::Admin,
            _ => Role::Agent,
        }
    }
}

/// Identity of the caller, extracted from trusted headers.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub role: Role,
}

/// Extract the caller identity from trusted gateway headers.
pub fn extract_auth_context(headers: &HeaderMap) -> AuthContext {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("system")
        .to_string();

    let role = headers
        .get("x-user-role")
        .and_then(|v| v.to_str().ok())
        .map(Role::from_string)
        .unwrap_or(Role::Agent);

    AuthContext { user_id, role }
}

/// Capability checker gating state-machine transitions.
///
/// When disabled, the gateway trust model applies and every check passes.
#[derive(Debug, Clone)]
pub struct CapabilityChecker {
    enabled: bool,
}

impl CapabilityChecker {
    pub fn new(enabled: bool) -> Self {
        if enabled {
            tracing::info!("Capability enforcement enabled");
        } else {
            tracing::info!("Capability enforcement disabled (gateway trust model)");
        }
        Self { enabled }
    }

    /// Create a disabled checker (gateway trust model).
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Require the caller's role to be one of `allowed`.
    pub fn require(&self, ctx: &AuthContext, allowed: &[Role]) -> Result<(), AppError> {
        if !self.enabled || allowed.contains(&ctx.role) {
            return Ok(());
        }

        tracing::warn!(
            user_id = %ctx.user_id,
            role = ctx.role.as_str(),
            "Permission denied: role not allowed for this operation"
        );
        Err(AppError::Forbidden(anyhow::anyhow!(
            "Role '{}' is not allowed to perform this operation",
            ctx.role.as_str()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn disabled_checker_allows_all() {
        let checker = CapabilityChecker::disabled();
        assert!(!checker.is_enabled());

        let ctx = AuthContext {
            user_id: "user-123".to_string(),
            role: Role::Agent,
        };
        assert!(checker.require(&ctx, &[Role::Admin]).is_ok());
    }

    #[test]
    fn enabled_checker_rejects_missing_role() {
        let checker = CapabilityChecker::new(true);

        let ctx = AuthContext {
            user_id: "user-123".to_string(),
            role: Role::Agent,
        };
        assert!(checker.require(&ctx, &[Role::Admin]).is_err());
        assert!(checker.require(&ctx, &[Role::Admin, Role::Agent]).is_ok());
    }

    #[test]
    fn extract_auth_context_defaults() {
        let headers = HeaderMap::new();
        let ctx = extract_auth_context(&headers);
        assert_eq!(ctx.user_id, "system");
        assert_eq!(ctx.role, Role::Agent);
    }

    #[test]
    fn extract_auth_context_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static("user-456"));
        headers.insert("x-user-role", HeaderValue::from_static("admin"));

        let ctx = extract_auth_context(&headers);
        assert_eq!(ctx.user_id, "user-456");
        assert_eq!(ctx.role, Role::Admin);
    }

    #[test]
    fn unknown_role_falls_back_to_agent() {
        assert_eq!(Role::from_string("superuser"), Role::Agent);
        assert_eq!(Role::from_string("admin"), Role::Admin);
    }
}
