//! HTTP middleware for gescom-service.

mod auth;

pub use auth::AuthUser;
