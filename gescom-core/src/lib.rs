//! gescom-core: shared infrastructure for the gescom invoicing services.
pub mod capability;
pub mod config;
pub mod error;
pub mod observability;

pub use axum;
pub use serde;
pub use serde_json;
pub use tracing;
pub use validator;
