//! HTTP middleware
//!
//! - `AuthUser` / `AdminUser` extractors over bearer JWTs
//! - `ObservabilityLayer` for request IDs and HTTP metrics

pub mod auth;
pub mod metrics;

pub use auth::{AdminUser, AuthError, AuthUser};
pub use metrics::ObservabilityLayer;
