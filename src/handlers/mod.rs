//! HTTP handlers. Each one extracts, delegates to a service and wraps the
//! result in [`crate::ApiResponse`].

pub mod auth;
pub mod orders;
pub mod payments;
pub mod products;
pub mod stats;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
