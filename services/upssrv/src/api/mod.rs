//! HTTP surface: landing page, metrics exposition and health check

pub mod exposition;
pub mod handlers;
pub mod routes;

pub use routes::{create_router, AppState};
