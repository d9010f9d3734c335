//! Shared basic library for upssrv services
//!
//! Provides the functions every service binary needs at startup:
//! - logging (console + daily rolling files, HTTP access log)
//! - startup banner and service metadata
//! - shared logging arguments
//! - graceful shutdown signal handling

pub mod bootstrap_args;
pub mod logging;
pub mod service_bootstrap;
pub mod shutdown;
