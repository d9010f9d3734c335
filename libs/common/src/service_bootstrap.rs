//! Unified service bootstrap utilities
//!
//! Provides common initialization functionality for all services,
//! including startup banners, logging initialization, and environment setup.

use crate::bootstrap_args::ServiceArgs;
use crate::logging::{self, LogConfig};
use errors::{ServiceError, ServiceResult};
use tracing::info;

/// Service metadata for startup
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    /// Service name (e.g., "upssrv")
    pub name: String,
    /// Service version from the service's Cargo.toml
    pub version: String,
    /// Service description
    pub description: String,
    /// Default port
    pub default_port: u16,
}

impl ServiceInfo {
    /// Create new service info
    pub fn new(name: impl Into<String>, description: impl Into<String>, default_port: u16) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: description.into(),
            default_port,
        }
    }

    /// Override the version (services pass their own `CARGO_PKG_VERSION`)
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

/// Print unified startup banner for any service
pub fn print_startup_banner(service: &ServiceInfo) {
    let banner = match service.name.as_str() {
        "upssrv" => {
            r#"
 ██╗   ██╗██████╗ ███████╗███████╗██████╗ ██╗   ██╗
 ██║   ██║██╔══██╗██╔════╝██╔════╝██╔══██╗██║   ██║
 ██║   ██║██████╔╝███████╗███████╗██████╔╝██║   ██║
 ██║   ██║██╔═══╝ ╚════██║╚════██║██╔══██╗╚██╗ ██╔╝
 ╚██████╔╝██║     ███████║███████║██║  ██║ ╚████╔╝
  ╚═════╝ ╚═╝     ╚══════╝╚══════╝╚═╝  ╚═╝  ╚═══╝
            "#
        },
        _ => "",
    };

    if !banner.is_empty() {
        info!("{}", banner);
    }
    info!("");
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    info!(" Default Port: {}", service.default_port);
    info!("");
}

/// Initialize logging for a service with standard configuration
///
/// Log root directory priority:
/// 1. `UPSSRV_LOG_DIR` environment variable
/// 2. `log_dir` from the service configuration
/// 3. Default "logs"
pub fn init_logging(
    service: &ServiceInfo,
    args: &ServiceArgs,
    log_dir: Option<&str>,
) -> ServiceResult<()> {
    load_development_env();
    logging::init_log_root(log_dir);

    let log_config = LogConfig {
        service_name: service.name.clone(),
        log_dir: logging::get_log_root().join(&service.name),
        level: args.parse_log_level(),
        ansi: !args.no_color,
        ..Default::default()
    };

    logging::init_with_config(log_config)
        .map_err(|e| ServiceError::Configuration(format!("Failed to init logging: {}", e)))
}

/// Load environment variables in development mode
///
/// In debug builds, reads .env file and sets environment variables.
/// In release builds, this is a no-op (production environments should set variables externally).
pub fn load_development_env() {
    #[cfg(debug_assertions)]
    {
        if let Ok(content) = std::fs::read_to_string(".env") {
            for (key, value) in parse_env_lines(&content) {
                // Only set if not already set
                if std::env::var(key).is_err() {
                    std::env::set_var(key, value);
                }
            }
        }
    }
}

/// Parse `KEY=VALUE` lines, skipping comments and blanks
fn parse_env_lines(content: &str) -> Vec<(&str, &str)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), value.trim()))
        .collect()
}
