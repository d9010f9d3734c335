//! Service bootstrap
//!
//! Command-line parsing, logging setup, configuration overrides and the
//! assembly of the scrape coordinator from configuration.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::catalogue::Catalogue;
use crate::core::config::{Config, ConfigSource};
use crate::core::coordinator::Coordinator;
use crate::core::family::FamilyRegistry;
use crate::core::target::resolve_targets;
use crate::core::transport::SessionClient;
use common::service_bootstrap::ServiceInfo;
use errors::{ServiceError, ServiceResult};

pub use common::bootstrap_args::ServiceArgs;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 9332;

/// Command-line arguments for upssrv
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "upssrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Exports the state of Eaton/MGE UPS devices polled over SNMP",
    long_about = None
)]
pub struct Args {
    /// Comma-separated list of target addresses, polled in addition to the configured ones
    #[arg(short = 't', long, default_value = "")]
    pub targets: String,

    /// SNMP community; replaces the configured one when not empty
    #[arg(long, default_value = "")]
    pub community: String,

    /// Address to listen on for HTTP requests (e.g. 0.0.0.0:9332)
    #[arg(long)]
    pub listen_address: Option<String>,

    /// Path under which metrics are exposed
    #[arg(long)]
    pub path: Option<String>,

    /// Configuration file
    #[arg(short = 'c', long)]
    pub config_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    pub log_level: String,

    /// Enable debug logging
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Validation mode - load configuration, resolve targets and exit
    #[arg(long)]
    pub validate: bool,
}

impl From<Args> for ServiceArgs {
    fn from(args: Args) -> Self {
        ServiceArgs {
            log_level: args.log_level,
            debug: args.debug,
            no_color: args.no_color,
        }
    }
}

pub fn service_info() -> ServiceInfo {
    ServiceInfo::new(
        "upssrv",
        "UPS SNMP Exporter - Eaton XUPS / MGE",
        DEFAULT_PORT,
    )
    .with_version(env!("CARGO_PKG_VERSION"))
}

/// Initialize logging with the log directory from configuration
pub fn initialize_logging(
    args: &ServiceArgs,
    service_info: &ServiceInfo,
    config: &Config,
) -> ServiceResult<()> {
    common::service_bootstrap::init_logging(service_info, args, config.logging.dir.as_deref())
}

/// Apply command-line flags on top of the loaded configuration
pub fn apply_overrides(config: &mut Config, args: &Args) {
    if !args.community.is_empty() {
        config.community = args.community.clone();
    }
    if let Some(address) = &args.listen_address {
        config.server.listen_address = address.clone();
    }
    if let Some(path) = &args.path {
        config.server.metrics_path = path.clone();
    }
}

/// Load configuration and apply command-line overrides
///
/// Runs before logging is initialised; pass the source to
/// [`log_config_source`] once it is.
pub fn load_configuration(args: &Args) -> ServiceResult<(Config, ConfigSource)> {
    let (mut config, source) = Config::load(args.config_file.as_deref())?;
    apply_overrides(&mut config, args);
    Ok((config, source))
}

pub fn log_config_source(source: &ConfigSource) {
    match source {
        ConfigSource::File(path) => debug!("Loaded configuration from {}", path.display()),
        ConfigSource::Defaults(path) => warn!(
            "Configuration file {} not found, using defaults and environment",
            path.display()
        ),
    }
}

/// Validate configuration and build the coordinator for the resolved targets
pub fn build_coordinator(
    config: &Config,
    inline_targets: &str,
    client: Arc<dyn SessionClient>,
) -> ServiceResult<Coordinator> {
    let registry = FamilyRegistry::builtin();
    config.validate(&registry)?;

    let targets = resolve_targets(
        inline_targets,
        &config.targets,
        &config.target_defaults(),
        &registry,
    )
    .map_err(ServiceError::from)?;

    Ok(Coordinator::new(
        client,
        Arc::new(Catalogue::new(&config.prefix)),
        targets,
        config.scrape_settings(),
    ))
}

/// Log the effective configuration (validation mode)
pub fn log_configuration(config: &Config, coordinator: &Coordinator) {
    info!("Listen address: {}", config.server.listen_address);
    info!("Metrics path: {}", config.server.metrics_path);
    info!("Metric prefix: {}", config.prefix);
    info!("SNMP version: {}", config.snmp_version);
    info!(
        "Session timeout: {} ms, scrape timeout: {} ms",
        config.session_timeout_ms, config.scrape_timeout_ms
    );
    info!("Found {} target(s)", coordinator.targets().len());
    for target in coordinator.targets() {
        info!("  {} (family: {})", target.address, target.family.label());
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::core::transport::MockClient;
    use tracing_test::traced_test;

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from([
            "upssrv",
            "--targets",
            "10.0.0.1,10.0.0.2",
            "--community",
            "private",
            "--path",
            "/ups",
            "--debug",
        ]);
        assert_eq!(args.targets, "10.0.0.1,10.0.0.2");
        assert!(args.debug);
        assert!(args.config_file.is_none());

        let service_args: ServiceArgs = args.into();
        assert_eq!(service_args.parse_log_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.community = "from-file".into();

        apply_overrides(&mut config, &Args::default());
        assert_eq!(config.community, "from-file");

        let args = Args {
            community: "cli".into(),
            listen_address: Some("127.0.0.1:9000".into()),
            path: Some("/ups".into()),
            ..Args::default()
        };
        apply_overrides(&mut config, &args);
        assert_eq!(config.community, "cli");
        assert_eq!(config.server.listen_address, "127.0.0.1:9000");
        assert_eq!(config.server.metrics_path, "/ups");
    }

    #[test]
    fn test_build_coordinator_merges_targets() {
        let mut config = Config::default();
        config.targets = vec![crate::core::target::TargetConfig::Address("10.0.0.1".into())];
        let coordinator =
            build_coordinator(&config, "10.0.0.1, 10.0.0.2", Arc::new(MockClient::new())).unwrap();
        assert_eq!(coordinator.targets().len(), 3);
        assert_eq!(coordinator.catalogue().get(crate::MetricKind::Up).name, "eaton_usv_up");
    }

    #[test]
    fn test_build_coordinator_rejects_unknown_family() {
        let config = Config {
            family: "apc".into(),
            ..Config::default()
        };
        let err = build_coordinator(&config, "", Arc::new(MockClient::new())).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_build_coordinator_rejects_reserved_metrics_path() {
        let mut config = Config::default();
        config.server.metrics_path = "/health".into();
        let err = build_coordinator(&config, "", Arc::new(MockClient::new())).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidConfig { .. }));
    }

    #[test]
    #[traced_test]
    fn test_missing_default_file_is_reported() {
        log_config_source(&ConfigSource::Defaults(PathBuf::from("config/upssrv.yaml")));
        assert!(logs_contain(
            "Configuration file config/upssrv.yaml not found, using defaults and environment"
        ));

        log_config_source(&ConfigSource::File(PathBuf::from("/etc/upssrv.yaml")));
        assert!(logs_contain("Loaded configuration from /etc/upssrv.yaml"));
    }
}
