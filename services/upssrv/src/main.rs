//! UPS SNMP Exporter (`upssrv`)
//!
//! Serves the state of Eaton/MGE UPS devices in the Prometheus text format;
//! every request to the metrics path polls all targets once.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::serve;
use clap::Parser;
use tracing::info;

use errors::{ServiceError, ServiceResult};
use upssrv::api::{create_router, AppState};
use upssrv::core::bootstrap::{self, Args};
use upssrv::core::transport::SnmpClient;

#[tokio::main]
async fn main() -> ServiceResult<()> {
    // Parse arguments and load configuration before logging so the
    // configured log directory is honoured
    let args = Args::parse();
    let service_args = args.clone().into();
    let service_info = bootstrap::service_info();

    let (config, source) = bootstrap::load_configuration(&args)?;
    bootstrap::initialize_logging(&service_args, &service_info, &config)?;
    if !args.no_color {
        common::service_bootstrap::print_startup_banner(&service_info);
    }
    bootstrap::log_config_source(&source);

    let client = SnmpClient::new(config.snmp_version()?);
    let coordinator = bootstrap::build_coordinator(&config, &args.targets, Arc::new(client))?;

    // Validation mode: validate and exit
    if args.validate {
        bootstrap::log_configuration(&config, &coordinator);
        info!("Validation completed successfully");
        return Ok(());
    }

    if coordinator.targets().is_empty() {
        tracing::warn!("No targets configured, scrapes will be empty");
    }

    let addr: SocketAddr = config.server.listen_address.parse().map_err(|e| {
        ServiceError::InvalidConfig {
            field: "server.listen_address".to_string(),
            reason: format!("'{}': {}", config.server.listen_address, e),
        }
    })?;

    let target_count = coordinator.targets().len();
    let state = AppState::new(Arc::new(coordinator), config.server.metrics_path.clone());
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        ServiceError::StartupFailed(format!("Failed to bind to {}: {}", addr, e))
    })?;

    info!("Polling {} target(s)", target_count);
    info!(
        "Metrics server listening on http://{}{}",
        addr, config.server.metrics_path
    );
    info!("Health check: http://{}/health", addr);

    serve(listener, app)
        .with_graceful_shutdown(async {
            let signal = common::shutdown::wait_for_shutdown().await;
            info!("Received {}, shutting down", signal);
        })
        .await?;

    info!("upssrv stopped");
    Ok(())
}
