use std::process::ExitCode;

use cedula_lookup::gateway;
use cedula_lookup::{GatewayConfig, LookupConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // `log` records from the library are bridged through tracing-log.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let configs = LookupConfig::from_env().and_then(|lookup| Ok((lookup, GatewayConfig::from_env()?)));
    let (lookup_config, gateway_config) = match configs {
        Ok(configs) => configs,
        Err(err) => {
            log::error!("invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    match gateway::serve(lookup_config, gateway_config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("gateway stopped: {err}");
            ExitCode::FAILURE
        }
    }
}
