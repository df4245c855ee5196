use std::net::TcpListener;

use gatehouse::configuration::get_configuration;
use gatehouse::startup::{build_gateway, run_gateway};
use gatehouse::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry("gateway", "info");

    tracing::info!("Starting gateway");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    let application = build_gateway(&configuration).map_err(|e| {
        tracing::error!("Failed to initialise gateway: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, "Startup error")
    })?;

    let address = format!("{}:{}", configuration.gateway.host, configuration.gateway.port);
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Gateway listening on: {}", address);

    let server = run_gateway(listener, application)?;
    server.await
}
