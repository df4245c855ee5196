use std::net::TcpListener;

use gatehouse::configuration::get_configuration;
use gatehouse::startup::{build_login_service, run_login_service};
use gatehouse::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry("login-service", "info");

    tracing::info!("Starting login service");

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

    let application = build_login_service(&configuration).await.map_err(|e| {
        tracing::error!("Failed to initialise login service: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, "Startup error")
    })?;

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Login service listening on: {}", address);

    let server = run_login_service(listener, application)?;
    server.await
}
