use armada::{ArmadaError, DEFAULT_PORT, Server};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let port = match std::env::args().nth(1) {
        Some(arg) => match arg.parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                warn!(%arg, "invalid port argument, using {DEFAULT_PORT}");
                DEFAULT_PORT
            }
        },
        None => DEFAULT_PORT,
    };

    if let Err(err) = run(&format!("0.0.0.0:{port}")).await {
        error!(error = %err, "server exited with error");
        std::process::exit(1);
    }
}

async fn run(addr: &str) -> Result<(), ArmadaError> {
    let server = Server::bind(addr).await?;
    server.run().await
}
