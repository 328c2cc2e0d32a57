use anyhow::{Context, Result};
use plaza_server::build_app;
use plaza_server::config::ServerConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ServerConfig::load()?;

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        eprintln!("Invalid server configuration: {}", e);
        std::process::exit(1);
    }

    let listen_addr = config.listen_addr.clone();
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("binding {}", listen_addr))?;

    let app = build_app(config);

    tracing::info!("Starting plaza server on {}", listen_addr);
    println!("Plaza server listening on {}", listen_addr);

    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
