use tracing_subscriber::EnvFilter;

use booktime::{app, config::Config, prepare_database};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("booktime=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    let db = prepare_database(&config).await?;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Running");

    axum::serve(listener, app(db, config)).await?;
    Ok(())
}
