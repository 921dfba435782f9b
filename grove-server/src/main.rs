use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .init();

    let cli: grove_server::Cli = clap::Parser::parse();
    let config = cli
        .server_config()
        .inspect_err(|e| tracing::error!(error = %e, "invalid configuration"))?;

    grove_server::run(config)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "server failed"))?;
    Ok(())
}
