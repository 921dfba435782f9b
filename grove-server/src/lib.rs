mod cli;
pub mod interfaces;

use std::sync::Arc;

use grove_bridge::PythonBridge;
use grove_node::{DemoResource, ServerConfig};
use grove_platform::{Platform, PlatformConfig, PlatformError, PersistentStorage, QualityOfService};

pub use cli::Cli;

#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("platform setup failed: {0}")]
    Platform(#[from] PlatformError),
    #[error("failed to wait for shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
}

pub fn platform_config(config: &ServerConfig) -> PlatformConfig {
    PlatformConfig {
        port: config.port,
        qos: QualityOfService::LowQos,
        secure: config.secure,
        storage: PersistentStorage::new(&config.storage_path),
        ..PlatformConfig::default()
    }
}

/// Bring up the platform and the three resources, then serve until Ctrl-C
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let config = Arc::new(config);
    tracing::info!(
        observers = ?config.observers,
        secure = config.secure,
        slow_response = config.slow_response,
        "starting"
    );

    let host = interfaces::report(&config.interfaces);

    let platform = Arc::new(Platform::configure(platform_config(&config)).await?);
    platform.start()?;
    tracing::info!(addr = %platform.local_addr()?, "serving");

    let bridge = Arc::new(PythonBridge::new(config.bridge.clone()));
    let demo = DemoResource::new(config.clone(), bridge.clone(), platform.clone());
    let created = demo.create_resources().await;
    tracing::info!(created, "resources created");

    if host.is_empty() {
        tracing::warn!("no host address found, LCD left unchanged");
    } else if demo.set_lcd_text(&host).await != 0 {
        tracing::warn!(host, "could not show host address on the LCD");
    }

    tokio::signal::ctrl_c().await.map_err(ServerError::Signal)?;
    tracing::info!("shutting down");

    demo.shutdown().await;
    platform.stop();
    bridge.shutdown().await;
    Ok(())
}
