use std::path::PathBuf;

use grove_node::{ConfigError, DemoMode, ServerConfig};

#[derive(clap::Parser, Debug)]
#[command(name = "grove-server")]
#[command(about = "GrovePi resource server")]
pub struct Cli {
    /// Demo mode: 1 notify list of observers, 2 secure, 3 secure with list of
    /// observers, 4 slow sensor response. Anything else keeps the defaults:
    /// non-secure, notify all.
    pub mode: Option<String>,

    /// JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// UDP port to serve on (default: ephemeral)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory holding the Python driver module
    #[arg(long)]
    pub driver_path: Option<PathBuf>,

    /// Seconds between observer notifications, 0 disables them
    #[arg(long)]
    pub notify_interval_secs: Option<u64>,
}

impl Cli {
    /// Defaults, then the config file, then the demo mode, then flags
    pub fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };
        if let Some(mode) = self.demo_mode() {
            config = config.with_mode(mode);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(path) = &self.driver_path {
            config.bridge.module_path = path.clone();
        }
        if let Some(secs) = self.notify_interval_secs {
            config.notify_interval_secs = secs;
        }
        Ok(config)
    }

    fn demo_mode(&self) -> Option<DemoMode> {
        let arg = self.mode.as_deref()?;
        match arg.trim().parse::<u8>().map(DemoMode::try_from) {
            Ok(Ok(mode)) => Some(mode),
            _ => {
                tracing::warn!(mode = arg, "unknown demo mode, using defaults");
                None
            }
        }
    }
}
