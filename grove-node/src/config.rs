//! Server configuration, built once at startup and shared read-only

use std::path::{Path, PathBuf};
use std::time::Duration;

use grove_bridge::BridgeConfig;
use serde::{Deserialize, Serialize};

/// How observers of a resource are notified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObserverFanout {
    /// Notify every registered observer
    #[default]
    All,
    /// Notify the observers tracked by the resource itself
    List,
}

fn default_slow_response_delay_secs() -> u64 {
    10
}

fn default_notify_interval_secs() -> u64 {
    3
}

fn default_interfaces() -> Vec<String> {
    vec!["eth0".to_string(), "wlan0".to_string()]
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./oic_svr_db_server.json")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub observers: ObserverFanout,
    /// Register resources with the secure property
    #[serde(default)]
    pub secure: bool,
    /// Answer sensor GETs with a deferred response
    #[serde(default)]
    pub slow_response: bool,
    #[serde(default = "default_slow_response_delay_secs")]
    pub slow_response_delay_secs: u64,
    /// Period of observer notifications; 0 disables them
    #[serde(default = "default_notify_interval_secs")]
    pub notify_interval_secs: u64,
    /// UDP port to bind; 0 picks an ephemeral port
    #[serde(default)]
    pub port: u16,
    /// Interfaces whose addresses are reported at startup
    #[serde(default = "default_interfaces")]
    pub interfaces: Vec<String>,
    /// Security database handed to the platform's storage callback
    #[serde(default = "default_storage_path")]
    pub storage_path: PathBuf,
    #[serde(default)]
    pub bridge: BridgeConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            observers: ObserverFanout::default(),
            secure: false,
            slow_response: false,
            slow_response_delay_secs: default_slow_response_delay_secs(),
            notify_interval_secs: default_notify_interval_secs(),
            port: 0,
            interfaces: default_interfaces(),
            storage_path: default_storage_path(),
            bridge: BridgeConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown demo mode {0}, expected 1-4")]
    InvalidMode(u8),
}

impl ServerConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_mode(mut self, mode: DemoMode) -> Self {
        mode.apply(&mut self);
        self
    }

    pub fn notify_interval(&self) -> Option<Duration> {
        match self.notify_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn slow_response_delay(&self) -> Duration {
        Duration::from_secs(self.slow_response_delay_secs)
    }
}

/// The numbered demo modes selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemoMode {
    /// 1 - non-secure resources, notify list of observers
    ListOfObservers,
    /// 2 - secure resources, notify all observers
    Secure,
    /// 3 - secure resources, notify list of observers
    SecureListOfObservers,
    /// 4 - non-secure resources, slow GET response, notify all observers
    SlowResponse,
}

impl TryFrom<u8> for DemoMode {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(DemoMode::ListOfObservers),
            2 => Ok(DemoMode::Secure),
            3 => Ok(DemoMode::SecureListOfObservers),
            4 => Ok(DemoMode::SlowResponse),
            other => Err(ConfigError::InvalidMode(other)),
        }
    }
}

impl DemoMode {
    fn apply(self, config: &mut ServerConfig) {
        match self {
            DemoMode::ListOfObservers => {
                config.observers = ObserverFanout::List;
                config.secure = false;
            }
            DemoMode::Secure => {
                config.observers = ObserverFanout::All;
                config.secure = true;
            }
            DemoMode::SecureListOfObservers => {
                config.observers = ObserverFanout::List;
                config.secure = true;
            }
            DemoMode::SlowResponse => {
                config.slow_response = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.observers, ObserverFanout::All);
        assert!(!config.secure);
        assert!(!config.slow_response);
        assert_eq!(config.port, 0);
        assert_eq!(config.interfaces, ["eth0", "wlan0"]);
        assert_eq!(config.storage_path, PathBuf::from("./oic_svr_db_server.json"));
        assert_eq!(config.notify_interval(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn modes() {
        let config = ServerConfig::default().with_mode(DemoMode::try_from(1).unwrap());
        assert_eq!((config.observers, config.secure), (ObserverFanout::List, false));

        let config = ServerConfig::default().with_mode(DemoMode::try_from(2).unwrap());
        assert_eq!((config.observers, config.secure), (ObserverFanout::All, true));

        let config = ServerConfig::default().with_mode(DemoMode::try_from(3).unwrap());
        assert_eq!((config.observers, config.secure), (ObserverFanout::List, true));

        assert!(matches!(DemoMode::try_from(0), Err(ConfigError::InvalidMode(0))));
        assert!(matches!(DemoMode::try_from(5), Err(ConfigError::InvalidMode(5))));
    }

    #[test]
    fn mode_four_sets_slow_response() {
        let config = ServerConfig::default().with_mode(DemoMode::try_from(4).unwrap());
        assert!(config.slow_response);
        assert_eq!(config.observers, ObserverFanout::All);
        assert!(!config.secure);
    }

    #[test]
    fn load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grove.json");
        std::fs::write(
            &path,
            r#"{"observers": "list", "notify_interval_secs": 0, "bridge": {"module": "fakelib"}}"#,
        )
        .unwrap();

        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.observers, ObserverFanout::List);
        assert_eq!(config.notify_interval(), None);
        assert_eq!(config.bridge.module, "fakelib");
        assert_eq!(config.bridge.program, "python3");
        assert_eq!(config.slow_response_delay(), Duration::from_secs(10));
    }

    #[test]
    fn load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ServerConfig::load(&dir.path().join("missing.json")),
            Err(ConfigError::Io { .. })
        ));

        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"observers": "some"}"#).unwrap();
        assert!(matches!(ServerConfig::load(&path), Err(ConfigError::Parse { .. })));
    }
}
