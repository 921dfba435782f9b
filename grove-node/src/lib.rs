//! Grove Node - the GrovePi resources
//!
//! Exposes a temperature/humidity/light sensor, an RGB LED and an LCD as
//! resources on a [`ResourcePlatform`](grove_proto::ResourcePlatform).
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use grove_bridge::PythonBridge;
//! use grove_node::{DemoResource, ServerConfig};
//!
//! let config = Arc::new(ServerConfig::default());
//! let bridge = Arc::new(PythonBridge::new(config.bridge.clone()));
//! let demo = DemoResource::new(config, bridge, platform);
//! demo.create_resources().await;
//! demo.set_lcd_text("192.168.1.20").await;
//! ```

pub mod config;
pub mod hardware;
mod notifier;
mod resource;

pub use config::{ConfigError, DemoMode, ObserverFanout, ServerConfig};
pub use hardware::{Hardware, LedChannel};
pub use resource::{DemoResource, INITIAL_LCD_TEXT, ResourceKind};
