//! Platform configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::storage::PersistentStorage;

/// Where the platform runs; only in-process is supported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceType {
    #[default]
    InProc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeType {
    #[default]
    Server,
    Client,
    Both,
}

/// Delivery of observe notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityOfService {
    /// Non-confirmable notifications
    #[default]
    LowQos,
    /// Confirmable notifications, not retransmitted
    HighQos,
}

#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub service_type: ServiceType,
    pub mode: ModeType,
    pub ip: IpAddr,
    /// 0 binds an ephemeral port
    pub port: u16,
    pub qos: QualityOfService,
    /// Load the security database at configure time
    pub secure: bool,
    pub storage: PersistentStorage,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            service_type: ServiceType::InProc,
            mode: ModeType::Server,
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 0,
            qos: QualityOfService::LowQos,
            secure: false,
            storage: PersistentStorage::default(),
        }
    }
}

impl PlatformConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}
