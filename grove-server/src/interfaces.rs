//! Local address discovery for the startup report

use std::net::IpAddr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub name: String,
    pub ip: IpAddr,
}

impl InterfaceAddress {
    pub fn family(&self) -> &'static str {
        match self.ip {
            IpAddr::V4(_) => "IPv4",
            IpAddr::V6(_) => "IPv6",
        }
    }
}

/// Addresses of the wanted interfaces, in enumeration order
pub fn select<I>(interfaces: I, wanted: &[String]) -> Vec<InterfaceAddress>
where
    I: IntoIterator<Item = (String, IpAddr)>,
{
    interfaces
        .into_iter()
        .filter(|(name, _)| wanted.iter().any(|w| w == name))
        .map(|(name, ip)| InterfaceAddress { name, ip })
        .collect()
}

/// Log the address of every wanted interface and return the host string,
/// which is the last address reported. Empty when nothing matched.
pub fn report(wanted: &[String]) -> String {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            tracing::warn!(error = %e, "failed to list network interfaces");
            return String::new();
        }
    };

    let mut host = String::new();
    for address in select(interfaces.into_iter().map(|i| (i.name.clone(), i.ip())), wanted) {
        tracing::info!("{} {} addr: {}", address.name, address.family(), address.ip);
        host = address.ip.to_string();
    }
    host
}
