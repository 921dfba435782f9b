//! UDP server setup and message dispatch

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use coap_lite::{ContentFormat, MessageClass, MessageType, Packet, ResponseType};
use grove_proto::coap::{self, OBSERVE_DEREGISTER, OBSERVE_REGISTER};
use grove_proto::{
    EntityHandler, Method, NotifyError, ObservationId, ObservationInfo, ObserveAction,
    RegistrationError, Representation, ResourceHandle, ResourcePlatform, ResourceProperties,
    ResourceRequest, ResourceResponse, SendError, WELL_KNOWN_CORE,
};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{ModeType, PlatformConfig};
use crate::registry::{Datagram, Registry};

/// Largest datagram accepted
const MAX_DATAGRAM: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("mode {0:?} is not supported, the platform only serves")]
    UnsupportedMode(ModeType),
    #[error("platform already started")]
    AlreadyStarted,
}

/// In-process CoAP resource platform
pub struct Platform {
    config: PlatformConfig,
    socket: Arc<UdpSocket>,
    registry: Arc<Registry>,
    outbound: Mutex<Option<mpsc::UnboundedReceiver<Datagram>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Platform {
    /// Bind the socket; nothing is served until [`Platform::start`]
    pub async fn configure(config: PlatformConfig) -> Result<Self, PlatformError> {
        if config.mode == ModeType::Client {
            return Err(PlatformError::UnsupportedMode(config.mode));
        }

        if config.secure {
            match config.storage.read() {
                Ok(data) => tracing::info!(
                    path = %config.storage.path().display(),
                    bytes = data.len(),
                    "security database loaded"
                ),
                Err(e) => tracing::warn!(error = %e, "security database unavailable"),
            }
            tracing::warn!("DTLS is not available, secure resources are served over plain UDP");
        }

        let addr = config.bind_addr();
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| PlatformError::Bind { addr, source })?;
        tracing::info!(local = %socket.local_addr()?, qos = ?config.qos, "platform configured");

        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            registry: Arc::new(Registry::new(config.qos, tx)),
            config,
            socket: Arc::new(socket),
            outbound: Mutex::new(Some(rx)),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn local_addr(&self) -> Result<SocketAddr, PlatformError> {
        Ok(self.socket.local_addr()?)
    }

    /// Spawn the receive loop and the writer
    pub fn start(&self) -> Result<(), PlatformError> {
        let mut outbound = self
            .outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(PlatformError::AlreadyStarted)?;

        let socket = self.socket.clone();
        let writer = tokio::spawn(async move {
            while let Some(datagram) = outbound.recv().await {
                if let Err(e) = socket.send_to(&datagram.bytes, datagram.addr).await {
                    tracing::warn!(addr = %datagram.addr, error = %e, "send failed");
                }
            }
        });

        let socket = self.socket.clone();
        let registry = self.registry.clone();
        let receiver = tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                let (len, addr) = match socket.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(e) => {
                        tracing::warn!(error = %e, "receive failed");
                        continue;
                    }
                };
                match Packet::from_bytes(&buf[..len]) {
                    Ok(packet) => dispatch(&registry, addr, packet),
                    Err(e) => tracing::debug!(%addr, error = ?e, "dropping malformed message"),
                }
            }
        });

        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([writer, receiver]);
        tracing::info!("platform started");
        Ok(())
    }

    pub fn stop(&self) {
        for task in self.tasks.lock().unwrap_or_else(PoisonError::into_inner).drain(..) {
            task.abort();
        }
        tracing::info!("platform stopped");
    }

    pub fn observer_count(&self, handle: ResourceHandle) -> usize {
        self.registry.observer_count(handle)
    }
}

impl Drop for Platform {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner).drain(..) {
            task.abort();
        }
    }
}

impl ResourcePlatform for Platform {
    fn register_resource(
        &self,
        uri: &str,
        resource_type: &str,
        interface: &str,
        handler: EntityHandler,
        properties: ResourceProperties,
    ) -> Result<ResourceHandle, RegistrationError> {
        self.registry.register(uri, resource_type, interface, handler, properties)
    }

    fn send_response(&self, response: ResourceResponse) -> Result<(), SendError> {
        self.registry.send_response(response)
    }

    fn notify_all_observers(
        &self,
        handle: ResourceHandle,
        representation: &Representation,
    ) -> Result<usize, NotifyError> {
        self.registry.notify(handle, None, representation)
    }

    fn notify_list_of_observers(
        &self,
        handle: ResourceHandle,
        observers: &[ObservationId],
        representation: &Representation,
    ) -> Result<usize, NotifyError> {
        self.registry.notify(handle, Some(observers), representation)
    }
}

fn dispatch(registry: &Arc<Registry>, addr: SocketAddr, packet: Packet) {
    match packet.header.code {
        MessageClass::Empty => match packet.header.get_type() {
            MessageType::Reset => {
                if let Some((handler, request)) = registry.reset(addr, packet.header.message_id) {
                    tokio::spawn(async move {
                        handler(Some(request)).await;
                    });
                }
            }
            MessageType::Confirmable => registry.reset_peer(addr, packet.header.message_id),
            _ => {}
        },
        MessageClass::Request(_) => handle_request(registry, addr, packet),
        _ => tracing::debug!(%addr, "ignoring response message"),
    }
}

fn handle_request(registry: &Arc<Registry>, addr: SocketAddr, packet: Packet) {
    let path = coap::path(&packet);
    let Some(method) = coap::method_from_code(&packet.header.code) else {
        registry.reply(addr, &packet, ResponseType::MethodNotAllowed, None);
        return;
    };

    if path == WELL_KNOWN_CORE {
        if method == Method::Get {
            let links = registry.discovery().into_bytes();
            registry.reply(
                addr,
                &packet,
                ResponseType::Content,
                Some((ContentFormat::ApplicationLinkFormat, links)),
            );
        } else {
            registry.reply(addr, &packet, ResponseType::MethodNotAllowed, None);
        }
        return;
    }

    let Some((resource, handler)) = registry.lookup(&path) else {
        tracing::info!(%addr, %method, %path, "no such resource");
        registry.reply(addr, &packet, ResponseType::NotFound, None);
        return;
    };

    let representation = match Representation::from_payload(path.as_str(), &packet.payload) {
        Ok(representation) => representation,
        Err(e) => {
            tracing::warn!(%addr, %path, error = %e, "malformed payload");
            tokio::spawn(async move {
                handler(None).await;
            });
            registry.reply(addr, &packet, ResponseType::BadRequest, None);
            return;
        }
    };

    let token = packet.get_token().to_vec();
    let observation = match (method, coap::observe_value(&packet)) {
        (Method::Get, Some(OBSERVE_REGISTER)) => registry
            .observe(resource, ObserveAction::Register, addr, &token)
            .map(|id| ObservationInfo {
                action: ObserveAction::Register,
                id,
            }),
        (Method::Get, Some(OBSERVE_DEREGISTER)) => registry
            .observe(resource, ObserveAction::Unregister, addr, &token)
            .map(|id| ObservationInfo {
                action: ObserveAction::Unregister,
                id,
            }),
        _ => None,
    };
    let registered = observation
        .filter(|info| info.action == ObserveAction::Register)
        .map(|info| info.id);

    let request_handle = registry.begin(addr, &packet, method, resource, registered);
    let mut request =
        ResourceRequest::new(request_handle, resource, method).with_representation(representation);
    request.query = coap::query_params(&packet);
    if let Some(info) = observation {
        request = request.with_observation(info.action, info.id);
    }
    tracing::debug!(%addr, %method, %path, request = request_handle.0, "dispatching");

    let registry = registry.clone();
    tokio::spawn(async move {
        let result = handler(Some(request)).await;
        registry.finish(request_handle, result);
    });
}
