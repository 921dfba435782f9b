//! Registry: resources, in-flight requests and observers

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use coap_lite::{ContentFormat, MessageClass, MessageType, Packet, ResponseType};
use grove_proto::coap::{self, Link};
use grove_proto::{
    EntityHandler, EntityHandlerResult, Method, NotifyError, ObservationId, ObserveAction,
    RegistrationError, Representation, RequestFlags, RequestHandle, ResourceHandle,
    ResourceProperties, ResourceRequest, ResourceResponse, STATUS_INTERNAL_ERROR, STATUS_OK,
    SendError, WELL_KNOWN_CORE,
};
use tokio::sync::mpsc;

use crate::config::QualityOfService;

/// An encoded message and its destination
#[derive(Debug)]
pub struct Datagram {
    pub addr: SocketAddr,
    pub bytes: Vec<u8>,
}

enum OutboundError {
    Encode(String),
    Closed,
}

impl From<OutboundError> for SendError {
    fn from(e: OutboundError) -> Self {
        match e {
            OutboundError::Encode(e) => SendError::Encode(e),
            OutboundError::Closed => SendError::Closed,
        }
    }
}

impl From<OutboundError> for NotifyError {
    fn from(e: OutboundError) -> Self {
        match e {
            OutboundError::Encode(e) => NotifyError::Encode(e),
            OutboundError::Closed => NotifyError::Closed,
        }
    }
}

struct Observer {
    addr: SocketAddr,
    token: Vec<u8>,
    /// Message id of the last notification, matched against Reset
    last_message_id: Option<u16>,
}

struct Resource {
    uri: String,
    resource_type: String,
    interface: String,
    properties: ResourceProperties,
    handler: EntityHandler,
    observers: HashMap<ObservationId, Observer>,
    observe_seq: u32,
}

impl Resource {
    fn find_observer(&self, addr: SocketAddr, token: &[u8]) -> Option<ObservationId> {
        self.observers
            .iter()
            .find(|(_, o)| o.addr == addr && o.token == token)
            .map(|(id, _)| *id)
    }

    fn next_observe_seq(&mut self) -> u32 {
        self.observe_seq = (self.observe_seq + 1) & 0x00FF_FFFF;
        self.observe_seq
    }
}

/// Reply context of a request that has not been answered yet
struct Pending {
    addr: SocketAddr,
    token: Vec<u8>,
    message_id: u16,
    confirmable: bool,
    /// An empty ACK already went out; the response will be separate
    acked: bool,
    method: Method,
    resource: ResourceHandle,
    /// Observer registered by this request
    observation: Option<ObservationId>,
}

struct State {
    /// Indexed by handle - 1
    resources: Vec<Resource>,
    pending: HashMap<RequestHandle, Pending>,
    next_request: u64,
    next_observation: u32,
    next_message_id: u16,
}

impl State {
    fn resource(&self, handle: ResourceHandle) -> Option<&Resource> {
        (handle.0 as usize).checked_sub(1).and_then(|i| self.resources.get(i))
    }

    fn resource_mut(&mut self, handle: ResourceHandle) -> Option<&mut Resource> {
        (handle.0 as usize).checked_sub(1).and_then(|i| self.resources.get_mut(i))
    }

    fn next_request_handle(&mut self) -> RequestHandle {
        self.next_request += 1;
        RequestHandle(self.next_request)
    }
}

fn bump(counter: &mut u16) -> u16 {
    let id = *counter;
    *counter = counter.wrapping_add(1);
    id
}

fn is_success(code: ResponseType) -> bool {
    matches!(
        code,
        ResponseType::Created
            | ResponseType::Deleted
            | ResponseType::Valid
            | ResponseType::Changed
            | ResponseType::Content
    )
}

fn token_hex(token: &[u8]) -> String {
    data_encoding::HEXLOWER.encode(token)
}

/// Shared between the receive loop, handler tasks and the resource side.
///
/// Every method takes the lock only for bookkeeping; outbound messages go to
/// the writer task through a channel.
pub struct Registry {
    state: Mutex<State>,
    outbound: mpsc::UnboundedSender<Datagram>,
    qos: QualityOfService,
}

impl Registry {
    pub fn new(qos: QualityOfService, outbound: mpsc::UnboundedSender<Datagram>) -> Self {
        Self {
            state: Mutex::new(State {
                resources: Vec::new(),
                pending: HashMap::new(),
                next_request: 0,
                next_observation: 0,
                next_message_id: rand::random(),
            }),
            outbound,
            qos,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(
        &self,
        uri: &str,
        resource_type: &str,
        interface: &str,
        handler: EntityHandler,
        properties: ResourceProperties,
    ) -> Result<ResourceHandle, RegistrationError> {
        if !uri.starts_with('/') || uri.len() < 2 {
            return Err(RegistrationError::InvalidUri(uri.to_string()));
        }

        let mut state = self.state();
        if uri == WELL_KNOWN_CORE || state.resources.iter().any(|r| r.uri == uri) {
            return Err(RegistrationError::Duplicate(uri.to_string()));
        }

        state.resources.push(Resource {
            uri: uri.to_string(),
            resource_type: resource_type.to_string(),
            interface: interface.to_string(),
            properties,
            handler,
            observers: HashMap::new(),
            observe_seq: 0,
        });
        let handle = ResourceHandle(state.resources.len() as u32);
        tracing::debug!(uri, handle = handle.0, "registered");
        Ok(handle)
    }

    pub fn lookup(&self, path: &str) -> Option<(ResourceHandle, EntityHandler)> {
        let state = self.state();
        state
            .resources
            .iter()
            .position(|r| r.uri == path)
            .map(|i| (ResourceHandle(i as u32 + 1), state.resources[i].handler.clone()))
    }

    /// Link-format document listing every discoverable resource
    pub fn discovery(&self) -> String {
        let state = self.state();
        coap::link_format(
            state
                .resources
                .iter()
                .filter(|r| r.properties.contains(ResourceProperties::DISCOVERABLE))
                .map(|r| Link {
                    uri: &r.uri,
                    resource_type: &r.resource_type,
                    interface: &r.interface,
                    properties: r.properties,
                }),
        )
    }

    /// Add or remove the observer identified by `(addr, token)`.
    ///
    /// Registering again from the same endpoint and token keeps the existing
    /// id. Returns `None` when there is nothing to add or remove.
    pub fn observe(
        &self,
        resource: ResourceHandle,
        action: ObserveAction,
        addr: SocketAddr,
        token: &[u8],
    ) -> Option<ObservationId> {
        let mut state = self.state();
        let next_id = state.next_observation + 1;
        let entry = state.resource_mut(resource)?;

        match action {
            ObserveAction::Register => {
                if !entry.properties.contains(ResourceProperties::OBSERVABLE) {
                    tracing::debug!(uri = %entry.uri, "resource is not observable");
                    return None;
                }
                if let Some(id) = entry.find_observer(addr, token) {
                    return Some(id);
                }
                let id = ObservationId(next_id);
                entry.observers.insert(
                    id,
                    Observer {
                        addr,
                        token: token.to_vec(),
                        last_message_id: None,
                    },
                );
                tracing::info!(
                    uri = %entry.uri,
                    obs_id = %id,
                    %addr,
                    token = %token_hex(token),
                    "observer added"
                );
                state.next_observation = next_id;
                Some(id)
            }
            ObserveAction::Unregister => {
                let id = entry.find_observer(addr, token)?;
                entry.observers.remove(&id);
                tracing::info!(uri = %entry.uri, obs_id = %id, %addr, "observer removed");
                Some(id)
            }
        }
    }

    pub fn observer_count(&self, resource: ResourceHandle) -> usize {
        self.state().resource(resource).map_or(0, |r| r.observers.len())
    }

    /// Record a request awaiting its response
    pub fn begin(
        &self,
        addr: SocketAddr,
        packet: &Packet,
        method: Method,
        resource: ResourceHandle,
        observation: Option<ObservationId>,
    ) -> RequestHandle {
        let mut state = self.state();
        let handle = state.next_request_handle();
        state.pending.insert(
            handle,
            Pending {
                addr,
                token: packet.get_token().to_vec(),
                message_id: packet.header.message_id,
                confirmable: packet.header.get_type() == MessageType::Confirmable,
                acked: false,
                method,
                resource,
                observation,
            },
        );
        handle
    }

    /// Settle a request after its handler returned
    pub fn finish(&self, request_handle: RequestHandle, result: EntityHandlerResult) {
        let mut state = self.state();
        if result == EntityHandlerResult::Slow {
            let Some(pending) = state.pending.get_mut(&request_handle) else {
                return;
            };
            if pending.confirmable && !pending.acked {
                pending.acked = true;
                let mut ack = Packet::new();
                ack.header.set_type(MessageType::Acknowledgement);
                ack.header.code = MessageClass::Empty;
                ack.header.message_id = pending.message_id;
                let addr = pending.addr;
                if self.send(addr, &ack).is_err() {
                    tracing::warn!(
                        request = request_handle.0,
                        "failed to acknowledge slow request"
                    );
                }
            }
            return;
        }

        // Already answered by the handler
        let Some(pending) = state.pending.remove(&request_handle) else {
            return;
        };
        let status = match result {
            EntityHandlerResult::Ok => STATUS_OK,
            _ => STATUS_INTERNAL_ERROR,
        };
        let code = coap::response_code(status, pending.method);
        tracing::debug!(request = request_handle.0, ?result, "handler sent no response");
        if self.respond(&mut state, pending, code, None).is_err() {
            tracing::warn!(request = request_handle.0, "failed to send fallback response");
        }
    }

    pub fn send_response(&self, response: ResourceResponse) -> Result<(), SendError> {
        let payload = response
            .representation
            .as_ref()
            .map(Representation::to_payload)
            .transpose()?;

        let mut state = self.state();
        let pending = state
            .pending
            .remove(&response.request_handle)
            .ok_or(SendError::UnknownRequest(response.request_handle))?;
        if pending.resource != response.resource_handle {
            tracing::warn!(
                request = response.request_handle.0,
                "response names another resource than its request"
            );
        }
        let code = coap::response_code(response.status, pending.method);
        self.respond(&mut state, pending, code, payload)?;
        Ok(())
    }

    fn respond(
        &self,
        state: &mut State,
        pending: Pending,
        code: ResponseType,
        payload: Option<Vec<u8>>,
    ) -> Result<(), OutboundError> {
        let mut packet = Packet::new();
        packet.header.code = MessageClass::Response(code);
        if pending.confirmable && !pending.acked {
            packet.header.set_type(MessageType::Acknowledgement);
            packet.header.message_id = pending.message_id;
        } else {
            let message_type = if pending.confirmable {
                MessageType::Confirmable
            } else {
                MessageType::NonConfirmable
            };
            packet.header.set_type(message_type);
            packet.header.message_id = bump(&mut state.next_message_id);
        }
        packet.set_token(pending.token);

        if let Some(id) = pending.observation {
            if let Some(resource) = state.resource_mut(pending.resource) {
                if is_success(code) {
                    coap::set_observe(&mut packet, resource.next_observe_seq());
                } else if resource.observers.remove(&id).is_some() {
                    tracing::info!(
                        uri = %resource.uri,
                        obs_id = %id,
                        "request failed, observer dropped"
                    );
                }
            }
        }

        if let Some(payload) = payload {
            packet.set_content_format(ContentFormat::ApplicationJSON);
            packet.payload = payload;
        }
        self.send(pending.addr, &packet)
    }

    /// Answer a request directly, without involving any handler
    pub fn reply(
        &self,
        addr: SocketAddr,
        request: &Packet,
        code: ResponseType,
        content: Option<(ContentFormat, Vec<u8>)>,
    ) {
        let mut packet = Packet::new();
        packet.header.code = MessageClass::Response(code);
        if request.header.get_type() == MessageType::Confirmable {
            packet.header.set_type(MessageType::Acknowledgement);
            packet.header.message_id = request.header.message_id;
        } else {
            packet.header.set_type(MessageType::NonConfirmable);
            packet.header.message_id = bump(&mut self.state().next_message_id);
        }
        packet.set_token(request.get_token().to_vec());
        if let Some((format, payload)) = content {
            packet.set_content_format(format);
            packet.payload = payload;
        }
        if self.send(addr, &packet).is_err() {
            tracing::warn!(%addr, ?code, "failed to send reply");
        }
    }

    /// Answer an empty confirmable message (CoAP ping) with a Reset
    pub fn reset_peer(&self, addr: SocketAddr, message_id: u16) {
        let mut packet = Packet::new();
        packet.header.set_type(MessageType::Reset);
        packet.header.code = MessageClass::Empty;
        packet.header.message_id = message_id;
        if self.send(addr, &packet).is_err() {
            tracing::warn!(%addr, "failed to send reset");
        }
    }

    /// A client rejected a notification: drop its observer.
    ///
    /// Returns the handler and the unregister event to deliver to it.
    pub fn reset(
        &self,
        addr: SocketAddr,
        message_id: u16,
    ) -> Option<(EntityHandler, ResourceRequest)> {
        let mut state = self.state();
        let (index, id) = state.resources.iter().enumerate().find_map(|(i, r)| {
            r.observers
                .iter()
                .find(|(_, o)| o.addr == addr && o.last_message_id == Some(message_id))
                .map(|(id, _)| (i, *id))
        })?;

        let resource = &mut state.resources[index];
        resource.observers.remove(&id);
        tracing::info!(uri = %resource.uri, obs_id = %id, %addr, "observer reset");
        let handler = resource.handler.clone();

        let request_handle = state.next_request_handle();
        let resource_handle = ResourceHandle(index as u32 + 1);
        let request = ResourceRequest::new(request_handle, resource_handle, Method::Get)
            .with_flags(RequestFlags::NONE)
            .with_observation(ObserveAction::Unregister, id);
        Some((handler, request))
    }

    pub fn notify(
        &self,
        handle: ResourceHandle,
        only: Option<&[ObservationId]>,
        representation: &Representation,
    ) -> Result<usize, NotifyError> {
        let payload = representation.to_payload()?;

        let mut state = self.state();
        let State {
            resources,
            next_message_id,
            ..
        } = &mut *state;
        let resource = (handle.0 as usize)
            .checked_sub(1)
            .and_then(|i| resources.get_mut(i))
            .ok_or(NotifyError::UnknownResource(handle))?;
        if resource.observers.is_empty() {
            return Err(NotifyError::NoObservers);
        }

        let sequence = resource.next_observe_seq();
        let message_type = match self.qos {
            QualityOfService::LowQos => MessageType::NonConfirmable,
            QualityOfService::HighQos => MessageType::Confirmable,
        };

        let mut count = 0;
        for (id, observer) in resource.observers.iter_mut() {
            if only.is_some_and(|ids| !ids.contains(id)) {
                continue;
            }
            let message_id = bump(next_message_id);
            let mut packet = Packet::new();
            packet.header.set_type(message_type);
            packet.header.code = MessageClass::Response(ResponseType::Content);
            packet.header.message_id = message_id;
            packet.set_token(observer.token.clone());
            coap::set_observe(&mut packet, sequence);
            packet.set_content_format(ContentFormat::ApplicationJSON);
            packet.payload = payload.clone();

            observer.last_message_id = Some(message_id);
            self.send(observer.addr, &packet)?;
            count += 1;
        }
        tracing::debug!(uri = %resource.uri, sequence, count, "notified");
        Ok(count)
    }

    fn send(&self, addr: SocketAddr, packet: &Packet) -> Result<(), OutboundError> {
        let bytes = packet
            .to_bytes()
            .map_err(|e| OutboundError::Encode(format!("{e:?}")))?;
        self.outbound
            .send(Datagram { addr, bytes })
            .map_err(|_| OutboundError::Closed)
    }
}
