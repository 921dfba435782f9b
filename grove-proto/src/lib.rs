//! Grove resource protocol - request/response types and CoAP mapping
//!
//! Types shared by the resource platform (which speaks CoAP on the wire) and
//! the entity handlers that implement individual resources.

pub mod coap;
mod platform;
mod representation;

use std::fmt;
use std::ops::BitOr;

use indexmap::IndexMap;

pub use platform::{EntityHandler, NotifyError, RegistrationError, ResourcePlatform, SendError};
pub use representation::{FromValue, PayloadError, Representation, Value};

/// Baseline interface every resource is registered with
pub const DEFAULT_INTERFACE: &str = "oic.if.baseline";

/// Discovery endpoint served by the platform itself
pub const WELL_KNOWN_CORE: &str = "/.well-known/core";

// Response status codes used by entity handlers
pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_METHOD_NOT_ALLOWED: u16 = 405;
pub const STATUS_INTERNAL_ERROR: u16 = 500;

/// Handle to a registered resource, issued by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle(pub u32);

/// Handle to one in-flight request, used to route its response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestHandle(pub u64);

/// Opaque identifier of one observer registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservationId(pub u32);

impl fmt::Display for ObservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which parts of an entity handler invocation are set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestFlags(u8);

impl RequestFlags {
    pub const NONE: Self = Self(0);
    /// The invocation carries a method call that expects a response
    pub const REQUEST: Self = Self(0b01);
    /// The invocation carries an observe register/unregister
    pub const OBSERVER: Self = Self(0b10);

    pub fn contains(self, other: Self) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }
}

impl BitOr for RequestFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Resource properties given at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceProperties(u8);

impl ResourceProperties {
    pub const DISCOVERABLE: Self = Self(0b001);
    pub const OBSERVABLE: Self = Self(0b010);
    pub const SECURE: Self = Self(0b100);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ResourceProperties {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveAction {
    Register,
    Unregister,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationInfo {
    pub action: ObserveAction,
    pub id: ObservationId,
}

/// Query parameters in arrival order
pub type QueryParams = IndexMap<String, String>;

/// One entity handler invocation, built by the platform per inbound message
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    pub request_handle: RequestHandle,
    pub resource_handle: ResourceHandle,
    pub method: Method,
    pub flags: RequestFlags,
    pub query: QueryParams,
    pub representation: Representation,
    pub observation: Option<ObservationInfo>,
}

impl ResourceRequest {
    /// A plain method call with the request flag set
    pub fn new(
        request_handle: RequestHandle,
        resource_handle: ResourceHandle,
        method: Method,
    ) -> Self {
        Self {
            request_handle,
            resource_handle,
            method,
            flags: RequestFlags::REQUEST,
            query: QueryParams::new(),
            representation: Representation::default(),
            observation: None,
        }
    }

    pub fn with_flags(mut self, flags: RequestFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_representation(mut self, representation: Representation) -> Self {
        self.representation = representation;
        self
    }

    /// Attach an observe action; also sets the observer flag
    pub fn with_observation(mut self, action: ObserveAction, id: ObservationId) -> Self {
        self.flags = self.flags | RequestFlags::OBSERVER;
        self.observation = Some(ObservationInfo { action, id });
        self
    }
}

/// What an entity handler reports back to the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityHandlerResult {
    Ok,
    Error,
    /// Response will be sent later through the platform
    Slow,
}

/// Response to a single request
#[derive(Debug, Clone)]
pub struct ResourceResponse {
    pub request_handle: RequestHandle,
    pub resource_handle: ResourceHandle,
    pub status: u16,
    pub result: EntityHandlerResult,
    pub representation: Option<Representation>,
}

impl ResourceResponse {
    pub fn for_request(request: &ResourceRequest) -> Self {
        Self {
            request_handle: request.request_handle,
            resource_handle: request.resource_handle,
            status: STATUS_OK,
            result: EntityHandlerResult::Ok,
            representation: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_result(mut self, result: EntityHandlerResult) -> Self {
        self.result = result;
        self
    }

    pub fn with_representation(mut self, representation: Representation) -> Self {
        self.representation = Some(representation);
        self
    }
}
