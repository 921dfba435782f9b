//! The seam between entity handlers and the platform that hosts them

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::{
    EntityHandlerResult, ObservationId, PayloadError, Representation, RequestHandle,
    ResourceHandle, ResourceProperties, ResourceRequest, ResourceResponse,
};

/// Callback invoked for every request or observe event on one resource.
///
/// `None` stands for a request the platform could not build.
pub type EntityHandler =
    Arc<dyn Fn(Option<ResourceRequest>) -> BoxFuture<'static, EntityHandlerResult> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("resource {0} is already registered")]
    Duplicate(String),
    #[error("resource uri must be an absolute path: {0:?}")]
    InvalidUri(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("no pending request with handle {0:?}")]
    UnknownRequest(RequestHandle),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error("failed to encode message: {0}")]
    Encode(String),
    #[error("platform is not running")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("resource has no observers")]
    NoObservers,
    #[error("unknown resource {0:?}")]
    UnknownResource(ResourceHandle),
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error("failed to encode message: {0}")]
    Encode(String),
    #[error("platform is not running")]
    Closed,
}

/// What resource implementations need from the platform
pub trait ResourcePlatform: Send + Sync + 'static {
    /// Register a resource; the handle stays valid until the platform stops
    fn register_resource(
        &self,
        uri: &str,
        resource_type: &str,
        interface: &str,
        handler: EntityHandler,
        properties: ResourceProperties,
    ) -> Result<ResourceHandle, RegistrationError>;

    /// Send the one response for a request; a second response is rejected
    fn send_response(&self, response: ResourceResponse) -> Result<(), SendError>;

    /// Push a representation to every observer of a resource.
    /// Returns the number of observers notified.
    fn notify_all_observers(
        &self,
        handle: ResourceHandle,
        representation: &Representation,
    ) -> Result<usize, NotifyError>;

    /// Push a representation to the listed observers only
    fn notify_list_of_observers(
        &self,
        handle: ResourceHandle,
        observers: &[ObservationId],
        representation: &Representation,
    ) -> Result<usize, NotifyError>;
}
