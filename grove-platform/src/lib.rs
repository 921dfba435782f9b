//! Grove Platform - an in-process CoAP resource server
//!
//! Hosts entity handlers behind CoAP (RFC 7252) on UDP:
//! - requests are decoded into [`ResourceRequest`](grove_proto::ResourceRequest)s
//!   and handed to the handler registered for the path
//! - handlers answer through
//!   [`ResourcePlatform::send_response`](grove_proto::ResourcePlatform::send_response)
//!   or by returning a result the platform turns into a reply
//! - observe (RFC 7641) registrations and notifications
//! - resource discovery at `/.well-known/core`

mod config;
mod registry;
mod server;
mod storage;

pub use config::{ModeType, PlatformConfig, QualityOfService, ServiceType};
pub use server::{Platform, PlatformError};
pub use storage::{DEFAULT_DB_PATH, OpenMode, PersistentStorage, StorageError};
