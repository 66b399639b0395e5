//! docver-core: client side of a versioned document service.
//!
//! This crate provides:
//! - `ApiClient`: one authenticated request against the service, normalized
//!   into a `Payload` or a classified `ApiError`
//! - `HttpTransport` trait abstraction with a reqwest implementation
//! - `CredentialProvider` for bearer tokens read fresh on every request
//! - `DocumentController`: load latest / save as new version state machine
//! - `EventBus` notifications for load and save outcomes

pub mod client;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod events;
pub mod transport;
pub mod version;

pub use client::{ApiClient, ApiError, Payload, RequestBody, RequestOptions};
pub use config::{ClientConfig, ConfigError};
pub use controller::{ControllerError, DocumentController, DocumentSnapshot, Operation, Phase};
pub use credentials::{Anonymous, CredentialProvider, SessionStore};
pub use events::{ControllerEvent, EventBus, Subscription};
pub use transport::{
    FormPart, HttpRequest, HttpResponse, HttpTransport, MockTransport, OutgoingBody,
    ReqwestTransport, TransportError,
};
pub use version::{Version, VersionDescriptor};
