//! Client-side gateway to the e-banking REST backend.
//!
//! # Overview
//! Every backend call the app makes goes through a `Gateway`. It targets an
//! active base endpoint, sends JSON, attaches the stored session token as a
//! bearer credential, and after a connectivity failure switches future
//! requests to a fallback LAN address.
//!
//! # Design
//! - `ActiveEndpoint` is an owned handle injected into the gateway, with a
//!   single writer path (`FallbackRebind`).
//! - Credential attachment and fallback are decorators composed around a
//!   `Transport` trait, so each is testable with a fake transport.
//! - Transports classify failures into `TransportError`; fallback triggers
//!   on a pattern match, never on message text.
//! - `services` holds thin per-resource wrappers with no logic of their own.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod gateway;
pub mod http;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod transport;
pub mod types;

pub use config::GatewayConfig;
pub use endpoint::ActiveEndpoint;
pub use error::{GatewayError, GatewayResult, TransportError};
pub use gateway::Gateway;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use pipeline::{BearerAuth, FailureDecorator, FallbackRebind, RequestDecorator};
pub use services::{CardService, NotificationService, SessionService};
pub use storage::{CredentialStore, FileStore, MemoryStore, StorageError, StorageKeys, StorageResult};
pub use transport::{ReqwestTransport, Transport};
pub use types::{Card, CardStatus, LoginRequest, Notification, SessionToken, SetPasswordRequest};
