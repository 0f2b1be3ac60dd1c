//! Request and failure decorators composed around the transport.
//!
//! # Design
//! Request decorators run, in order, after a request is built and before it
//! is sent. They may only adjust the request and cannot fail it. Failure
//! decorators run when the transport produced no response. They can act on
//! shared state but cannot change the outcome: the caller always gets the
//! original error.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::endpoint::ActiveEndpoint;
use crate::error::TransportError;
use crate::http::{HttpRequest, AUTHORIZATION};
use crate::storage::{CredentialStore, StorageKeys};

#[async_trait]
pub trait RequestDecorator: Send + Sync {
    async fn decorate(&self, request: &mut HttpRequest);
}

#[async_trait]
pub trait FailureDecorator: Send + Sync {
    async fn on_transport_failure(&self, error: &TransportError);
}

/// Attaches `Authorization: Bearer <token>` from the credential store.
///
/// The session token key is always tried first. Requests built against the
/// fallback after a rebind also accept the legacy key when the session key
/// is absent. Both are read from the store on every request, so removing the
/// keys stops the header immediately.
pub struct BearerAuth {
    store: Arc<dyn CredentialStore>,
    endpoint: ActiveEndpoint,
}

impl BearerAuth {
    pub fn new(store: Arc<dyn CredentialStore>, endpoint: ActiveEndpoint) -> Self {
        Self { store, endpoint }
    }

    fn accepts_legacy(&self, request: &HttpRequest) -> bool {
        self.endpoint.has_rebound() && request.url.starts_with(self.endpoint.fallback())
    }

    async fn lookup(&self, key: &'static str) -> Option<String> {
        match self.store.get(key).await {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(key, error = %e, "credential lookup failed");
                None
            }
        }
    }
}

#[async_trait]
impl RequestDecorator for BearerAuth {
    async fn decorate(&self, request: &mut HttpRequest) {
        let mut token = self.lookup(StorageKeys::SESSION_TOKEN).await;
        if token.is_none() && self.accepts_legacy(request) {
            token = self.lookup(StorageKeys::LEGACY_SESSION_TOKEN).await;
        }

        match token {
            Some(token) => request.set_header(AUTHORIZATION, bearer(&token)),
            None => {
                debug!(url = %request.url, "no session credential, sending unauthenticated");
            }
        }
    }
}

/// Rebinds the active endpoint to its fallback after a connectivity failure.
pub struct FallbackRebind {
    endpoint: ActiveEndpoint,
}

impl FallbackRebind {
    pub fn new(endpoint: ActiveEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl FailureDecorator for FallbackRebind {
    async fn on_transport_failure(&self, error: &TransportError) {
        if !error.is_network_unreachable() {
            return;
        }

        let from = self.endpoint.current();
        if self.endpoint.rebind_to_fallback() {
            info!(
                from = %from,
                to = %self.endpoint.fallback(),
                cause = %error,
                "backend unreachable, switching base endpoint to fallback"
            );
        }
    }
}

pub(crate) fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
