//! Thin wrappers over the gateway for individual backend resources.
//!
//! Each method forwards one call and returns the decoded body. Session flows
//! are the only place the credential store is written.

use tracing::info;
use uuid::Uuid;

use crate::error::GatewayResult;
use crate::gateway::Gateway;
use crate::http::HttpMethod;
use crate::storage::{CredentialStore, StorageKeys};
use crate::types::{Card, LoginRequest, Notification, SessionToken, SetPasswordRequest};

/// Login, password setup and logout.
#[derive(Clone)]
pub struct SessionService {
    gateway: Gateway,
}

impl SessionService {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// `POST /auth/login`, then persist the returned token.
    pub async fn login(&self, credentials: &LoginRequest) -> GatewayResult<SessionToken> {
        let session: SessionToken = self.gateway.post_json("/auth/login", credentials).await?;
        self.store_token(&session).await?;
        info!("signed in");
        Ok(session)
    }

    /// `POST /auth/set-password`, then persist the returned token.
    pub async fn set_password(&self, request: &SetPasswordRequest) -> GatewayResult<SessionToken> {
        let session: SessionToken = self.gateway.post_json("/auth/set-password", request).await?;
        self.store_token(&session).await?;
        Ok(session)
    }

    /// Forget every stored session credential. Local only.
    pub async fn logout(&self) -> GatewayResult<()> {
        let store = self.gateway.store();
        store.remove(StorageKeys::SESSION_TOKEN).await?;
        store.remove(StorageKeys::LEGACY_SESSION_TOKEN).await?;
        info!("signed out");
        Ok(())
    }

    pub async fn is_signed_in(&self) -> GatewayResult<bool> {
        Ok(self
            .gateway
            .store()
            .get(StorageKeys::SESSION_TOKEN)
            .await?
            .is_some_and(|t| !t.is_empty()))
    }

    async fn store_token(&self, session: &SessionToken) -> GatewayResult<()> {
        self.gateway
            .store()
            .set(StorageKeys::SESSION_TOKEN, &session.token)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct CardService {
    gateway: Gateway,
}

impl CardService {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub async fn list(&self) -> GatewayResult<Vec<Card>> {
        self.gateway.get_json("/cards").await
    }

    pub async fn get(&self, id: Uuid) -> GatewayResult<Card> {
        self.gateway.get_json(&format!("/cards/{id}")).await
    }

    pub async fn freeze(&self, id: Uuid) -> GatewayResult<Card> {
        let request = self.gateway.request(HttpMethod::Patch, &format!("/cards/{id}/freeze"));
        self.gateway.call(request).await
    }

    pub async fn unfreeze(&self, id: Uuid) -> GatewayResult<Card> {
        let request = self.gateway.request(HttpMethod::Patch, &format!("/cards/{id}/unfreeze"));
        self.gateway.call(request).await
    }
}

#[derive(Clone)]
pub struct NotificationService {
    gateway: Gateway,
}

impl NotificationService {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub async fn list(&self) -> GatewayResult<Vec<Notification>> {
        self.gateway.get_json("/notification").await
    }

    pub async fn mark_read(&self, id: Uuid) -> GatewayResult<Notification> {
        let request = self
            .gateway
            .request(HttpMethod::Patch, &format!("/notification/{id}/read"));
        self.gateway.call(request).await
    }
}
