//! DTOs for the backend endpoints the services call.
//!
//! # Design
//! The backend owns these schemas. They are mirrored here independently of
//! the mock-server crate; the integration test catches drift. Field names on
//! the wire are camelCase.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request payload for setting a password at the end of onboarding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SetPasswordRequest {
    pub email: String,
    pub otp: String,
    pub new_password: String,
}

/// Body returned by login and password-set endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionToken {
    pub token: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Active,
    Frozen,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: Uuid,
    pub holder_name: String,
    pub last4: String,
    pub status: CardStatus,
}

impl Card {
    pub fn is_frozen(&self) -> bool {
        self.status == CardStatus::Frozen
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub read: bool,
}
