//! The active base endpoint shared by every request the gateway builds.
//!
//! # Design
//! One `ActiveEndpoint` exists per gateway; clones share the same state. The
//! only writer is `rebind_to_fallback`, called from the failure pipeline.
//! Requests copy the base URL when they are built, so a rebind never changes
//! a request that already exists. Readers and the writer are not otherwise
//! coordinated: an in-flight request may finish against the old address
//! after the rebind.
//!
//! The state machine is `Bound(initial)` to `Bound(fallback)`; once on the
//! fallback no further transition happens. The endpoint holds addresses
//! only, never credentials.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone)]
pub struct ActiveEndpoint {
    fallback: Arc<str>,
    current: Arc<RwLock<String>>,
    rebound: Arc<AtomicBool>,
}

impl ActiveEndpoint {
    pub fn new(initial: &str, fallback: &str) -> Self {
        Self {
            fallback: Arc::from(fallback),
            current: Arc::new(RwLock::new(initial.to_string())),
            rebound: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn current(&self) -> String {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn is_on_fallback(&self) -> bool {
        self.current() == *self.fallback
    }

    /// Whether a connectivity failure has moved this endpoint to the fallback.
    pub fn has_rebound(&self) -> bool {
        self.rebound.load(Ordering::Acquire)
    }

    /// Switch to the fallback address for every request built from now on.
    ///
    /// Returns `false` without touching anything if already on the fallback.
    pub fn rebind_to_fallback(&self) -> bool {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if *current == *self.fallback {
            return false;
        }
        *current = self.fallback.to_string();
        self.rebound.store(true, Ordering::Release);
        true
    }
}
