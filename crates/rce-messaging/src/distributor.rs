//! Identifier to handler dispatch
//!
//! ## Lock Usage
//!
//! The handler table sits behind a `parking_lot::RwLock`. Dispatch clones
//! the handler `Arc` out of the table and releases the lock before invoking
//! it, so a replacement never waits on a running handler and a running
//! handler always completes with the instance it started with.

use parking_lot::RwLock;
use rce_core::{RceError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Processing logic for one kind of inbound message
pub trait Handler<M>: Send + Sync {
    fn handle(&self, message: M) -> Result<()>;
}

impl<M, F> Handler<M> for F
where
    F: Fn(M) -> Result<()> + Send + Sync,
{
    fn handle(&self, message: M) -> Result<()> {
        self(message)
    }
}

/// Shared handler handle
pub type SharedHandler<M> = Arc<dyn Handler<M>>;

/// Registry holding at most one handler per identifier
pub struct Distributor<M> {
    handlers: RwLock<HashMap<String, SharedHandler<M>>>,
}

impl<M> Default for Distributor<M> {
    fn default() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }
}

impl<M> std::fmt::Debug for Distributor<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut identifiers: Vec<String> = self.handlers.read().keys().cloned().collect();
        identifiers.sort();
        f.debug_struct("Distributor")
            .field("identifiers", &identifiers)
            .finish()
    }
}

impl<M> Distributor<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `identifier`, replacing any previous one
    pub fn add_handler(&self, identifier: impl Into<String>, handler: SharedHandler<M>) {
        let identifier = identifier.into();
        let replaced = self
            .handlers
            .write()
            .insert(identifier.clone(), handler)
            .is_some();
        tracing::debug!(identifier = %identifier, replaced, "Handler registered");
    }

    /// Remove the handler for `identifier`; no-op if none is registered
    pub fn remove_handler(&self, identifier: &str) {
        if self.handlers.write().remove(identifier).is_some() {
            tracing::debug!(identifier = %identifier, "Handler removed");
        }
    }

    pub fn has_handler(&self, identifier: &str) -> bool {
        self.handlers.read().contains_key(identifier)
    }

    pub fn identifiers(&self) -> Vec<String> {
        self.handlers.read().keys().cloned().collect()
    }

    /// Invoke the handler registered for `identifier`
    pub fn dispatch(&self, identifier: &str, message: M) -> Result<()> {
        let handler = self.handlers.read().get(identifier).cloned();
        match handler {
            Some(handler) => handler.handle(message),
            None => {
                tracing::debug!(identifier = %identifier, "No handler for dispatch");
                Err(RceError::no_handler(identifier))
            }
        }
    }
}
