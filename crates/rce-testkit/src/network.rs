//! Proxy provider backed by recording proxies

use crate::proxy::RecordingProxy;
use parking_lot::Mutex;
use rce_core::{CommId, ProxyProvider, Result, SharedProxy};
use std::collections::HashMap;
use std::sync::Arc;

/// Hands out one [`RecordingProxy`] per comm id
#[derive(Debug, Default)]
pub struct RecordingNetwork {
    proxies: Mutex<HashMap<CommId, Arc<RecordingProxy>>>,
}

impl RecordingNetwork {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Proxy for `comm_id`, created on first use
    pub fn proxy(&self, comm_id: impl Into<CommId>) -> Arc<RecordingProxy> {
        let comm_id = comm_id.into();
        self.proxies
            .lock()
            .entry(comm_id.clone())
            .or_insert_with(|| RecordingProxy::shared(comm_id))
            .clone()
    }

    /// Whether any proxy was handed out for `comm_id`
    pub fn knows(&self, comm_id: &CommId) -> bool {
        self.proxies.lock().contains_key(comm_id)
    }
}

impl ProxyProvider for RecordingNetwork {
    fn proxy_for(&self, comm_id: &CommId) -> Result<SharedProxy> {
        Ok(self.proxy(comm_id.clone()))
    }
}
