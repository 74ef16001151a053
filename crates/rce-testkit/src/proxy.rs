//! Recording communication proxy

use parking_lot::Mutex;
use rce_core::{CommId, CommProxy, Envelope, Outbound, RceError, Request, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Proxy that keeps every posted frame for later inspection
#[derive(Debug)]
pub struct RecordingProxy {
    comm_id: CommId,
    frames: Mutex<Vec<Outbound>>,
    failing: AtomicBool,
}

impl RecordingProxy {
    pub fn new(comm_id: impl Into<CommId>) -> Self {
        Self {
            comm_id: comm_id.into(),
            frames: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn shared(comm_id: impl Into<CommId>) -> Arc<Self> {
        Arc::new(Self::new(comm_id))
    }

    /// Make subsequent posts fail with a delivery error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn frames(&self) -> Vec<Outbound> {
        self.frames.lock().clone()
    }

    pub fn envelopes(&self) -> Vec<Envelope> {
        self.frames
            .lock()
            .iter()
            .filter_map(|frame| match frame {
                Outbound::Envelope(envelope) => Some(envelope.clone()),
                Outbound::Command(_) => None,
            })
            .collect()
    }

    pub fn commands(&self) -> Vec<Request> {
        self.frames
            .lock()
            .iter()
            .filter_map(|frame| match frame {
                Outbound::Command(request) => Some(request.clone()),
                Outbound::Envelope(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    pub fn clear(&self) {
        self.frames.lock().clear();
    }
}

impl CommProxy for RecordingProxy {
    fn comm_id(&self) -> &CommId {
        &self.comm_id
    }

    fn post(&self, frame: Outbound) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RceError::delivery(&self.comm_id, "proxy set to fail"));
        }
        self.frames.lock().push(frame);
        Ok(())
    }
}
