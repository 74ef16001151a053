//! Communication proxy contract
//!
//! A proxy is the local hand-off point to a remote node. Posting must not
//! block on network I/O; the transport behind the proxy delivers
//! asynchronously.

use crate::errors::Result;
use crate::identifiers::CommId;
use crate::messages::Envelope;
use crate::request::Request;
use std::sync::Arc;

/// Frame handed to a communication proxy
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Routed interface message
    Envelope(Envelope),
    /// Control command for the remote node (launch, teardown, ...)
    Command(Request),
}

/// Non-blocking hand-off to the transport serving one remote node
pub trait CommProxy: Send + Sync {
    /// Communication identifier of the remote node
    fn comm_id(&self) -> &CommId;

    /// Queue a frame for delivery
    ///
    /// Frames posted from one thread are delivered in posting order.
    fn post(&self, frame: Outbound) -> Result<()>;
}

/// Shared proxy handle
pub type SharedProxy = Arc<dyn CommProxy>;

/// Looks up the proxy serving a node by its comm id
///
/// Implementations create proxies on first use; repeated lookups for the
/// same comm id return proxies for the same node.
pub trait ProxyProvider: Send + Sync {
    fn proxy_for(&self, comm_id: &CommId) -> Result<SharedProxy>;
}

/// Shared provider handle
pub type SharedProxyProvider = Arc<dyn ProxyProvider>;
