//! Channel-backed communication proxies
//!
//! ## Lock Usage
//!
//! [`ChannelNetwork`] keeps its proxy table behind a `parking_lot::Mutex`
//! held only for the lookup or insert, never across `.await`.

use parking_lot::Mutex;
use rce_core::{
    CommId, CommProxy, Outbound, ProxyProvider, RceError, Result, SharedProxy,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Receiver of one node's frames, handed to the transport when the node is
/// first addressed
pub type Attachment = (CommId, mpsc::UnboundedReceiver<Outbound>);

/// Proxy handing frames to the transport through an unbounded channel
///
/// Posting never blocks; the transport drains the receiver at its own pace.
#[derive(Debug, Clone)]
pub struct ChannelProxy {
    comm_id: CommId,
    sender: mpsc::UnboundedSender<Outbound>,
}

impl ChannelProxy {
    /// Create a proxy and the receiver the transport consumes
    pub fn new(comm_id: impl Into<CommId>) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                comm_id: comm_id.into(),
                sender,
            },
            receiver,
        )
    }

    /// Whether the transport side has gone away
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl CommProxy for ChannelProxy {
    fn comm_id(&self) -> &CommId {
        &self.comm_id
    }

    fn post(&self, frame: Outbound) -> Result<()> {
        self.sender
            .send(frame)
            .map_err(|_| RceError::delivery(&self.comm_id, "transport channel closed"))
    }
}

/// Provider creating one [`ChannelProxy`] per comm id
///
/// The transport consumes the attachment receiver and starts draining each
/// node's frames as its proxy is created.
#[derive(Debug)]
pub struct ChannelNetwork {
    proxies: Mutex<HashMap<CommId, ChannelProxy>>,
    attachments: mpsc::UnboundedSender<Attachment>,
}

impl ChannelNetwork {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Attachment>) {
        let (attachments, receiver) = mpsc::unbounded_channel();
        (
            Self {
                proxies: Mutex::new(HashMap::new()),
                attachments,
            },
            receiver,
        )
    }

    /// Forget the proxy of a node that left the network
    pub fn detach(&self, comm_id: &CommId) -> bool {
        self.proxies.lock().remove(comm_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.proxies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.lock().is_empty()
    }
}

impl ProxyProvider for ChannelNetwork {
    fn proxy_for(&self, comm_id: &CommId) -> Result<SharedProxy> {
        let mut proxies = self.proxies.lock();
        if let Some(proxy) = proxies.get(comm_id).filter(|proxy| !proxy.is_closed()) {
            return Ok(Arc::new(proxy.clone()));
        }

        let (proxy, receiver) = ChannelProxy::new(comm_id.clone());
        self.attachments
            .send((comm_id.clone(), receiver))
            .map_err(|_| RceError::delivery(comm_id, "transport is not accepting nodes"))?;
        proxies.insert(comm_id.clone(), proxy.clone());
        drop(proxies);

        tracing::debug!(comm_id = %comm_id, "Channel attached");
        Ok(Arc::new(proxy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rce_core::Request;

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let (proxy, mut rx) = ChannelProxy::new("node-1");
        proxy
            .post(Outbound::Command(Request::new("alice", "First")))
            .unwrap();
        proxy
            .post(Outbound::Command(Request::new("alice", "Second")))
            .unwrap();

        let kinds: Vec<String> = [rx.recv().await, rx.recv().await]
            .into_iter()
            .map(|frame| match frame {
                Some(Outbound::Command(request)) => request.kind,
                other => panic!("unexpected frame {other:?}"),
            })
            .collect();
        assert_eq!(kinds, vec!["First", "Second"]);
    }

    #[tokio::test]
    async fn test_closed_channel_is_delivery_error() {
        let (proxy, rx) = ChannelProxy::new("node-1");
        drop(rx);
        assert!(proxy.is_closed());
        assert!(matches!(
            proxy.post(Outbound::Command(Request::new("alice", "Lost"))),
            Err(RceError::Delivery { .. })
        ));
    }

    #[tokio::test]
    async fn test_network_attaches_each_node_once() {
        let (network, mut attachments) = ChannelNetwork::new();
        let node = CommId::new("node-1");

        let first = network.proxy_for(&node).unwrap();
        let second = network.proxy_for(&node).unwrap();
        first
            .post(Outbound::Command(Request::new("alice", "First")))
            .unwrap();
        second
            .post(Outbound::Command(Request::new("alice", "Second")))
            .unwrap();

        let (attached, mut frames) = attachments.recv().await.unwrap();
        assert_eq!(attached, node);
        assert!(attachments.try_recv().is_err());
        assert!(matches!(frames.recv().await, Some(Outbound::Command(r)) if r.kind == "First"));
        assert!(matches!(frames.recv().await, Some(Outbound::Command(r)) if r.kind == "Second"));
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_reattached() {
        let (network, mut attachments) = ChannelNetwork::new();
        let node = CommId::new("node-1");
        network.proxy_for(&node).unwrap();
        drop(attachments.recv().await.unwrap());

        let proxy = network.proxy_for(&node).unwrap();
        proxy
            .post(Outbound::Command(Request::new("alice", "Again")))
            .unwrap();
        let (_, mut frames) = attachments.recv().await.unwrap();
        assert!(frames.recv().await.is_some());
        assert_eq!(network.len(), 1);
    }
}
