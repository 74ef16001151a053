//! Routed messaging with request/response correlation
//!
//! A messenger runs on one node; the comm id of its local proxy is the
//! origin of everything it sends. A send reaches the destination interface
//! only if that interface lists `(origin, sender tag)` among its
//! connections. Requests are remembered by user and message id so the
//! matching response, sent back by the endpoint that received the request,
//! can be routed to the interface that asked.
//!
//! ## Lock Usage
//!
//! The correlation table is a `parking_lot::Mutex`, never held while an
//! endpoint lock is taken and never held across `.await`.

use crate::distributor::Distributor;
use indexmap::IndexMap;
use parking_lot::Mutex;
use rce_core::{
    CommId, Envelope, EnvelopeKind, MessageId, MessengerConfig, Outbound, Payload, RceError,
    Result, SharedClock, SharedProxy, Tag, UserId,
};
use rce_endpoint::EndpointManager;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Message handed to [`Messenger::send`]
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub message_type: String,
    pub kind: EnvelopeKind,
    pub payload: Payload,
}

impl OutgoingMessage {
    pub fn new(message_type: impl Into<String>, kind: EnvelopeKind, payload: Payload) -> Self {
        Self {
            message_type: message_type.into(),
            kind,
            payload,
        }
    }
}

/// Message ids are unique per user only
type CorrelationKey = (UserId, MessageId);

#[derive(Debug)]
struct Correlation {
    /// Interface on this node that sent the request
    origin_tag: Tag,
    /// Endpoint expected to answer
    destination: CommId,
    recorded_at: Instant,
}

/// Outstanding requests in the order they were sent
#[derive(Debug, Default)]
struct CorrelationTable {
    entries: IndexMap<CorrelationKey, Correlation>,
}

impl CorrelationTable {
    /// Put back an entry displaced by a send that then failed
    fn restore(&mut self, key: CorrelationKey, correlation: Correlation) {
        let index = self
            .entries
            .values()
            .position(|entry| entry.recorded_at > correlation.recorded_at)
            .unwrap_or(self.entries.len());
        self.entries.shift_insert(index, key, correlation);
    }

    fn evict_over(&mut self, capacity: usize) {
        while self.entries.len() > capacity {
            let Some(((user, msg_id), _)) = self.entries.shift_remove_index(0) else {
                break;
            };
            tracing::warn!(user = %user, msg_id = %msg_id, "Correlation evicted at capacity");
        }
    }

    fn purge(&mut self, now: Instant, timeout: Duration) -> usize {
        let mut purged = 0;
        while let Some((_, oldest)) = self.entries.first() {
            if now.saturating_duration_since(oldest.recorded_at) < timeout {
                break;
            }
            self.entries.shift_remove_index(0);
            purged += 1;
        }
        purged
    }
}

/// Message router for one node
pub struct Messenger {
    local: SharedProxy,
    endpoints: Arc<EndpointManager>,
    distributor: Arc<Distributor<Envelope>>,
    correlations: Mutex<CorrelationTable>,
    clock: SharedClock,
    config: MessengerConfig,
}

impl std::fmt::Debug for Messenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("local", self.local.comm_id())
            .field("pending", &self.pending_correlations())
            .finish()
    }
}

impl Messenger {
    pub fn new(
        local: SharedProxy,
        endpoints: Arc<EndpointManager>,
        distributor: Arc<Distributor<Envelope>>,
        config: MessengerConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            local,
            endpoints,
            distributor,
            correlations: Mutex::new(CorrelationTable::default()),
            clock,
            config,
        }
    }

    /// Comm id every outgoing envelope carries as its origin
    pub fn local_comm_id(&self) -> &CommId {
        self.local.comm_id()
    }

    pub fn distributor(&self) -> &Arc<Distributor<Envelope>> {
        &self.distributor
    }

    /// Route a message from local interface `sender_tag` to interface `tag`
    /// of the endpoint at `comm_id`
    ///
    /// Fails with `UnknownDestination`, without posting or recording
    /// anything, unless the destination belongs to `user` and has
    /// `(local comm id, sender_tag)` registered as a connection.
    pub fn send(
        &self,
        user: &UserId,
        tag: &Tag,
        comm_id: &CommId,
        sender_tag: &Tag,
        msg: OutgoingMessage,
        msg_id: MessageId,
    ) -> Result<()> {
        let origin = self.local.comm_id();
        let endpoint = self
            .endpoints
            .endpoint_by_comm_id(comm_id)
            .filter(|endpoint| endpoint.user() == user)
            .ok_or_else(|| RceError::unknown_destination(comm_id, tag, sender_tag))?;

        let envelope = Envelope {
            user: user.clone(),
            tag: tag.clone(),
            comm_id: comm_id.clone(),
            sender_comm_id: origin.clone(),
            sender_tag: sender_tag.clone(),
            message_type: msg.message_type,
            kind: msg.kind,
            msg_id: msg_id.clone(),
            payload: msg.payload,
        };

        // Recorded before posting; the response may arrive before `deliver` returns
        let key = (user.clone(), msg_id.clone());
        let displaced = (msg.kind == EnvelopeKind::Request)
            .then(|| self.record(key.clone(), sender_tag, comm_id));

        if let Err(err) = endpoint.deliver(envelope, origin) {
            if let Some(displaced) = displaced {
                let mut table = self.correlations.lock();
                table.entries.shift_remove(&key);
                if let Some(previous) = displaced {
                    table.restore(key, previous);
                }
            }
            tracing::debug!(
                destination = %comm_id,
                tag = %tag,
                sender = %sender_tag,
                error = %err,
                "Send rejected"
            );
            return Err(err);
        }

        if displaced.is_some() {
            self.correlations
                .lock()
                .evict_over(self.config.max_pending_correlations.max(1));
        }
        tracing::debug!(
            destination = %comm_id,
            tag = %tag,
            sender = %sender_tag,
            msg_id = %msg_id,
            kind = %msg.kind,
            "Message sent"
        );
        Ok(())
    }

    /// Returns the entry a re-sent id replaced
    fn record(
        &self,
        key: CorrelationKey,
        origin_tag: &Tag,
        destination: &CommId,
    ) -> Option<Correlation> {
        let now = self.clock.now();
        let mut table = self.correlations.lock();
        table.purge(now, self.config.correlation_timeout());

        // Re-sent ids move to the back so the table stays ordered by age
        let displaced = table.entries.shift_remove(&key);
        table.entries.insert(
            key,
            Correlation {
                origin_tag: origin_tag.clone(),
                destination: destination.clone(),
                recorded_at: now,
            },
        );
        displaced
    }

    /// Handle an envelope arriving from the transport
    ///
    /// Responses go back to the interface whose request they answer and
    /// consume its correlation. A response is stale unless it carries the
    /// requesting user and comes from the endpoint the request went to.
    /// Everything else is dispatched by message type.
    pub fn receive(&self, envelope: Envelope) -> Result<()> {
        if envelope.kind != EnvelopeKind::Response {
            return self
                .distributor
                .dispatch(&envelope.message_type.clone(), envelope);
        }

        let now = self.clock.now();
        let key = (envelope.user.clone(), envelope.msg_id.clone());
        let correlation = {
            let mut table = self.correlations.lock();
            table.purge(now, self.config.correlation_timeout());
            let answers = table
                .entries
                .get(&key)
                .is_some_and(|entry| entry.destination == envelope.sender_comm_id);
            if answers {
                table.entries.shift_remove(&key)
            } else {
                None
            }
        };
        let Some(correlation) = correlation else {
            tracing::warn!(
                user = %envelope.user,
                msg_id = %envelope.msg_id,
                sender = %envelope.sender_comm_id,
                "Dropping response with stale correlation"
            );
            return Err(RceError::stale_correlation(&envelope.msg_id));
        };

        let reply = Envelope {
            tag: correlation.origin_tag,
            comm_id: self.local.comm_id().clone(),
            ..envelope
        };
        tracing::debug!(
            msg_id = %reply.msg_id,
            tag = %reply.tag,
            responder = %correlation.destination,
            "Response routed to requester"
        );
        self.local.post(Outbound::Envelope(reply))
    }

    /// Drop correlations older than the correlation window
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let purged = self
            .correlations
            .lock()
            .purge(now, self.config.correlation_timeout());
        if purged > 0 {
            tracing::debug!(purged, "Expired correlations purged");
        }
        purged
    }

    pub fn pending_correlations(&self) -> usize {
        self.correlations.lock().entries.len()
    }

    /// Periodically purge expired correlations
    ///
    /// The task ends once the messenger is dropped.
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.config.reaper_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(messenger) = weak.upgrade() else {
                    break;
                };
                messenger.purge_expired();
            }
        })
    }
}
