//! Routing, correlation and dispatch through the messenger

use rce_core::{
    CommId, CommProxy, Envelope, EnvelopeKind, MessageId, MessengerConfig, Outbound, Payload,
    RceError, Tag, UserId,
};
use rce_endpoint::{Connection, Creation, Endpoint, EndpointManager};
use rce_messaging::{Distributor, Messenger, OutgoingMessage, SharedHandler};
use rce_testkit::{container, subscriber, ManualClock, RecordingProxy};
use std::sync::{Arc, OnceLock, Weak};
use std::thread;
use std::time::Duration;

struct Harness {
    local: Arc<RecordingProxy>,
    remote: Arc<RecordingProxy>,
    endpoint: Arc<Endpoint>,
    clock: Arc<ManualClock>,
    messenger: Arc<Messenger>,
}

fn harness(config: MessengerConfig) -> Harness {
    let endpoints = Arc::new(EndpointManager::new());
    let remote = RecordingProxy::shared("c1");
    let Creation::Active(endpoint) = endpoints
        .create_container(
            &UserId::new("alice"),
            &container("c1"),
            CommId::new("c1"),
            remote.clone(),
        )
        .unwrap()
    else {
        panic!("container should be active");
    };
    endpoint.add_interface(subscriber("listener")).unwrap();
    endpoint
        .register_connection(&Tag::new("listener"), Connection::new("local", "talker"))
        .unwrap();

    let local = RecordingProxy::shared("local");
    let clock = ManualClock::shared();
    let messenger = Arc::new(Messenger::new(
        local.clone(),
        endpoints,
        Arc::new(Distributor::new()),
        config,
        clock.clone(),
    ));
    Harness {
        local,
        remote,
        endpoint,
        clock,
        messenger,
    }
}

fn message(kind: EnvelopeKind) -> OutgoingMessage {
    OutgoingMessage::new("std_msgs/String", kind, Payload::Raw(b"hello".to_vec()))
}

fn send(h: &Harness, sender: &str, kind: EnvelopeKind, msg_id: &str) -> rce_core::Result<()> {
    h.messenger.send(
        &UserId::new("alice"),
        &Tag::new("listener"),
        &CommId::new("c1"),
        &Tag::new(sender),
        message(kind),
        MessageId::new(msg_id),
    )
}

fn response_to(msg_id: &str) -> Envelope {
    Envelope {
        user: UserId::new("alice"),
        tag: Tag::new("talker"),
        comm_id: CommId::new("local"),
        sender_comm_id: CommId::new("c1"),
        sender_tag: Tag::new("listener"),
        message_type: "std_msgs/String".into(),
        kind: EnvelopeKind::Response,
        msg_id: MessageId::new(msg_id),
        payload: Payload::Raw(b"pong".to_vec()),
    }
}

#[test]
fn send_without_connection_is_rejected_without_side_effects() {
    let h = harness(MessengerConfig::default());

    assert!(matches!(
        send(&h, "stranger", EnvelopeKind::Request, "m1"),
        Err(RceError::UnknownDestination { .. })
    ));
    assert!(h.remote.is_empty());
    assert_eq!(h.messenger.pending_correlations(), 0);
}

#[test]
fn send_to_another_users_endpoint_is_rejected() {
    let h = harness(MessengerConfig::default());
    let result = h.messenger.send(
        &UserId::new("mallory"),
        &Tag::new("listener"),
        &CommId::new("c1"),
        &Tag::new("talker"),
        message(EnvelopeKind::Message),
        MessageId::new("m1"),
    );
    assert!(matches!(result, Err(RceError::UnknownDestination { .. })));
    assert!(h.remote.is_empty());
}

#[test]
fn send_after_unregistering_connection_is_rejected() {
    let h = harness(MessengerConfig::default());
    send(&h, "talker", EnvelopeKind::Message, "m1").unwrap();
    h.endpoint
        .unregister_connection(&Tag::new("listener"), &Connection::new("local", "talker"))
        .unwrap();

    assert!(send(&h, "talker", EnvelopeKind::Message, "m2").is_err());
    assert_eq!(h.remote.len(), 1);
}

#[test]
fn delivered_envelope_carries_local_origin() {
    let h = harness(MessengerConfig::default());
    send(&h, "talker", EnvelopeKind::Message, "m1").unwrap();

    let delivered = h.remote.envelopes();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].sender_comm_id, CommId::new("local"));
    assert_eq!(delivered[0].sender_tag, Tag::new("talker"));
    // Topic messages expect no response
    assert_eq!(h.messenger.pending_correlations(), 0);
}

#[test]
fn response_is_routed_back_to_requester_once() {
    let h = harness(MessengerConfig::default());
    send(&h, "talker", EnvelopeKind::Request, "req-1").unwrap();
    assert_eq!(h.messenger.pending_correlations(), 1);

    h.messenger.receive(response_to("req-1")).unwrap();
    let replies = h.local.envelopes();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].tag, Tag::new("talker"));
    assert_eq!(replies[0].comm_id, CommId::new("local"));
    assert_eq!(replies[0].payload, Payload::Raw(b"pong".to_vec()));
    assert_eq!(h.messenger.pending_correlations(), 0);

    assert_eq!(
        h.messenger.receive(response_to("req-1")),
        Err(RceError::stale_correlation("req-1"))
    );
    assert_eq!(h.local.len(), 1);
}

#[test]
fn expired_correlation_is_stale() {
    let h = harness(MessengerConfig {
        correlation_timeout_ms: 1_000,
        ..MessengerConfig::default()
    });
    send(&h, "talker", EnvelopeKind::Request, "req-1").unwrap();
    h.clock.advance(Duration::from_millis(1_000));

    assert!(matches!(
        h.messenger.receive(response_to("req-1")),
        Err(RceError::StaleCorrelation { .. })
    ));
    assert!(h.local.is_empty());
}

#[test]
fn oldest_correlation_evicted_at_capacity() {
    let h = harness(MessengerConfig {
        max_pending_correlations: 2,
        ..MessengerConfig::default()
    });
    for id in ["a", "b", "c"] {
        send(&h, "talker", EnvelopeKind::Request, id).unwrap();
    }
    assert_eq!(h.messenger.pending_correlations(), 2);
    assert!(h.messenger.receive(response_to("a")).is_err());
    h.messenger.receive(response_to("c")).unwrap();
}

#[test]
fn purge_drops_only_expired_entries() {
    let h = harness(MessengerConfig {
        correlation_timeout_ms: 100,
        ..MessengerConfig::default()
    });
    send(&h, "talker", EnvelopeKind::Request, "old").unwrap();
    h.clock.advance(Duration::from_millis(60));
    send(&h, "talker", EnvelopeKind::Request, "new").unwrap();
    h.clock.advance(Duration::from_millis(40));

    assert_eq!(h.messenger.purge_expired(), 1);
    assert_eq!(h.messenger.pending_correlations(), 1);
    h.messenger.receive(response_to("new")).unwrap();
}

#[test]
fn sends_on_one_connection_keep_their_order() {
    let h = harness(MessengerConfig::default());
    h.endpoint
        .register_connection(&Tag::new("listener"), Connection::new("local", "other"))
        .unwrap();

    let workers: Vec<_> = ["talker", "other"]
        .into_iter()
        .map(|sender| {
            let messenger = Arc::clone(&h.messenger);
            thread::spawn(move || {
                for i in 0..100 {
                    messenger
                        .send(
                            &UserId::new("alice"),
                            &Tag::new("listener"),
                            &CommId::new("c1"),
                            &Tag::new(sender),
                            message(EnvelopeKind::Message),
                            MessageId::new(format!("{sender}-{i}")),
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    for sender in ["talker", "other"] {
        let ids: Vec<String> = h
            .remote
            .envelopes()
            .into_iter()
            .filter(|e| e.sender_tag.as_str() == sender)
            .map(|e| e.msg_id.into_inner())
            .collect();
        let expected: Vec<String> = (0..100).map(|i| format!("{sender}-{i}")).collect();
        assert_eq!(ids, expected);
    }
}

#[test]
fn same_message_id_from_two_users_is_correlated_separately() {
    let endpoints = Arc::new(EndpointManager::new());
    let mut remotes = Vec::new();
    for (user, tag) in [("alice", "c1"), ("bob", "c2")] {
        let remote = RecordingProxy::shared(tag);
        let Creation::Active(endpoint) = endpoints
            .create_container(&UserId::new(user), &container(tag), CommId::new(tag), remote.clone())
            .unwrap()
        else {
            panic!("container should be active");
        };
        endpoint.add_interface(subscriber("listener")).unwrap();
        endpoint
            .register_connection(&Tag::new("listener"), Connection::new("local", "talker"))
            .unwrap();
        remotes.push(remote);
    }
    let local = RecordingProxy::shared("local");
    let messenger = Messenger::new(
        local.clone(),
        endpoints,
        Arc::new(Distributor::new()),
        MessengerConfig::default(),
        ManualClock::shared(),
    );

    for (user, tag) in [("alice", "c1"), ("bob", "c2")] {
        messenger
            .send(
                &UserId::new(user),
                &Tag::new("listener"),
                &CommId::new(tag),
                &Tag::new("talker"),
                message(EnvelopeKind::Request),
                MessageId::new("1"),
            )
            .unwrap();
    }
    assert_eq!(messenger.pending_correlations(), 2);

    let reply = |user: &str, responder: &str| Envelope {
        user: UserId::new(user),
        sender_comm_id: CommId::new(responder),
        ..response_to("1")
    };

    // Neither a foreign user nor a different endpoint may consume a request
    assert!(matches!(
        messenger.receive(reply("bob", "c1")),
        Err(RceError::StaleCorrelation { .. })
    ));
    assert!(matches!(
        messenger.receive(reply("alice", "c2")),
        Err(RceError::StaleCorrelation { .. })
    ));
    assert!(local.is_empty());

    messenger.receive(reply("alice", "c1")).unwrap();
    messenger.receive(reply("bob", "c2")).unwrap();
    let users: Vec<UserId> = local.envelopes().into_iter().map(|e| e.user).collect();
    assert_eq!(users, vec![UserId::new("alice"), UserId::new("bob")]);
    assert_eq!(messenger.pending_correlations(), 0);
}

/// Transport that answers every request while it is still being posted
struct EchoingProxy {
    comm_id: CommId,
    messenger: OnceLock<Weak<Messenger>>,
}

impl CommProxy for EchoingProxy {
    fn comm_id(&self) -> &CommId {
        &self.comm_id
    }

    fn post(&self, frame: Outbound) -> rce_core::Result<()> {
        let Outbound::Envelope(request) = frame else {
            return Ok(());
        };
        let Some(messenger) = self.messenger.get().and_then(Weak::upgrade) else {
            return Ok(());
        };
        messenger.receive(Envelope {
            kind: EnvelopeKind::Response,
            sender_comm_id: self.comm_id.clone(),
            ..request
        })
    }
}

#[test]
fn response_arriving_during_send_finds_its_request() {
    let endpoints = Arc::new(EndpointManager::new());
    let remote = Arc::new(EchoingProxy {
        comm_id: CommId::new("c1"),
        messenger: OnceLock::new(),
    });
    let Creation::Active(endpoint) = endpoints
        .create_container(
            &UserId::new("alice"),
            &container("c1"),
            CommId::new("c1"),
            remote.clone(),
        )
        .unwrap()
    else {
        panic!("container should be active");
    };
    endpoint.add_interface(subscriber("listener")).unwrap();
    endpoint
        .register_connection(&Tag::new("listener"), Connection::new("local", "talker"))
        .unwrap();

    let local = RecordingProxy::shared("local");
    let messenger = Arc::new(Messenger::new(
        local.clone(),
        endpoints,
        Arc::new(Distributor::new()),
        MessengerConfig::default(),
        ManualClock::shared(),
    ));
    remote.messenger.set(Arc::downgrade(&messenger)).unwrap();

    messenger
        .send(
            &UserId::new("alice"),
            &Tag::new("listener"),
            &CommId::new("c1"),
            &Tag::new("talker"),
            message(EnvelopeKind::Request),
            MessageId::new("req-1"),
        )
        .unwrap();

    let replies = local.envelopes();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].tag, Tag::new("talker"));
    assert_eq!(messenger.pending_correlations(), 0);
}

#[test]
fn failed_resend_keeps_the_pending_request() {
    let h = harness(MessengerConfig::default());
    send(&h, "talker", EnvelopeKind::Request, "req-1").unwrap();
    h.remote.set_failing(true);

    assert!(send(&h, "talker", EnvelopeKind::Request, "req-1").is_err());
    assert!(send(&h, "talker", EnvelopeKind::Request, "req-2").is_err());
    assert_eq!(h.messenger.pending_correlations(), 1);
    h.messenger.receive(response_to("req-1")).unwrap();
}

#[test]
fn inbound_messages_dispatch_by_type() {
    let h = harness(MessengerConfig::default());
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler: SharedHandler<Envelope> =
        Arc::new(move |envelope: Envelope| -> rce_core::Result<()> {
            sink.lock().push(envelope.msg_id);
            Ok(())
        });

    let mut inbound = response_to("topic-1");
    inbound.kind = EnvelopeKind::Message;
    assert!(matches!(
        h.messenger.receive(inbound.clone()),
        Err(RceError::NoHandler { .. })
    ));

    h.messenger
        .distributor()
        .add_handler("std_msgs/String", handler);
    h.messenger.receive(inbound).unwrap();
    assert_eq!(*seen.lock(), vec![MessageId::new("topic-1")]);
    assert!(h.local.is_empty());
}

#[tokio::test(start_paused = true)]
async fn reaper_purges_in_background() {
    let h = harness(MessengerConfig {
        correlation_timeout_ms: 100,
        reaper_interval_ms: 50,
        ..MessengerConfig::default()
    });
    send(&h, "talker", EnvelopeKind::Request, "req-1").unwrap();
    h.clock.advance(Duration::from_millis(200));

    let reaper = h.messenger.spawn_reaper();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(h.messenger.pending_correlations(), 0);
    reaper.abort();
}
