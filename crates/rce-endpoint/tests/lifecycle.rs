//! Endpoint lifecycle across creation, cascading destroy and races

use rce_core::{
    CommId, Envelope, EnvelopeKind, MessageId, Outbound, Payload, RceError, Tag, UserId,
};
use rce_endpoint::{Connection, Creation, EndpointManager, LifecycleState, Teardown};
use rce_testkit::{container, int_parameter, node, publisher, robot, subscriber, RecordingProxy};
use std::sync::{Arc, Barrier};
use std::thread;

fn alice() -> UserId {
    UserId::new("alice")
}

#[test]
fn destroying_a_container_cascades_to_interfaces_and_connections() {
    let manager = EndpointManager::new();
    let creation = manager
        .create_container(
            &alice(),
            &container("c1"),
            CommId::new("c1"),
            RecordingProxy::shared("c1"),
        )
        .unwrap();
    let Creation::Active(endpoint) = creation else {
        panic!("container should be active");
    };

    endpoint.add_interface(publisher("chatter")).unwrap();
    endpoint.add_interface(subscriber("echo")).unwrap();
    endpoint
        .register_connection(&Tag::new("chatter"), Connection::new("r1", "listener"))
        .unwrap();
    endpoint
        .register_connection(&Tag::new("echo"), Connection::new("r1", "talker"))
        .unwrap();
    endpoint.add_node(node("talker")).unwrap();
    endpoint.add_parameter(int_parameter("rate", 10)).unwrap();

    let teardown = manager.destroy_container(&alice(), &Tag::new("c1")).unwrap();
    let Teardown::Completed(report) = teardown else {
        panic!("active container should be destroyed immediately");
    };
    assert_eq!((report.interfaces, report.connections), (2, 2));
    assert_eq!((report.nodes, report.parameters), (1, 1));

    assert!(endpoint.interfaces().is_empty());
    assert_eq!(endpoint.connection_count(), 0);
    assert_eq!(endpoint.lifecycle(), LifecycleState::Removed);
    assert!(manager.container(&alice(), &Tag::new("c1")).is_none());
    assert!(matches!(
        manager.destroy_container(&alice(), &Tag::new("c1")),
        Err(RceError::UnknownEntity { .. })
    ));
}

#[test]
fn destroy_during_creation_finishes_fully_destroyed() {
    let manager = EndpointManager::new();
    let endpoint = manager
        .begin_robot(
            &alice(),
            &robot("r1"),
            CommId::new("r1"),
            RecordingProxy::shared("r1"),
        )
        .unwrap();

    assert_eq!(
        manager.destroy_robot(&alice(), &Tag::new("r1")).unwrap(),
        Teardown::Deferred
    );
    assert_eq!(endpoint.lifecycle(), LifecycleState::Creating);

    let creation = manager.complete_creation(&endpoint).unwrap();
    assert!(matches!(creation, Creation::Cancelled(_)));
    assert_eq!(endpoint.lifecycle(), LifecycleState::Removed);
    assert!(manager.robot(&alice(), &Tag::new("r1")).is_none());
    assert!(manager.endpoint_by_comm_id(&CommId::new("r1")).is_none());
}

#[test]
fn racing_destroy_never_leaves_a_partial_endpoint() {
    for round in 0..50 {
        let manager = Arc::new(EndpointManager::new());
        let tag = format!("c{round}");
        let endpoint = manager
            .begin_container(
                &alice(),
                &container(&tag),
                CommId::new(tag.as_str()),
                RecordingProxy::shared(tag.as_str()),
            )
            .unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let destroyer = {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let tag = Tag::new(&tag);
            thread::spawn(move || {
                barrier.wait();
                manager.destroy_container(&alice(), &tag)
            })
        };
        barrier.wait();
        let creation = manager.complete_creation(&endpoint).unwrap();
        let teardown = destroyer.join().unwrap().unwrap();

        match (creation, teardown) {
            (Creation::Cancelled(_), Teardown::Deferred)
            | (Creation::Active(_), Teardown::Completed(_)) => {}
            other => panic!("inconsistent outcome: {other:?}"),
        }
        assert_eq!(endpoint.lifecycle(), LifecycleState::Removed);
        assert_eq!(manager.container_count(), 0);
    }
}

#[test]
fn deliver_requires_registered_connection() {
    let manager = EndpointManager::new();
    let proxy = RecordingProxy::shared("c1");
    let Creation::Active(endpoint) = manager
        .create_container(&alice(), &container("c1"), CommId::new("c1"), proxy.clone())
        .unwrap()
    else {
        panic!("container should be active");
    };
    endpoint.add_interface(subscriber("listener")).unwrap();
    endpoint
        .register_connection(&Tag::new("listener"), Connection::new("robot", "talker"))
        .unwrap();

    let envelope = Envelope {
        user: alice(),
        tag: Tag::new("listener"),
        comm_id: CommId::new("c1"),
        sender_comm_id: CommId::new("robot"),
        sender_tag: Tag::new("impostor"),
        message_type: "std_msgs/String".into(),
        kind: EnvelopeKind::Message,
        msg_id: MessageId::new("m1"),
        payload: Payload::Raw(b"hi".to_vec()),
    };
    assert!(matches!(
        endpoint.deliver(envelope.clone(), &CommId::new("robot")),
        Err(RceError::UnknownDestination { .. })
    ));
    assert!(proxy.is_empty());

    let envelope = Envelope {
        sender_tag: Tag::new("talker"),
        ..envelope
    };
    endpoint.deliver(envelope.clone(), &CommId::new("robot")).unwrap();
    assert_eq!(proxy.frames(), vec![Outbound::Envelope(envelope)]);
}
