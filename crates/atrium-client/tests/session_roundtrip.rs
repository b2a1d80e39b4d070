//! End-to-end replication scenarios over an in-process broker: two
//! participants, a session relay, and independent world replicas.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use uuid::Uuid;

use atrium_bus::{BusClient, LocalBroker};
use atrium_client::testing::SessionRelay;
use atrium_client::{MemoryWorld, SessionController, SessionEvent, SyncConfig};
use atrium_proto::{
    encode_create, topics, EntityCreate, EntityCreateSpec, EntityKind, Envelope, Extent,
    MeshFields, Quat, Vec3,
};

const WAIT: Duration = Duration::from_secs(2);

async fn wait_for(
    events: &mut broadcast::Receiver<SessionEvent>,
    description: &str,
    predicate: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    panic!("event stream closed while waiting for {description}")
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {description}"))
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

struct Client {
    controller: Arc<SessionController>,
    world: MemoryWorld,
}

async fn connect_client(broker: &LocalBroker, offset: Vec3) -> Client {
    let world = MemoryWorld::new();
    let controller = SessionController::new(
        Arc::new(broker.client()),
        Arc::new(world.clone()),
        SyncConfig {
            offset,
            ..SyncConfig::default()
        },
    );
    controller.connect(false).await.expect("connect");
    Client { controller, world }
}

fn mesh_create(entity_id: Uuid, tag: &str, position: Vec3) -> EntityCreate {
    EntityCreate {
        entity_id,
        tag: tag.to_string(),
        parent_id: None,
        position,
        rotation: Quat::IDENTITY,
        extent: Extent::scale(Vec3::splat(1.0)),
        delete_with_client: false,
        spec: EntityCreateSpec::Mesh(MeshFields {
            mesh_object: "models/crate.glb".into(),
            mesh_resources: vec![],
        }),
    }
}

#[tokio::test]
async fn join_and_create_replicates_across_participants() {
    let broker = LocalBroker::new();
    let _relay = SessionRelay::start(Arc::new(broker.client())).await.unwrap();
    let session_id = Uuid::new_v4();

    let alice = connect_client(&broker, Vec3::default()).await;
    alice
        .controller
        .create_session(session_id, "room")
        .await
        .unwrap();
    alice
        .controller
        .join_session(session_id, "alice")
        .await
        .unwrap();

    let bob = connect_client(&broker, Vec3::new(10.0, 0.0, 0.0)).await;
    let mut bob_events = bob.controller.events();
    bob.controller
        .join_session(session_id, "bob")
        .await
        .unwrap();

    let mut alice_events = alice.controller.events();
    let entity_id = Uuid::new_v4();
    alice.world.spawn(entity_id, EntityKind::Mesh);
    alice
        .controller
        .replicator()
        .add_synchronized_entity(mesh_create(entity_id, "crate", Vec3::new(1.0, 2.0, 3.0)))
        .await
        .unwrap();

    wait_for(&mut bob_events, "bob replicates the mesh", |event| {
        matches!(event, SessionEvent::EntityReplicated { entity_id: id, .. } if *id == entity_id)
    })
    .await;

    let replica = bob.world.get(entity_id).expect("replica exists");
    assert!(replica.visible);
    assert_eq!(replica.tag, "crate");
    // Session position (1,2,3) adjusted by bob's own offset.
    assert_eq!(replica.position, Vec3::new(11.0, 2.0, 3.0));

    // The creation status echoes back to alice and must be suppressed.
    settle().await;
    while let Ok(event) = alice_events.try_recv() {
        assert!(
            !matches!(event, SessionEvent::EntityReplicated { .. }),
            "alice must not replicate her own entity"
        );
    }
    assert_eq!(alice.world.count(), 1);
}

#[tokio::test]
async fn mutation_echo_is_suppressed_and_remote_applies() {
    let broker = LocalBroker::new();
    let _relay = SessionRelay::start(Arc::new(broker.client())).await.unwrap();
    let session_id = Uuid::new_v4();

    let alice = connect_client(&broker, Vec3::default()).await;
    alice
        .controller
        .create_session(session_id, "room")
        .await
        .unwrap();
    alice
        .controller
        .join_session(session_id, "alice")
        .await
        .unwrap();
    let bob = connect_client(&broker, Vec3::default()).await;
    let mut bob_events = bob.controller.events();
    bob.controller
        .join_session(session_id, "bob")
        .await
        .unwrap();

    let entity_id = Uuid::new_v4();
    alice.world.spawn(entity_id, EntityKind::Mesh);
    alice
        .controller
        .replicator()
        .add_synchronized_entity(mesh_create(entity_id, "crate", Vec3::default()))
        .await
        .unwrap();
    wait_for(&mut bob_events, "bob replicates the mesh", |event| {
        matches!(event, SessionEvent::EntityReplicated { .. })
    })
    .await;

    // The local application did not highlight its own entity; only the
    // publish happened. If the echo were applied, alice's world would
    // flip to highlighted too.
    alice
        .controller
        .replicator()
        .set_highlight(entity_id, true)
        .await
        .unwrap();
    settle().await;

    assert!(!alice.world.get(entity_id).unwrap().highlighted);
    assert!(bob.world.get(entity_id).unwrap().highlighted);
}

#[tokio::test]
async fn duplicate_creation_is_idempotent() {
    let broker = LocalBroker::new();
    let _relay = SessionRelay::start(Arc::new(broker.client())).await.unwrap();
    let session_id = Uuid::new_v4();

    let bob = connect_client(&broker, Vec3::default()).await;
    let mut bob_events = bob.controller.events();
    bob.controller
        .join_session(session_id, "bob")
        .await
        .unwrap();

    let entity_id = Uuid::new_v4();
    let raw = encode_create(
        &Envelope::new("mallory", "", session_id),
        &mesh_create(entity_id, "crate", Vec3::default()),
    )
    .unwrap();
    let injector = broker.client();
    injector.connect().await.unwrap();
    let topic = topics::status_create(session_id, EntityKind::Mesh);
    injector
        .publish(&topic, bytes::Bytes::from(raw.clone()))
        .await
        .unwrap();
    injector
        .publish(&topic, bytes::Bytes::from(raw))
        .await
        .unwrap();

    wait_for(&mut bob_events, "first creation applies", |event| {
        matches!(event, SessionEvent::EntityReplicated { .. })
    })
    .await;
    settle().await;

    assert_eq!(bob.world.count(), 1, "second application must be a no-op");
    while let Ok(event) = bob_events.try_recv() {
        assert!(
            !matches!(event, SessionEvent::EntityReplicated { .. }),
            "duplicate creation must not replicate again"
        );
    }
}

#[tokio::test]
async fn remove_keeps_local_entity_and_stops_mirroring() {
    let broker = LocalBroker::new();
    let _relay = SessionRelay::start(Arc::new(broker.client())).await.unwrap();
    let session_id = Uuid::new_v4();

    let alice = connect_client(&broker, Vec3::default()).await;
    alice
        .controller
        .create_session(session_id, "room")
        .await
        .unwrap();
    alice
        .controller
        .join_session(session_id, "alice")
        .await
        .unwrap();
    let bob = connect_client(&broker, Vec3::default()).await;
    let mut bob_events = bob.controller.events();
    bob.controller
        .join_session(session_id, "bob")
        .await
        .unwrap();

    let replicator = alice.controller.replicator();
    let entity_id = Uuid::new_v4();
    alice.world.spawn(entity_id, EntityKind::Mesh);
    replicator
        .add_synchronized_entity(mesh_create(entity_id, "crate", Vec3::default()))
        .await
        .unwrap();
    wait_for(&mut bob_events, "bob replicates the mesh", |event| {
        matches!(event, SessionEvent::EntityReplicated { .. })
    })
    .await;

    replicator.remove_synchronized_entity(entity_id).await.unwrap();
    wait_for(&mut bob_events, "bob sees the remove", |event| {
        matches!(event, SessionEvent::EntityRemoved { entity_id: id } if *id == entity_id)
    })
    .await;

    // Local entity intact on both sides, but no longer mirrored.
    assert!(alice.world.get(entity_id).is_some());
    assert!(bob.world.get(entity_id).is_some());
    assert!(!replicator.is_tracked(entity_id));
    let err = replicator
        .set_position(entity_id, Vec3::splat(9.0))
        .await
        .expect_err("mutations after remove must not publish");
    assert!(matches!(
        err,
        atrium_client::SyncError::InvalidEntity(id) if id == entity_id
    ));
}

#[tokio::test]
async fn delete_removes_everywhere() {
    let broker = LocalBroker::new();
    let _relay = SessionRelay::start(Arc::new(broker.client())).await.unwrap();
    let session_id = Uuid::new_v4();

    let alice = connect_client(&broker, Vec3::default()).await;
    alice
        .controller
        .create_session(session_id, "room")
        .await
        .unwrap();
    alice
        .controller
        .join_session(session_id, "alice")
        .await
        .unwrap();
    let bob = connect_client(&broker, Vec3::default()).await;
    let mut bob_events = bob.controller.events();
    bob.controller
        .join_session(session_id, "bob")
        .await
        .unwrap();

    let replicator = alice.controller.replicator();
    let entity_id = Uuid::new_v4();
    alice.world.spawn(entity_id, EntityKind::Mesh);
    replicator
        .add_synchronized_entity(mesh_create(entity_id, "crate", Vec3::default()))
        .await
        .unwrap();
    wait_for(&mut bob_events, "bob replicates the mesh", |event| {
        matches!(event, SessionEvent::EntityReplicated { .. })
    })
    .await;

    replicator.delete_synchronized_entity(entity_id).await.unwrap();
    wait_for(&mut bob_events, "bob sees the delete", |event| {
        matches!(event, SessionEvent::EntityDeleted { entity_id: id } if *id == entity_id)
    })
    .await;

    assert!(alice.world.get(entity_id).is_none());
    assert!(bob.world.get(entity_id).is_none());
    assert!(!replicator.is_tracked(entity_id));
}

#[tokio::test]
async fn full_state_replace_discards_unlisted_entities() {
    let broker = LocalBroker::new();
    let _relay = SessionRelay::start(Arc::new(broker.client())).await.unwrap();
    let session_id = Uuid::new_v4();

    let alice = connect_client(&broker, Vec3::default()).await;
    alice
        .controller
        .create_session(session_id, "room")
        .await
        .unwrap();
    alice
        .controller
        .join_session(session_id, "alice")
        .await
        .unwrap();
    let bob = connect_client(&broker, Vec3::default()).await;
    let mut bob_events = bob.controller.events();
    bob.controller
        .join_session(session_id, "bob")
        .await
        .unwrap();

    let replicator = alice.controller.replicator();
    let listed_a = Uuid::new_v4();
    let listed_b = Uuid::new_v4();
    for (id, tag) in [(listed_a, "one"), (listed_b, "two")] {
        alice.world.spawn(id, EntityKind::Mesh);
        replicator
            .add_synchronized_entity(mesh_create(id, tag, Vec3::default()))
            .await
            .unwrap();
    }
    for _ in 0..2 {
        wait_for(&mut bob_events, "bob replicates", |event| {
            matches!(event, SessionEvent::EntityReplicated { .. })
        })
        .await;
    }

    // A stray creation status that the session registry never saw: it
    // must not survive reconciliation.
    let stray = Uuid::new_v4();
    let injector = broker.client();
    injector.connect().await.unwrap();
    injector
        .publish(
            &topics::status_create(session_id, EntityKind::Mesh),
            bytes::Bytes::from(
                encode_create(
                    &Envelope::new("mallory", "", session_id),
                    &mesh_create(stray, "stray", Vec3::default()),
                )
                .unwrap(),
            ),
        )
        .await
        .unwrap();
    wait_for(&mut bob_events, "stray replicates", |event| {
        matches!(event, SessionEvent::EntityReplicated { entity_id: id, .. } if *id == stray)
    })
    .await;
    assert_eq!(bob.world.count(), 3);

    let summary = bob.controller.get_session_state().await.unwrap();
    assert_eq!(summary.entities.len(), 2);
    assert!(summary.participants.iter().any(|client| client.tag == "alice"));
    assert!(summary.participants.iter().any(|client| client.tag == "bob"));

    // Exactly the listed set survives.
    assert_eq!(bob.world.count(), 2);
    assert!(bob.world.get(listed_a).is_some());
    assert!(bob.world.get(listed_b).is_some());
    assert!(bob.world.get(stray).is_none());
}

#[tokio::test]
async fn passthrough_messages_reach_all_participants() {
    let broker = LocalBroker::new();
    let _relay = SessionRelay::start(Arc::new(broker.client())).await.unwrap();
    let session_id = Uuid::new_v4();

    let alice = connect_client(&broker, Vec3::default()).await;
    alice
        .controller
        .create_session(session_id, "room")
        .await
        .unwrap();
    alice
        .controller
        .join_session(session_id, "alice")
        .await
        .unwrap();
    let bob = connect_client(&broker, Vec3::default()).await;
    let mut bob_events = bob.controller.events();
    bob.controller
        .join_session(session_id, "bob")
        .await
        .unwrap();

    alice
        .controller
        .replicator()
        .send_message("chat", "hello there")
        .await
        .unwrap();

    let event = wait_for(&mut bob_events, "bob receives the message", |event| {
        matches!(event, SessionEvent::Message { .. })
    })
    .await;
    assert_eq!(
        event,
        SessionEvent::Message {
            topic: "chat".into(),
            message: "hello there".into()
        }
    );
}
