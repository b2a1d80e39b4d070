//! Guard-clause behavior: every mutating operation checks its
//! preconditions independently and publishes nothing when one fires.
//! Structural validation of outgoing creations lives here too.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use atrium_bus::{BusClient, LocalBroker};
use atrium_client::testing::SessionRelay;
use atrium_client::{MemoryWorld, SessionController, SyncConfig, SyncError};
use atrium_proto::{
    ButtonFields, EntityCreate, EntityCreateSpec, EntityKind, Extent, MeshFields, Quat,
    TerrainBrush, TerrainFields, TerrainKind, TerrainModification, TerrainOperation, Vec2, Vec3,
};

fn mesh_create(entity_id: Uuid, position: Vec3) -> EntityCreate {
    EntityCreate {
        entity_id,
        tag: "crate".into(),
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
async fn operations_fail_before_connect() {
    let broker = LocalBroker::new();
    let world = MemoryWorld::new();
    let controller = SessionController::new(
        Arc::new(broker.client()),
        Arc::new(world),
        SyncConfig::default(),
    );

    let err = controller
        .join_session(Uuid::new_v4(), "alice")
        .await
        .expect_err("join before connect");
    assert!(matches!(err, SyncError::NotInitialized));

    let err = controller.exit_session().await.expect_err("exit");
    assert!(matches!(err, SyncError::NotInitialized));

    let err = controller
        .get_session_state()
        .await
        .expect_err("get state");
    assert!(matches!(err, SyncError::NotInitialized));
}

#[tokio::test]
async fn session_guards_fire_in_order() {
    let broker = LocalBroker::new();
    let world = MemoryWorld::new();
    let controller = SessionController::new(
        Arc::new(broker.client()),
        Arc::new(world.clone()),
        SyncConfig::default(),
    );
    controller.connect(false).await.unwrap();

    // Connected but not in a session.
    let err = controller.exit_session().await.expect_err("exit");
    assert!(matches!(err, SyncError::NotInSession));
    let replicator = controller.replicator();
    let err = replicator
        .set_position(Uuid::new_v4(), Vec3::default())
        .await
        .expect_err("setter");
    assert!(matches!(err, SyncError::NotInSession));

    // In a session, but the entity is unknown.
    let session_id = Uuid::new_v4();
    controller.join_session(session_id, "alice").await.unwrap();
    let ghost = Uuid::new_v4();
    let err = replicator
        .set_position(ghost, Vec3::default())
        .await
        .expect_err("setter on unknown entity");
    assert!(matches!(err, SyncError::InvalidEntity(id) if id == ghost));

    // Joining twice is its own failure.
    let err = controller
        .join_session(Uuid::new_v4(), "alice")
        .await
        .expect_err("double join");
    assert!(matches!(err, SyncError::AlreadyInSession));
}

#[tokio::test]
async fn announcing_a_missing_local_entity_fails() {
    let broker = LocalBroker::new();
    let controller = SessionController::new(
        Arc::new(broker.client()),
        Arc::new(MemoryWorld::new()),
        SyncConfig::default(),
    );
    controller.connect(false).await.unwrap();
    controller
        .join_session(Uuid::new_v4(), "alice")
        .await
        .unwrap();

    let ghost = Uuid::new_v4();
    let err = controller
        .replicator()
        .add_synchronized_entity(mesh_create(ghost, Vec3::default()))
        .await
        .expect_err("announce unknown entity");
    assert!(matches!(err, SyncError::InvalidEntity(id) if id == ghost));
}

#[tokio::test]
async fn widget_requires_canvas_parent() {
    let broker = LocalBroker::new();
    let world = MemoryWorld::new();
    let controller = SessionController::new(
        Arc::new(broker.client()),
        Arc::new(world.clone()),
        SyncConfig::default(),
    );
    controller.connect(false).await.unwrap();
    controller
        .join_session(Uuid::new_v4(), "alice")
        .await
        .unwrap();
    let replicator = controller.replicator();

    // Parent is a mesh, not a canvas.
    let mesh_id = Uuid::new_v4();
    world.spawn(mesh_id, EntityKind::Mesh);
    let button_id = Uuid::new_v4();
    world.spawn_with_parent(button_id, EntityKind::Button, Some(mesh_id));
    let err = replicator
        .add_synchronized_entity(EntityCreate {
            entity_id: button_id,
            tag: "press".into(),
            parent_id: Some(mesh_id),
            position: Vec3::default(),
            rotation: Quat::IDENTITY,
            extent: Extent::size(Vec3::new(0.2, 0.1, 0.01)),
            delete_with_client: false,
            spec: EntityCreateSpec::Button(ButtonFields {
                position_percent: Vec2::new(0.5, 0.5),
                size_percent: Vec2::new(0.2, 0.2),
                on_click: None,
            }),
        })
        .await
        .expect_err("button under a mesh");
    assert!(matches!(err, SyncError::Structural(_)));
    assert!(!replicator.is_tracked(button_id));
}

#[tokio::test]
async fn ragged_heightfield_is_rejected() {
    let broker = LocalBroker::new();
    let world = MemoryWorld::new();
    let controller = SessionController::new(
        Arc::new(broker.client()),
        Arc::new(world.clone()),
        SyncConfig::default(),
    );
    controller.connect(false).await.unwrap();
    controller
        .join_session(Uuid::new_v4(), "alice")
        .await
        .unwrap();

    let terrain_id = Uuid::new_v4();
    world.spawn(terrain_id, EntityKind::Terrain);
    let err = controller
        .replicator()
        .add_synchronized_entity(EntityCreate {
            entity_id: terrain_id,
            tag: "ground".into(),
            parent_id: None,
            position: Vec3::default(),
            rotation: Quat::IDENTITY,
            extent: Extent::scale(Vec3::splat(1.0)),
            delete_with_client: false,
            spec: EntityCreateSpec::Terrain(TerrainFields {
                length: 4.0,
                width: 4.0,
                height: 2.0,
                heights: vec![vec![0.0; 4], vec![0.0; 3]],
                terrain_kind: TerrainKind::Hybrid,
                ..TerrainFields::default()
            }),
        })
        .await
        .expect_err("ragged heightfield");
    assert!(matches!(err, SyncError::Structural(_)));
}

#[tokio::test]
async fn terrain_modification_requires_hybrid_kind() {
    let broker = LocalBroker::new();
    let _relay = SessionRelay::start(Arc::new(broker.client())).await.unwrap();
    let session_id = Uuid::new_v4();

    let world = MemoryWorld::new();
    let controller = SessionController::new(
        Arc::new(broker.client()),
        Arc::new(world.clone()),
        SyncConfig::default(),
    );
    controller.connect(false).await.unwrap();
    controller.create_session(session_id, "room").await.unwrap();
    controller.join_session(session_id, "alice").await.unwrap();
    let replicator = controller.replicator();

    let terrain_id = Uuid::new_v4();
    world.spawn(terrain_id, EntityKind::Terrain);
    world.set_terrain_kind(terrain_id, TerrainKind::Heightmap);
    replicator
        .add_synchronized_entity(EntityCreate {
            entity_id: terrain_id,
            tag: "ground".into(),
            parent_id: None,
            position: Vec3::default(),
            rotation: Quat::IDENTITY,
            extent: Extent::scale(Vec3::splat(1.0)),
            delete_with_client: false,
            spec: EntityCreateSpec::Terrain(TerrainFields {
                length: 4.0,
                width: 4.0,
                height: 2.0,
                heights: vec![vec![0.0; 4]; 4],
                terrain_kind: TerrainKind::Heightmap,
                ..TerrainFields::default()
            }),
        })
        .await
        .unwrap();

    let err = replicator
        .modify_terrain_entity(
            terrain_id,
            TerrainModification {
                operation: TerrainOperation::Dig,
                position: Vec3::default(),
                brush_type: TerrainBrush::Sphere,
                layer: 0,
                size: 1.0,
            },
        )
        .await
        .expect_err("dig on a heightmap terrain");
    assert!(matches!(err, SyncError::Structural(_)));
    assert!(world.get(terrain_id).unwrap().terrain_log.is_empty());
}

#[tokio::test]
async fn remote_terrain_mod_against_non_hybrid_is_dropped() {
    let broker = LocalBroker::new();
    let session_id = Uuid::new_v4();

    let world = MemoryWorld::new();
    let controller = SessionController::new(
        Arc::new(broker.client()),
        Arc::new(world.clone()),
        SyncConfig::default(),
    );
    controller.connect(false).await.unwrap();
    controller.join_session(session_id, "bob").await.unwrap();

    // A heightmap terrain exists locally.
    let terrain_id = Uuid::new_v4();
    world.spawn(terrain_id, EntityKind::Terrain);
    world.set_terrain_kind(terrain_id, TerrainKind::Heightmap);

    let injector = broker.client();
    injector.connect().await.unwrap();
    let update = atrium_proto::TerrainModUpdate {
        envelope: atrium_proto::Envelope::new("mallory", "", session_id),
        modification: TerrainModification {
            operation: TerrainOperation::Build,
            position: Vec3::default(),
            brush_type: TerrainBrush::Sphere,
            layer: 0,
            size: 1.0,
        },
    };
    injector
        .publish(
            &atrium_proto::topics::status_entity(
                session_id,
                terrain_id,
                atrium_proto::EntityProperty::TerrainMod,
            ),
            bytes::Bytes::from(atrium_proto::encode(&update).unwrap()),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(
        world.get(terrain_id).unwrap().terrain_log.is_empty(),
        "non-hybrid terrain must reject modifications"
    );
}

#[tokio::test]
async fn an_entity_enters_replication_once_per_membership() {
    let broker = LocalBroker::new();
    let _relay = SessionRelay::start(Arc::new(broker.client())).await.unwrap();
    let session_id = Uuid::new_v4();

    let world = MemoryWorld::new();
    let controller = SessionController::new(
        Arc::new(broker.client()),
        Arc::new(world.clone()),
        SyncConfig::default(),
    );
    controller.connect(false).await.unwrap();
    controller.create_session(session_id, "room").await.unwrap();
    controller.join_session(session_id, "alice").await.unwrap();
    let replicator = controller.replicator();

    let entity_id = Uuid::new_v4();
    world.spawn(entity_id, EntityKind::Mesh);
    replicator
        .add_synchronized_entity(mesh_create(entity_id, Vec3::default()))
        .await
        .unwrap();
    replicator.remove_synchronized_entity(entity_id).await.unwrap();

    let err = replicator
        .add_synchronized_entity(mesh_create(entity_id, Vec3::default()))
        .await
        .expect_err("re-announce after remove");
    assert!(matches!(err, SyncError::AlreadyReplicated(id) if id == entity_id));
}
