//! Multiple concurrent sessions behave as independent controllers with no
//! shared state beyond the broker and the local world.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use atrium_bus::{BusClient, LocalBroker};
use atrium_client::testing::SessionRelay;
use atrium_client::{MemoryWorld, SyncConfig, SyncManager};
use atrium_proto::{
    EntityCreate, EntityCreateSpec, EntityKind, Extent, MeshFields, Quat, Vec3,
};

#[tokio::test]
async fn sessions_are_isolated_per_controller() {
    let broker = LocalBroker::new();
    let _relay = SessionRelay::start(Arc::new(broker.client())).await.unwrap();

    let world = MemoryWorld::new();
    let factory_broker = broker.clone();
    let manager = SyncManager::new(
        move || Arc::new(factory_broker.client()) as Arc<dyn BusClient>,
        Arc::new(world.clone()),
        SyncConfig::default(),
    );

    let red = Uuid::new_v4();
    let blue = Uuid::new_v4();

    let red_controller = manager.open(red, false).await.unwrap();
    red_controller.create_session(red, "red").await.unwrap();
    let blue_controller = manager.open(blue, false).await.unwrap();
    blue_controller.create_session(blue, "blue").await.unwrap();

    manager.join(red, "worker", false).await.unwrap();
    manager.join(blue, "worker", false).await.unwrap();
    assert_eq!(manager.session_ids().len(), 2);

    // An entity announced into the red session stays invisible to blue.
    let entity_id = Uuid::new_v4();
    world.spawn(entity_id, EntityKind::Mesh);
    red_controller
        .replicator()
        .add_synchronized_entity(EntityCreate {
            entity_id,
            tag: "crate".into(),
            parent_id: None,
            position: Vec3::default(),
            rotation: Quat::IDENTITY,
            extent: Extent::scale(Vec3::splat(1.0)),
            delete_with_client: false,
            spec: EntityCreateSpec::Mesh(MeshFields {
                mesh_object: "models/crate.glb".into(),
                mesh_resources: vec![],
            }),
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(red_controller.replicator().is_tracked(entity_id));
    assert!(!blue_controller.replicator().is_tracked(entity_id));

    // Closing one session leaves the other untouched.
    manager.close(red).await.unwrap();
    assert!(manager.get(red).is_none());
    let blue_controller = manager.get(blue).expect("blue still open");
    assert_eq!(blue_controller.session_id(), Some(blue));

    manager.shutdown().await.unwrap();
    assert!(manager.session_ids().is_empty());
}
