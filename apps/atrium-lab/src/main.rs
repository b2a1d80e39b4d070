//! Local sandbox: an in-process broker, a session relay, one host and N
//! simulated participants replicating a handful of entities. Exists to
//! exercise the full stack end to end without an external bus.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use uuid::Uuid;

use atrium_bus::LocalBroker;
use atrium_client::telemetry::{self, LogConfig, LogLevel};
use atrium_client::testing::SessionRelay;
use atrium_client::{MemoryWorld, SessionController, SyncConfig};
use atrium_proto::{
    ButtonFields, EntityCreate, EntityCreateSpec, EntityKind, Extent, MeshFields, Quat,
    TerrainBrush, TerrainFields, TerrainKind, TerrainModification, TerrainOperation, Vec2, Vec3,
};

#[derive(Parser, Debug)]
#[command(name = "atrium-lab", about = "Single-process replication sandbox")]
struct Args {
    /// Number of simulated participants joining after the host.
    #[arg(long, default_value_t = 2)]
    participants: u32,
    /// error | warn | info | debug | trace
    #[arg(long, default_value = "info")]
    log_level: LogLevel,
    /// Append logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

struct Participant {
    controller: Arc<SessionController>,
    world: MemoryWorld,
    tag: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    telemetry::init(&LogConfig {
        level: args.log_level,
        file: args.log_file.clone(),
    })
    .context("telemetry init")?;

    let broker = LocalBroker::new();
    let _relay = SessionRelay::start(Arc::new(broker.client()))
        .await
        .context("relay start")?;

    let session_id = Uuid::new_v4();

    // Host side: create the session and announce a few entities.
    let host_world = MemoryWorld::new();
    let host = SessionController::new(
        Arc::new(broker.client()),
        Arc::new(host_world.clone()),
        SyncConfig::default(),
    );
    host.connect(true).await?;
    host.create_session(session_id, "lab-room").await?;
    host.join_session(session_id, "host").await?;
    settle().await;

    let replicator = host.replicator();

    let mesh_id = Uuid::new_v4();
    host_world.spawn(mesh_id, EntityKind::Mesh);
    replicator
        .add_synchronized_entity(EntityCreate {
            entity_id: mesh_id,
            tag: "crate".into(),
            parent_id: None,
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::IDENTITY,
            extent: Extent::scale(Vec3::splat(1.0)),
            delete_with_client: false,
            spec: EntityCreateSpec::Mesh(MeshFields {
                mesh_object: "models/crate.glb".into(),
                mesh_resources: vec![],
            }),
        })
        .await?;

    let canvas_id = Uuid::new_v4();
    host_world.spawn(canvas_id, EntityKind::Canvas);
    replicator
        .add_synchronized_entity(EntityCreate {
            entity_id: canvas_id,
            tag: "panel".into(),
            parent_id: None,
            position: Vec3::new(0.0, 1.5, 0.0),
            rotation: Quat::IDENTITY,
            extent: Extent::size(Vec3::new(1.0, 0.5, 0.01)),
            delete_with_client: false,
            spec: EntityCreateSpec::Canvas,
        })
        .await?;

    let button_id = Uuid::new_v4();
    host_world.spawn_with_parent(button_id, EntityKind::Button, Some(canvas_id));
    replicator
        .add_synchronized_entity(EntityCreate {
            entity_id: button_id,
            tag: "greet".into(),
            parent_id: Some(canvas_id),
            position: Vec3::default(),
            rotation: Quat::IDENTITY,
            extent: Extent::size(Vec3::new(0.2, 0.1, 0.01)),
            delete_with_client: false,
            spec: EntityCreateSpec::Button(ButtonFields {
                position_percent: Vec2::new(0.4, 0.4),
                size_percent: Vec2::new(0.2, 0.2),
                on_click: Some("world.say('hello')".into()),
            }),
        })
        .await?;

    let terrain_id = Uuid::new_v4();
    host_world.spawn(terrain_id, EntityKind::Terrain);
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
                length: 16.0,
                width: 16.0,
                height: 4.0,
                heights: vec![vec![0.0; 16]; 16],
                terrain_kind: TerrainKind::Hybrid,
                ..TerrainFields::default()
            }),
        })
        .await?;
    settle().await;

    // Late joiners reconcile through a full-state request.
    let mut participants = Vec::new();
    for index in 1..=args.participants {
        let world = MemoryWorld::new();
        let config = SyncConfig {
            offset: Vec3::new(f64::from(index) * 10.0, 0.0, 0.0),
            ..SyncConfig::default()
        };
        let controller = SessionController::new(
            Arc::new(broker.client()),
            Arc::new(world.clone()),
            config,
        );
        controller.connect(true).await?;
        let tag = format!("guest-{index}");
        controller.join_session(session_id, &tag).await?;
        let summary = controller.get_session_state().await?;
        info!(
            participant = %tag,
            clients = summary.participants.len(),
            entities = summary.entities.len(),
            "reconciled"
        );
        participants.push(Participant {
            controller,
            world,
            tag,
        });
    }

    // Mirror a couple of host-side mutations.
    replicator.set_position(mesh_id, Vec3::new(4.0, 2.0, 3.0)).await?;
    replicator
        .modify_terrain_entity(
            terrain_id,
            TerrainModification {
                operation: TerrainOperation::Build,
                position: Vec3::new(8.0, 0.0, 8.0),
                brush_type: TerrainBrush::Sphere,
                layer: 0,
                size: 2.0,
            },
        )
        .await?;
    settle().await;

    for participant in &participants {
        let mesh = participant.world.get(mesh_id);
        let position = mesh.as_ref().map(|entity| entity.position).unwrap_or_default();
        info!(
            participant = %participant.tag,
            entities = participant.world.count(),
            mesh_present = mesh.is_some(),
            mesh_x = position.x,
            "replica state"
        );
    }

    // Tear down politely.
    for participant in participants {
        participant.controller.exit_session().await?;
        participant.controller.disconnect().await?;
    }
    host.destroy_session().await?;
    settle().await;
    host.disconnect().await?;
    info!("sandbox run complete");
    Ok(())
}

/// Give the in-process pumps a moment to drain.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
