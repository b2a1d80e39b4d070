//! Owns a set of independent session controllers, one per session id,
//! each with its own bus connection. Controllers share nothing but the
//! broker on the far side of the transport.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;
use uuid::Uuid;

use atrium_bus::BusClient;

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::session::SessionController;
use crate::world::WorldBridge;

type BusFactory = dyn Fn() -> Arc<dyn BusClient> + Send + Sync;

pub struct SyncManager {
    bus_factory: Box<BusFactory>,
    world: Arc<dyn WorldBridge>,
    config: SyncConfig,
    controllers: Mutex<HashMap<Uuid, Arc<SessionController>>>,
}

impl SyncManager {
    pub fn new(
        bus_factory: impl Fn() -> Arc<dyn BusClient> + Send + Sync + 'static,
        world: Arc<dyn WorldBridge>,
        config: SyncConfig,
    ) -> Self {
        Self {
            bus_factory: Box::new(bus_factory),
            world,
            config,
            controllers: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, session_id: Uuid) -> Option<Arc<SessionController>> {
        self.controllers.lock().get(&session_id).cloned()
    }

    pub fn session_ids(&self) -> Vec<Uuid> {
        self.controllers.lock().keys().copied().collect()
    }

    /// Mint a connected controller for the given session id, reusing an
    /// existing one when present.
    pub async fn open(
        &self,
        session_id: Uuid,
        auto_reconnect: bool,
    ) -> SyncResult<Arc<SessionController>> {
        if let Some(existing) = self.get(session_id) {
            return Ok(existing);
        }
        let controller = SessionController::new(
            (self.bus_factory)(),
            Arc::clone(&self.world),
            self.config.clone(),
        );
        controller.connect(auto_reconnect).await?;
        self.controllers
            .lock()
            .insert(session_id, Arc::clone(&controller));
        Ok(controller)
    }

    /// Open and join in one step.
    pub async fn join(
        &self,
        session_id: Uuid,
        client_tag: &str,
        auto_reconnect: bool,
    ) -> SyncResult<Arc<SessionController>> {
        let controller = self.open(session_id, auto_reconnect).await?;
        if controller.session_id() != Some(session_id) {
            controller.join_session(session_id, client_tag).await?;
        }
        Ok(controller)
    }

    /// Leave the session (when joined) and drop its controller.
    pub async fn close(&self, session_id: Uuid) -> SyncResult<()> {
        let Some(controller) = self.controllers.lock().remove(&session_id) else {
            return Ok(());
        };
        if controller.session_id().is_some() {
            controller.exit_session().await?;
        }
        controller.disconnect().await?;
        info!(target: "atrium::session", %session_id, "session closed");
        Ok(())
    }

    pub async fn shutdown(&self) -> SyncResult<()> {
        for session_id in self.session_ids() {
            self.close(session_id).await?;
        }
        Ok(())
    }
}
