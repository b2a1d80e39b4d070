//! Topic grammar for the session bus. All topics are ASCII,
//! `/`-delimited, rooted at `vos/`. Session-level topics match exactly;
//! per-entity topics are matched structurally with the entity id extracted
//! positionally.

use uuid::Uuid;

use crate::entity::EntityKind;

pub const ROOT: &str = "vos";

/// Filter covering the session-discovery topic space.
pub const SESSION_DISCOVERY_FILTER: &str = "vos/session/#";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOp {
    Create,
    Destroy,
    Join,
    Exit,
    Heartbeat,
    GetState,
    New,
    Closed,
    State,
}

impl SessionOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOp::Create => "create",
            SessionOp::Destroy => "destroy",
            SessionOp::Join => "join",
            SessionOp::Exit => "exit",
            SessionOp::Heartbeat => "heartbeat",
            SessionOp::GetState => "getstate",
            SessionOp::New => "new",
            SessionOp::Closed => "closed",
            SessionOp::State => "state",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "create" => SessionOp::Create,
            "destroy" => SessionOp::Destroy,
            "join" => SessionOp::Join,
            "exit" => SessionOp::Exit,
            "heartbeat" => SessionOp::Heartbeat,
            "getstate" => SessionOp::GetState,
            "new" => SessionOp::New,
            "closed" => SessionOp::Closed,
            "state" => SessionOp::State,
            _ => return None,
        })
    }
}

/// Per-entity topic suffixes shared by the request and status trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityProperty {
    Remove,
    Delete,
    Position,
    Rotation,
    Scale,
    Size,
    TerrainMod,
    CanvasType,
    Highlight,
    Motion,
    Parent,
    PhysicalProperties,
    Visibility,
    InteractionState,
}

impl EntityProperty {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityProperty::Remove => "remove",
            EntityProperty::Delete => "delete",
            EntityProperty::Position => "position",
            EntityProperty::Rotation => "rotation",
            EntityProperty::Scale => "scale",
            EntityProperty::Size => "size",
            EntityProperty::TerrainMod => "terrain-mod",
            EntityProperty::CanvasType => "canvastype",
            EntityProperty::Highlight => "highlight",
            EntityProperty::Motion => "motion",
            EntityProperty::Parent => "parent",
            EntityProperty::PhysicalProperties => "physicalproperties",
            EntityProperty::Visibility => "visibility",
            EntityProperty::InteractionState => "interactionstate",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "remove" => EntityProperty::Remove,
            "delete" => EntityProperty::Delete,
            "position" => EntityProperty::Position,
            "rotation" => EntityProperty::Rotation,
            "scale" => EntityProperty::Scale,
            "size" => EntityProperty::Size,
            "terrain-mod" => EntityProperty::TerrainMod,
            "canvastype" => EntityProperty::CanvasType,
            "highlight" => EntityProperty::Highlight,
            "motion" => EntityProperty::Motion,
            "parent" => EntityProperty::Parent,
            "physicalproperties" => EntityProperty::PhysicalProperties,
            "visibility" => EntityProperty::Visibility,
            "interactionstate" => EntityProperty::InteractionState,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    NewClient,
    ClientLeft,
    CreateEntity(EntityKind),
    State,
    MessageNew,
    Entity { id: Uuid, prop: EntityProperty },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    CreateEntity(EntityKind),
    MessageCreate,
    Entity { id: Uuid, prop: EntityProperty },
}

/// A recognized inbound topic. Anything that does not parse is logged and
/// dropped by the caller; unparseable topics are never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Session(SessionOp),
    Status { session: Uuid, kind: StatusKind },
    Request { session: Uuid, kind: RequestKind },
}

impl Route {
    pub fn parse(topic: &str) -> Option<Route> {
        let mut parts = topic.split('/');
        if parts.next()? != ROOT {
            return None;
        }
        match parts.next()? {
            "session" => {
                let op = SessionOp::parse(parts.next()?)?;
                parts.next().is_none().then_some(Route::Session(op))
            }
            "status" => {
                let session = Uuid::parse_str(parts.next()?).ok()?;
                let kind = match parts.next()? {
                    "newclient" => StatusKind::NewClient,
                    "clientleft" => StatusKind::ClientLeft,
                    "state" => StatusKind::State,
                    "message" => match parts.next()? {
                        "new" => StatusKind::MessageNew,
                        _ => return None,
                    },
                    "entity" => {
                        let id = Uuid::parse_str(parts.next()?).ok()?;
                        let prop = EntityProperty::parse(parts.next()?)?;
                        StatusKind::Entity { id, prop }
                    }
                    other => StatusKind::CreateEntity(parse_create_segment(other)?),
                };
                parts.next().is_none().then_some(Route::Status { session, kind })
            }
            "request" => {
                let session = Uuid::parse_str(parts.next()?).ok()?;
                let kind = match parts.next()? {
                    "message" => match parts.next()? {
                        "create" => RequestKind::MessageCreate,
                        _ => return None,
                    },
                    "entity" => {
                        let id = Uuid::parse_str(parts.next()?).ok()?;
                        let prop = EntityProperty::parse(parts.next()?)?;
                        RequestKind::Entity { id, prop }
                    }
                    other => RequestKind::CreateEntity(parse_create_segment(other)?),
                };
                parts.next().is_none().then_some(Route::Request { session, kind })
            }
            _ => None,
        }
    }
}

fn parse_create_segment(segment: &str) -> Option<EntityKind> {
    let kind = segment.strip_prefix("create")?.strip_suffix("entity")?;
    EntityKind::parse(kind)
}

fn create_segment(kind: EntityKind) -> String {
    format!("create{}entity", kind.as_str())
}

pub fn session(op: SessionOp) -> String {
    format!("{ROOT}/session/{}", op.as_str())
}

/// Filter covering a session's entire status tree.
pub fn status_filter(session: Uuid) -> String {
    format!("{ROOT}/status/{session}/#")
}

pub fn status_new_client(session: Uuid) -> String {
    format!("{ROOT}/status/{session}/newclient")
}

pub fn status_client_left(session: Uuid) -> String {
    format!("{ROOT}/status/{session}/clientleft")
}

pub fn status_create(session: Uuid, kind: EntityKind) -> String {
    format!("{ROOT}/status/{session}/{}", create_segment(kind))
}

pub fn status_state(session: Uuid) -> String {
    format!("{ROOT}/status/{session}/state")
}

pub fn status_message(session: Uuid) -> String {
    format!("{ROOT}/status/{session}/message/new")
}

pub fn status_entity(session: Uuid, entity: Uuid, prop: EntityProperty) -> String {
    format!("{ROOT}/status/{session}/entity/{entity}/{}", prop.as_str())
}

pub fn request_create(session: Uuid, kind: EntityKind) -> String {
    format!("{ROOT}/request/{session}/{}", create_segment(kind))
}

pub fn request_message(session: Uuid) -> String {
    format!("{ROOT}/request/{session}/message/create")
}

pub fn request_entity(session: Uuid, entity: Uuid, prop: EntityProperty) -> String {
    format!("{ROOT}/request/{session}/entity/{entity}/{}", prop.as_str())
}
