use std::fmt::{self, Display, Formatter};

use async_trait::async_trait;
use uuid::Uuid;

use crate::node::Node;
use crate::server::{GameServer, GameSettings, Group, Preset, User};

#[derive(Debug)]
pub enum Error {
    NotFound(&'static str),
    Backend(String),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Error::NotFound(what) => write!(f, "{} not found", what),
            Error::Backend(msg) => write!(f, "store error: {}", msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The record store collaborator. The orchestration layer only needs this
/// narrow contract; whatever database sits behind it is not its concern.
#[async_trait]
pub trait Records: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<Node>>;
    async fn get_node(&self, id: Uuid) -> Result<Node>;
    async fn insert_node(&self, node: Node) -> Result<()>;
    async fn update_node(&self, node: Node) -> Result<()>;
    async fn delete_node(&self, id: Uuid) -> Result<()>;

    async fn get_server(&self, id: Uuid) -> Result<GameServer>;
    async fn find_server_by_name(&self, name: &str) -> Result<Option<GameServer>>;
    async fn find_server_by_owner(&self, owner: Uuid) -> Result<Option<GameServer>>;
    async fn insert_server(&self, server: GameServer) -> Result<()>;
    async fn update_server(&self, server: GameServer) -> Result<()>;
    async fn delete_server(&self, id: Uuid) -> Result<()>;

    async fn get_user(&self, id: Uuid) -> Result<User>;
    async fn get_group(&self, id: Uuid) -> Result<Group>;
    async fn get_preset(&self, id: Uuid) -> Result<Preset>;

    async fn insert_settings(&self, settings: GameSettings) -> Result<()>;
}
