use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::records::{Error, Records, Result};
use crate::node::Node;
use crate::server::{GameServer, GameSettings, Group, Preset, User};

/// In-memory record store backing development and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    // Warning: if more than one of these needs to be locked at the same
    // time, lock them exactly in the order they appear here to avoid
    // deadlocks. Today every method locks at most one.
    nodes: Mutex<HashMap<Uuid, Node>>,
    servers: Mutex<HashMap<Uuid, GameServer>>,
    users: Mutex<HashMap<Uuid, User>>,
    groups: Mutex<HashMap<Uuid, Group>>,
    presets: Mutex<HashMap<Uuid, Preset>>,
    settings: Mutex<HashMap<Uuid, GameSettings>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub async fn add_user(&self, user: User) {
        self.users.lock().await.insert(user.id, user);
    }

    pub async fn add_group(&self, group: Group) {
        self.groups.lock().await.insert(group.id, group);
    }

    pub async fn add_preset(&self, preset: Preset) {
        self.presets.lock().await.insert(preset.id, preset);
    }

    pub async fn settings_for(&self, server: Uuid) -> Option<GameSettings> {
        self.settings.lock().await.get(&server).cloned()
    }
}

#[async_trait]
impl Records for MemoryStore {
    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let nodes = self.nodes.lock().await;
        Ok(nodes.values().cloned().collect())
    }

    async fn get_node(&self, id: Uuid) -> Result<Node> {
        let nodes = self.nodes.lock().await;
        nodes.get(&id).cloned().ok_or(Error::NotFound("node"))
    }

    async fn insert_node(&self, node: Node) -> Result<()> {
        self.nodes.lock().await.insert(node.id, node);
        Ok(())
    }

    async fn update_node(&self, node: Node) -> Result<()> {
        let mut nodes = self.nodes.lock().await;
        if !nodes.contains_key(&node.id) {
            return Err(Error::NotFound("node"));
        }
        nodes.insert(node.id, node);
        Ok(())
    }

    async fn delete_node(&self, id: Uuid) -> Result<()> {
        // Deleting a node does not cascade to servers assigned to it;
        // orphaned references are tolerated at this layer.
        self.nodes.lock().await.remove(&id);
        Ok(())
    }

    async fn get_server(&self, id: Uuid) -> Result<GameServer> {
        let servers = self.servers.lock().await;
        servers.get(&id).cloned().ok_or(Error::NotFound("server"))
    }

    async fn find_server_by_name(&self, name: &str) -> Result<Option<GameServer>> {
        let servers = self.servers.lock().await;
        Ok(servers.values().find(|s| s.name == name).cloned())
    }

    async fn find_server_by_owner(&self, owner: Uuid) -> Result<Option<GameServer>> {
        let servers = self.servers.lock().await;
        Ok(servers.values().find(|s| s.owner == owner).cloned())
    }

    async fn insert_server(&self, server: GameServer) -> Result<()> {
        self.servers.lock().await.insert(server.id, server);
        Ok(())
    }

    async fn update_server(&self, server: GameServer) -> Result<()> {
        let mut servers = self.servers.lock().await;
        if !servers.contains_key(&server.id) {
            return Err(Error::NotFound("server"));
        }
        servers.insert(server.id, server);
        Ok(())
    }

    async fn delete_server(&self, id: Uuid) -> Result<()> {
        self.servers.lock().await.remove(&id);
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<User> {
        let users = self.users.lock().await;
        users.get(&id).cloned().ok_or(Error::NotFound("user"))
    }

    async fn get_group(&self, id: Uuid) -> Result<Group> {
        let groups = self.groups.lock().await;
        groups.get(&id).cloned().ok_or(Error::NotFound("group"))
    }

    async fn get_preset(&self, id: Uuid) -> Result<Preset> {
        let presets = self.presets.lock().await;
        presets.get(&id).cloned().ok_or(Error::NotFound("preset"))
    }

    async fn insert_settings(&self, settings: GameSettings) -> Result<()> {
        self.settings.lock().await.insert(settings.server, settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(owner: Uuid, name: &str) -> GameServer {
        GameServer {
            id: Uuid::new_v4(),
            owner,
            sub_owners: Vec::new(),
            preset: Uuid::new_v4(),
            node: Uuid::new_v4(),
            name: name.to_string(),
            motd: "".to_string(),
            sftp_password: "".to_string(),
            port: 0,
            online: false,
            plugins: Vec::new(),
        }
    }

    #[tokio::test]
    async fn finds_servers_by_name_and_owner() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        store.insert_server(server(owner, "alpha")).await.unwrap();

        assert!(store.find_server_by_name("alpha").await.unwrap().is_some());
        assert!(store.find_server_by_name("beta").await.unwrap().is_none());
        assert!(store.find_server_by_owner(owner).await.unwrap().is_some());
        assert!(store
            .find_server_by_owner(Uuid::new_v4())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn update_of_missing_node_is_not_found() {
        let store = MemoryStore::new();
        let node = Node::new("ghost", "10.0.0.9", 8080, "secret");
        assert!(matches!(
            store.update_node(node).await,
            Err(Error::NotFound("node"))
        ));
    }

    #[tokio::test]
    async fn node_delete_does_not_cascade_to_servers() {
        let store = MemoryStore::new();
        let node = Node::new("n1", "10.0.0.1", 8080, "secret");
        let node_id = node.id;
        store.insert_node(node).await.unwrap();

        let mut orphan = server(Uuid::new_v4(), "orphan");
        orphan.node = node_id;
        let orphan_id = orphan.id;
        store.insert_server(orphan).await.unwrap();

        store.delete_node(node_id).await.unwrap();
        let kept = store.get_server(orphan_id).await.unwrap();
        assert_eq!(kept.node, node_id);
    }
}
