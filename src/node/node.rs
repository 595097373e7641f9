use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A fleet member: one remote host running the agent that actually creates
/// and controls game-server processes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: Uuid,
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Shared secret presented as a bearer credential on every agent call.
    pub secret: String,
    /// Last successful poll result. `None` until the monitor has reached
    /// the node at least once — never polled is not the same as empty.
    pub status: Option<NodeStatus>,
    pub games: Vec<String>,
    pub plugins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub last_seen: DateTime<Utc>,
    pub cpu: f64,
    pub total_mem: u64,
    pub free_mem: u64,
    pub total_disk: u64,
    pub free_disk: u64,
}

impl Node {
    pub fn new(name: &str, host: &str, port: u16, secret: &str) -> Self {
        Node {
            id: Uuid::new_v4(),
            name: name.to_string(),
            host: host.to_string(),
            port,
            secret: secret.to_string(),
            status: None,
            games: Vec::new(),
            plugins: Vec::new(),
        }
    }

    pub fn supports(&self, game: &str) -> bool {
        self.games.iter().any(|g| g == game)
    }

    /// Disk utilization ratio, `None` if the node was never polled or the
    /// snapshot reports no disk at all.
    pub fn utilization(&self) -> Option<f64> {
        let status = self.status.as_ref()?;
        if status.total_disk == 0 {
            return None;
        }
        Some(1.0 - status.free_disk as f64 / status.total_disk as f64)
    }
}
