use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::node::{Node, NodeClient, NodeStatus};
use crate::store::Records;

/// Recurring background task that refreshes every node's liveness, capacity
/// and inventory snapshot. The monitor is the only writer of those fields;
/// placement just reads whatever the last tick left behind.
pub struct NodeMonitor {
    inner: Arc<Inner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    store: Arc<dyn Records>,
    period: Duration,
    scheme: String,
}

impl NodeMonitor {
    pub fn new(store: Arc<dyn Records>, period: Duration, scheme: &str) -> Self {
        NodeMonitor {
            inner: Arc::new(Inner {
                store,
                period,
                scheme: scheme.to_string(),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Schedule periodic checks. No-op if already running.
    pub async fn start(&self) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return;
        }

        info!("[MONITOR] Polling nodes every {:?}", self.inner.period);
        let inner = self.inner.clone();
        *handle = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(inner.period).await;
                inner.check().await;
            }
        }));
    }

    /// Cancel future ticks. No-op if already stopped; an in-flight tick's
    /// per-node calls are not interrupted mid-request.
    pub async fn stop(&self) {
        let mut handle = self.handle.lock().await;
        if let Some(handle) = handle.take() {
            handle.abort();
            info!("[MONITOR] Stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// One full refresh pass over every known node. Public so tests (and
    /// admin tooling) can drive ticks without waiting on the timer.
    pub async fn check(&self) {
        self.inner.check().await;
    }
}

impl Inner {
    async fn check(&self) {
        debug!("[MONITOR] Updating nodes");
        let nodes = match self.store.list_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                error!("[MONITOR] Could not load nodes: {}", e);
                return;
            }
        };

        // One concurrent refresh per node; an unreachable node must never
        // delay or abort the others. The tick resolves only once every
        // attempt has.
        let updates = nodes.into_iter().map(|node| self.refresh(node));
        futures::future::join_all(updates).await;
    }

    async fn refresh(&self, mut node: Node) {
        let client = NodeClient::with_scheme(&node, &self.scheme);

        let query = match client.query().await {
            Ok(query) => query,
            Err(e) => {
                error!("[MONITOR] Failed to ping node {}: {}", node.name, e);
                return;
            }
        };
        let plugins = match client.list_plugins().await {
            Ok(plugins) => plugins,
            Err(e) => {
                error!("[MONITOR] Failed to list plugins on {}: {}", node.name, e);
                return;
            }
        };
        let games = match client.list_games().await {
            Ok(games) => games,
            Err(e) => {
                error!("[MONITOR] Failed to list games on {}: {}", node.name, e);
                return;
            }
        };

        node.status = Some(NodeStatus {
            last_seen: Utc::now(),
            cpu: query.cpu,
            total_mem: query.totalmem,
            free_mem: query.freemem,
            total_disk: query.totaldisk,
            free_disk: query.freedisk,
        });
        node.plugins = plugins;
        node.games = games;

        let name = node.name.clone();
        if let Err(e) = self.store.update_node(node).await {
            error!("[MONITOR] Failed to save node update for {}: {}", name, e);
            return;
        }
        debug!("[MONITOR] Updated info for node {}", name);
    }
}
