use serde_json::Value;
use uuid::Uuid;

use super::provision::{Error, Provisioner};
use crate::node::client::ErrorCode;
use crate::node::PowerAction;
use crate::server::GameServer;

type Result<T> = std::result::Result<T, Error>;

/// Single-call instance operations: each one resolves the owning node,
/// issues one RPC and maps the classified code to its user-facing reason.
impl Provisioner {
    pub async fn set_power(&self, server: &GameServer, action: PowerAction) -> Result<()> {
        let node = self.store().get_node(server.node).await?;
        self.client(&node)
            .power(server.id, action)
            .await
            .map_err(|e| match e.code() {
                ErrorCode::ServerLocked => Error::Action("Server is locked."),
                ErrorCode::ServerNotOff => Error::Action("Server is not off."),
                ErrorCode::ServerNotRunning => Error::Action("Server is not running."),
                ErrorCode::ServerNotStopped => Error::Action("Server is not stopped."),
                ErrorCode::ReinstallInstead => Error::Action("Reinstall your server."),
                _ => Error::Action("Unknown error."),
            })
    }

    pub async fn install(&self, server: &GameServer) -> Result<()> {
        let node = self.store().get_node(server.node).await?;
        self.client(&node)
            .install(server.id)
            .await
            .map_err(|e| match e.code() {
                ErrorCode::ServerLocked => Error::Action("Server is locked."),
                ErrorCode::ReinstallInstead => Error::Action("Reinstall your server instead."),
                ErrorCode::ServerNotOff => Error::Action("Server is not off."),
                _ => Error::Action("Unknown error."),
            })
    }

    pub async fn reinstall(&self, server: &GameServer) -> Result<()> {
        let node = self.store().get_node(server.node).await?;
        self.client(&node)
            .reinstall(server.id)
            .await
            .map_err(|e| match e.code() {
                ErrorCode::ServerLocked => Error::Action("Server is locked."),
                ErrorCode::InstallInstead => Error::Action("Install your server instead."),
                ErrorCode::ServerNotOff => Error::Action("Server is not off."),
                _ => Error::Action("Unknown error."),
            })
    }

    pub async fn execute_command(&self, server: &GameServer, command: &str) -> Result<()> {
        let node = self.store().get_node(server.node).await?;
        self.client(&node)
            .execute(server.id, command)
            .await
            .map_err(|e| match e.code() {
                ErrorCode::ServerNotOff => Error::Action("Server is not off."),
                _ => Error::Action("Unknown error."),
            })
    }

    /// Install a plugin on the node, then record it locally. The local
    /// plugin list only moves after the node has confirmed.
    pub async fn install_plugin(&self, server: &GameServer, plugin: &str) -> Result<GameServer> {
        let node = self.store().get_node(server.node).await?;
        self.client(&node)
            .install_plugin(server.id, plugin)
            .await
            .map_err(|e| match e.code() {
                ErrorCode::PluginInstalled => Error::Action("Plugin already installed."),
                ErrorCode::InvalidPlugin => Error::Action("Plugin does not exist."),
                ErrorCode::PluginNotSupported => Error::Action("Plugin not supported."),
                ErrorCode::ServerNotOff => Error::Action("Server is not off."),
                ErrorCode::ServerLocked => Error::Action("Server is locked."),
                _ => Error::Action("Unknown error."),
            })?;

        let mut updated = server.clone();
        updated.plugins.push(plugin.to_string());
        self.store().update_server(updated.clone()).await?;
        Ok(updated)
    }

    pub async fn remove_plugin(&self, server: &GameServer, plugin: &str) -> Result<GameServer> {
        let node = self.store().get_node(server.node).await?;
        self.client(&node)
            .remove_plugin(server.id, plugin)
            .await
            .map_err(|e| match e.code() {
                ErrorCode::PluginNotInstalled => Error::Action("Plugin is not installed."),
                ErrorCode::ServerNotOff => Error::Action("Server is not off."),
                ErrorCode::ServerLocked => Error::Action("Server is locked."),
                _ => Error::Action("Unknown error."),
            })?;

        let mut updated = server.clone();
        updated.plugins.retain(|p| p != plugin);
        self.store().update_server(updated.clone()).await?;
        Ok(updated)
    }

    /// Grant a user operator access. Local-only mutation: the owner is
    /// never a valid sub-owner and duplicates are rejected.
    pub async fn add_sub_owner(&self, server: &GameServer, user: Uuid) -> Result<GameServer> {
        if user == server.owner {
            return Err(Error::Conflict("The server owner is not a valid sub-owner."));
        }
        if server.sub_owners.contains(&user) {
            return Err(Error::Conflict("User is already a sub-owner."));
        }

        let mut updated = server.clone();
        updated.sub_owners.push(user);
        self.store().update_server(updated.clone()).await?;
        Ok(updated)
    }

    pub async fn remove_sub_owner(&self, server: &GameServer, user: Uuid) -> Result<GameServer> {
        let mut updated = server.clone();
        updated.sub_owners.retain(|u| *u != user);
        self.store().update_server(updated.clone()).await?;
        Ok(updated)
    }

    pub async fn check_path(&self, server: &GameServer, path: &str) -> Result<bool> {
        let (node, path) = self.screen_path(server, path).await?;
        self.client(&node)
            .check_path_allowed(server.id, &path)
            .await
            .map_err(|e| fs_reason(e.code()))
    }

    pub async fn file_contents(&self, server: &GameServer, path: &str) -> Result<String> {
        let (node, path) = self.screen_path(server, path).await?;
        self.client(&node)
            .file_contents(server.id, &path)
            .await
            .map_err(|e| fs_reason(e.code()))
    }

    pub async fn write_file(&self, server: &GameServer, path: &str, contents: &str) -> Result<()> {
        let (node, path) = self.screen_path(server, path).await?;
        self.client(&node)
            .write_file(server.id, &path, contents)
            .await
            .map_err(|e| fs_reason(e.code()))
    }

    pub async fn remove_file(&self, server: &GameServer, path: &str) -> Result<()> {
        let (node, path) = self.screen_path(server, path).await?;
        self.client(&node)
            .remove_file(server.id, &path)
            .await
            .map_err(|e| fs_reason(e.code()))
    }

    pub async fn remove_folder(&self, server: &GameServer, path: &str) -> Result<()> {
        let (node, path) = self.screen_path(server, path).await?;
        self.client(&node)
            .remove_folder(server.id, &path)
            .await
            .map_err(|e| fs_reason(e.code()))
    }

    pub async fn list_dir(&self, server: &GameServer, path: &str) -> Result<Value> {
        let (node, path) = self.screen_path(server, path).await?;
        self.client(&node)
            .list_dir(server.id, &path)
            .await
            .map_err(|e| fs_reason(e.code()))
    }

    /// Normalize a user-supplied path and reject preset-restricted targets
    /// before anything reaches the node.
    async fn screen_path(
        &self,
        server: &GameServer,
        path: &str,
    ) -> Result<(crate::node::Node, String)> {
        let normalized = normalize_path(path);
        let preset = self.store().get_preset(server.preset).await?;
        if preset.fs_rules.iter().any(|rule| rule == &normalized) {
            return Err(Error::Action("Restricted file target."));
        }
        let node = self.store().get_node(server.node).await?;
        Ok((node, normalized))
    }
}

fn fs_reason(code: ErrorCode) -> Error {
    match code {
        ErrorCode::ServerLocked => Error::Action("Server is locked."),
        ErrorCode::FileNotFound => Error::Action("File not found."),
        _ => Error::Action("Unknown error."),
    }
}

/// Collapse `.`/`..` segments and slash runs; the result always starts with
/// a slash and never ends with one (except the root itself).
fn normalize_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::extract::Form;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    use crate::auth::FixedCaptcha;
    use crate::node::Node;
    use crate::server::{BuildLimits, Preset};
    use crate::store::{MemoryStore, Records};

    #[test]
    fn normalize_path_handles_dots_and_slashes() {
        assert_eq!(normalize_path("config/server.properties"), "/config/server.properties");
        assert_eq!(normalize_path("/config/"), "/config");
        assert_eq!(normalize_path("//a//b"), "/a/b");
        assert_eq!(normalize_path("a/./b"), "/a/b");
        assert_eq!(normalize_path("a/../b"), "/b");
        assert_eq!(normalize_path("../../etc/passwd"), "/etc/passwd");
        assert_eq!(normalize_path("/"), "/");
    }

    async fn serve(router: Router) -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        port
    }

    async fn fixture(port: u16, fs_rules: Vec<String>) -> (Arc<MemoryStore>, GameServer) {
        let store = Arc::new(MemoryStore::new());
        let node = Node::new("n1", "127.0.0.1", port, "s");
        let node_id = node.id;
        store.insert_node(node).await.unwrap();

        let preset = Preset {
            id: Uuid::new_v4(),
            name: "basic".to_string(),
            game: "mc".to_string(),
            build: BuildLimits { mem: 1024, io: 500, cpu: 100 },
            max_players: 20,
            views: Vec::new(),
            fs_rules,
            preinstalled_plugins: Vec::new(),
            allow_switching_to: Vec::new(),
        };
        let preset_id = preset.id;
        store.add_preset(preset).await;

        let server = GameServer {
            id: Uuid::new_v4(),
            owner: Uuid::new_v4(),
            sub_owners: Vec::new(),
            preset: preset_id,
            node: node_id,
            name: "lobby".to_string(),
            motd: "".to_string(),
            sftp_password: "".to_string(),
            port: 25565,
            online: false,
            plugins: Vec::new(),
        };
        store.insert_server(server.clone()).await.unwrap();
        (store, server)
    }

    fn provisioner(store: Arc<MemoryStore>) -> Provisioner {
        Provisioner::new(store, Arc::new(FixedCaptcha(true)), false, 0.9, "http")
    }

    #[tokio::test]
    async fn restricted_targets_never_reach_the_node() {
        // Port 1 is not listening: any RPC attempt would error as
        // unreachable, so the restricted answer proves local screening.
        let (store, server) = fixture(1, vec!["/server.jar".to_string()]).await;
        let provisioner = provisioner(store);

        let err = provisioner
            .file_contents(&server, "server.jar/")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Action("Restricted file target.")));
    }

    #[tokio::test]
    async fn power_codes_map_to_stable_reasons() {
        let router = Router::new().route(
            "/server/{id}/power/{action}",
            get(|| async {
                (
                    StatusCode::CONFLICT,
                    Json(json!({"msg": "SERVER_NOT_RUNNING"})),
                )
            }),
        );
        let port = serve(router).await;
        let (store, server) = fixture(port, Vec::new()).await;
        let provisioner = provisioner(store);

        let err = provisioner
            .set_power(&server, PowerAction::Off)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Action("Server is not running.")));
    }

    #[tokio::test]
    async fn install_plugin_persists_only_after_the_node_confirms() {
        let router = Router::new().route(
            "/server/{id}/installPlugin",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                if form["plugin"] == "worldedit" {
                    (StatusCode::OK, Json(json!({})))
                } else {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({"msg": "INVALID_PLUGIN"})),
                    )
                }
            }),
        );
        let port = serve(router).await;
        let (store, server) = fixture(port, Vec::new()).await;
        let provisioner = provisioner(store.clone());

        let err = provisioner
            .install_plugin(&server, "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Action("Plugin does not exist.")));
        assert!(store.get_server(server.id).await.unwrap().plugins.is_empty());

        let updated = provisioner
            .install_plugin(&server, "worldedit")
            .await
            .unwrap();
        assert_eq!(updated.plugins, vec!["worldedit"]);
        assert_eq!(
            store.get_server(server.id).await.unwrap().plugins,
            vec!["worldedit"]
        );
    }

    #[tokio::test]
    async fn remove_plugin_drops_the_local_entry() {
        let router = Router::new().route(
            "/server/{id}/removePlugin",
            post(|| async { Json(json!({})) }),
        );
        let port = serve(router).await;
        let (store, mut server) = fixture(port, Vec::new()).await;
        server.plugins = vec!["worldedit".to_string()];
        store.update_server(server.clone()).await.unwrap();

        let provisioner = provisioner(store.clone());
        let updated = provisioner
            .remove_plugin(&server, "worldedit")
            .await
            .unwrap();
        assert!(updated.plugins.is_empty());
    }

    #[tokio::test]
    async fn sub_owner_rules() {
        let (store, server) = fixture(1, Vec::new()).await;
        let provisioner = provisioner(store.clone());

        let err = provisioner
            .add_sub_owner(&server, server.owner)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Conflict("The server owner is not a valid sub-owner.")
        ));

        let friend = Uuid::new_v4();
        let updated = provisioner.add_sub_owner(&server, friend).await.unwrap();
        assert_eq!(updated.sub_owners, vec![friend]);

        let err = provisioner
            .add_sub_owner(&updated, friend)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict("User is already a sub-owner.")));

        let updated = provisioner.remove_sub_owner(&updated, friend).await.unwrap();
        assert!(updated.sub_owners.is_empty());
    }
}
