use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::{CaptchaProof, CaptchaVerifier};
use crate::node::client::ErrorCode;
use crate::node::{Node, NodeClient};
use crate::placement;
use crate::server::{GameServer, GameSettings, NewServer, Preset, ResourceTemplate};
use crate::store::{self, Records};

/// View name that opts an instance into the auxiliary settings record.
const SETTINGS_VIEW: &str = "minecraft_properties_viewer";

const SFTP_PASSWORD_LEN: usize = 15;

#[derive(Debug)]
pub enum Error {
    /// Name/ownership uniqueness violated.
    Conflict(&'static str),
    /// Unverified account, failed captcha, or preset outside the group
    /// allow-list.
    Permission(&'static str),
    /// Placement found no eligible node.
    NoCapacity,
    /// A remote call failed; carries the stable user-facing reason.
    Action(&'static str),
    /// The node rejected or never confirmed the allocation; the local
    /// record was rolled back.
    AllocationFailed,
    /// The compensating rollback itself failed. The orphaned local record
    /// remains for operator follow-up; this must never be swallowed.
    FallbackFailed(String),
    Store(store::Error),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Error::Conflict(msg) | Error::Permission(msg) | Error::Action(msg) => {
                write!(f, "{}", msg)
            }
            Error::NoCapacity => write!(f, "No available nodes for game."),
            Error::AllocationFailed => write!(f, "Failed to add server to selected node."),
            Error::FallbackFailed(detail) => {
                write!(f, "Allocation failed and rollback also failed: {}", detail)
            }
            Error::Store(e) => write!(f, "{}", e),
        }
    }
}

impl From<store::Error> for Error {
    fn from(e: store::Error) -> Self {
        Error::Store(e)
    }
}

type Result<T> = std::result::Result<T, Error>;

/// Orchestrates instance creation, removal and preset changes as multi-step
/// sequences spanning the record store and remote node calls.
pub struct Provisioner {
    store: Arc<dyn Records>,
    captcha: Arc<dyn CaptchaVerifier>,
    captcha_required: bool,
    threshold: f64,
    scheme: String,
}

impl Provisioner {
    pub fn new(
        store: Arc<dyn Records>,
        captcha: Arc<dyn CaptchaVerifier>,
        captcha_required: bool,
        threshold: f64,
        scheme: &str,
    ) -> Self {
        Provisioner {
            store,
            captcha,
            captcha_required,
            threshold,
            scheme: scheme.to_string(),
        }
    }

    pub(crate) fn client(&self, node: &Node) -> NodeClient {
        NodeClient::with_scheme(node, &self.scheme)
    }

    pub(crate) fn store(&self) -> &dyn Records {
        self.store.as_ref()
    }

    /// Provision a new instance end to end. Nothing is mutated until the
    /// uniqueness, verification and placement gates have all passed; after
    /// the local insert, an allocation failure rolls the record back.
    pub async fn add_server(
        &self,
        req: NewServer,
        captcha: Option<CaptchaProof>,
    ) -> Result<GameServer> {
        if let Some(proof) = &captcha {
            if self.captcha_required && !self.captcha.verify(proof).await {
                return Err(Error::Permission("Captcha is incorrect."));
            }
        }

        if self.store.find_server_by_name(&req.name).await?.is_some() {
            return Err(Error::Conflict("Name already assigned."));
        }
        if self.store.find_server_by_owner(req.owner).await?.is_some() {
            return Err(Error::Conflict("You already own a server."));
        }

        let (user, preset, nodes) = tokio::join!(
            self.store.get_user(req.owner),
            self.store.get_preset(req.preset),
            self.store.list_nodes(),
        );
        let (user, preset, nodes) = (user?, preset?, nodes?);

        if !user.verified {
            return Err(Error::Permission("You must first verify your account."));
        }
        let group = self.store.get_group(user.group).await?;
        if !group.presets_allowed.contains(&req.preset) {
            return Err(Error::Permission("You don't have permissions."));
        }

        let node = {
            let mut rng = rand::thread_rng();
            placement::select_node(&preset.game, &nodes, self.threshold, &mut rng)
                .map_err(|_| Error::NoCapacity)?
                .clone()
        };

        let server = GameServer {
            id: Uuid::new_v4(),
            owner: req.owner,
            sub_owners: Vec::new(),
            preset: req.preset,
            node: node.id,
            name: req.name,
            motd: req.motd,
            sftp_password: generate_password(SFTP_PASSWORD_LEN),
            port: 0,
            online: false,
            plugins: Vec::new(),
        };
        self.store.insert_server(server.clone()).await?;

        let template = ResourceTemplate::from_preset(server.id, &preset);
        let client = self.client(&node);
        let port = match client.allocate(&template, &server.sftp_password).await {
            Ok(port) => port,
            Err(e) => {
                error!(
                    "[PROVISION] Allocation on node {} failed: {}",
                    node.name, e
                );
                if let Err(rollback) = self.store.delete_server(server.id).await {
                    return Err(Error::FallbackFailed(rollback.to_string()));
                }
                return Err(Error::AllocationFailed);
            }
        };

        let mut server = server;
        server.port = port;
        self.store.update_server(server.clone()).await?;
        info!(
            "[PROVISION] Server {} allocated on node {} port {}",
            server.name, node.name, port
        );

        if preset.views.iter().any(|v| v == SETTINGS_VIEW) {
            self.store
                .insert_settings(GameSettings::defaults(server.id))
                .await?;
        }

        // The instance exists at this point; preinstalled plugins are best
        // effort and never roll provisioning back.
        for (plugin, reason) in install_defaults(&client, server.id, &preset).await {
            error!(
                "[PROVISION] Server plugin install failed: {} ({})",
                plugin, reason
            );
        }

        Ok(server)
    }

    /// Remove an instance, remote-first: the local record outlives a failed
    /// remote removal rather than the node keeping an allocation nothing
    /// points at.
    pub async fn remove_server(&self, server: &GameServer) -> Result<()> {
        let node = self.store.get_node(server.node).await?;
        if let Err(e) = self.client(&node).remove(server.id).await {
            return Err(match e.code() {
                ErrorCode::ServerLocked => Error::Action("Server is locked."),
                ErrorCode::ServerNotOff => Error::Action("Server is not off."),
                _ => Error::Action("Unknown error."),
            });
        }

        self.store.delete_server(server.id).await?;
        Ok(())
    }

    /// Switch an instance to another preset. The instance's preset field
    /// only moves once the node has accepted the new resource template.
    pub async fn change_preset(&self, server: &GameServer, new_preset: Uuid) -> Result<GameServer> {
        let (user, current, next) = tokio::join!(
            self.store.get_user(server.owner),
            self.store.get_preset(server.preset),
            self.store.get_preset(new_preset),
        );
        let (user, current, next) = (user?, current?, next?);

        if !current.allow_switching_to.contains(&new_preset) {
            return Err(Error::Permission("Preset not allowed."));
        }
        let group = self.store.get_group(user.group).await?;
        if !group.presets_allowed.contains(&new_preset) {
            return Err(Error::Permission("You don't have permissions."));
        }
        if new_preset == server.preset {
            return Err(Error::Conflict("This is already your preset."));
        }

        let node = self.store.get_node(server.node).await?;
        let template = ResourceTemplate::from_preset(server.id, &next);
        if let Err(e) = self.client(&node).edit(server.id, &template).await {
            return Err(match e.code() {
                ErrorCode::ServerLocked => Error::Action("Server is locked."),
                ErrorCode::ServerNotOff => Error::Action("Server is not off."),
                _ => Error::Action("Unknown error."),
            });
        }

        let mut updated = server.clone();
        updated.preset = new_preset;
        self.store.update_server(updated.clone()).await?;
        Ok(updated)
    }
}

/// Install every preset-specified default plugin, collecting individual
/// failures instead of aborting; provisioning has already succeeded when
/// this runs.
async fn install_defaults(
    client: &NodeClient,
    server: Uuid,
    preset: &Preset,
) -> Vec<(String, String)> {
    let attempts = preset.preinstalled_plugins.iter().map(|plugin| async move {
        match client.install_plugin(server, plugin).await {
            Ok(()) => None,
            Err(e) => Some((plugin.clone(), e.to_string())),
        }
    });

    futures::future::join_all(attempts)
        .await
        .into_iter()
        .flatten()
        .collect()
}

fn generate_password(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
