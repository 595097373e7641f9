use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One hosted game server, owned by a user and assigned to exactly one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameServer {
    pub id: Uuid,
    pub owner: Uuid,
    /// Never contains duplicates and never contains the owner itself.
    pub sub_owners: Vec<Uuid>,
    pub preset: Uuid,
    pub node: Uuid,
    /// Globally unique at creation time.
    pub name: String,
    pub motd: String,
    pub sftp_password: String,
    /// 0 until the node confirms allocation.
    pub port: u16,
    pub online: bool,
    pub plugins: Vec<String>,
}

impl GameServer {
    /// Whether a principal may operate this server (owner or sub-owner).
    pub fn is_operator(&self, user: Uuid) -> bool {
        self.owner == user || self.sub_owners.contains(&user)
    }
}

/// Request to provision a new instance.
#[derive(Debug, Clone, Deserialize)]
pub struct NewServer {
    pub owner: Uuid,
    pub preset: Uuid,
    pub name: String,
    pub motd: String,
}

/// A named resource/feature template assignable to an instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preset {
    pub id: Uuid,
    pub name: String,
    pub game: String,
    pub build: BuildLimits,
    pub max_players: u32,
    /// Feature views enabled for instances of this preset, e.g.
    /// "minecraft_properties_viewer".
    pub views: Vec<String>,
    /// Paths an instance's users may never touch through the filesystem ops.
    pub fs_rules: Vec<String>,
    pub preinstalled_plugins: Vec<String>,
    pub allow_switching_to: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildLimits {
    pub mem: u32,
    pub io: u32,
    pub cpu: u32,
}

/// The config payload posted to a node when allocating or editing an
/// instance. Port is a -1 sentinel on allocation; the node picks the real
/// one and reports it back.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceTemplate {
    pub id: Uuid,
    pub game: String,
    pub port: i32,
    pub build: BuildLimits,
    pub players: u32,
}

impl ResourceTemplate {
    pub fn from_preset(server: Uuid, preset: &Preset) -> Self {
        ResourceTemplate {
            id: server,
            game: preset.game.clone(),
            port: -1,
            build: preset.build.clone(),
            players: preset.max_players,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub verified: bool,
    pub group: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub is_admin: bool,
    pub presets_allowed: Vec<Uuid>,
}

/// Auxiliary per-instance settings record, created at provisioning time for
/// presets that enable the settings view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSettings {
    pub server: Uuid,
    pub spawn_protection: u32,
    pub allow_nether: bool,
    pub gamemode: u32,
    pub difficulty: u32,
    pub spawn_monsters: bool,
    pub pvp: bool,
    pub hardcore: bool,
    pub allow_flight: bool,
    pub resource_pack: String,
    pub whitelist: bool,
}

impl GameSettings {
    pub fn defaults(server: Uuid) -> Self {
        GameSettings {
            server,
            spawn_protection: 16,
            allow_nether: true,
            gamemode: 0,
            difficulty: 1,
            spawn_monsters: true,
            pvp: true,
            hardcore: false,
            allow_flight: false,
            resource_pack: "".to_string(),
            whitelist: false,
        }
    }
}
