pub mod server;

pub use server::{
    BuildLimits, GameServer, GameSettings, Group, NewServer, Preset, ResourceTemplate, User,
};
