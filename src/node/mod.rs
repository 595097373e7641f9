pub mod client;
pub mod node;

pub use client::{ErrorCode, NodeClient, PowerAction};
pub use node::{Node, NodeStatus};
