pub mod actions;
pub mod provision;

pub use provision::{Error, Provisioner};
