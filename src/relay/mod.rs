pub mod api;
pub mod relay;

pub use api::{setup, Api};
pub use relay::{ConsoleParams, ConsoleRelay};
