pub mod monitor;

pub use monitor::NodeMonitor;
