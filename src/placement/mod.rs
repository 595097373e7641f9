pub mod placement;

pub use placement::{select_node, PlacementError, DISK_THRESHOLD};
