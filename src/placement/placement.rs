use std::fmt::{self, Display, Formatter};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::node::Node;

/// Disk utilization at or above which a node stops accepting placements.
pub const DISK_THRESHOLD: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementError {
    NoCapacity,
}

impl Display for PlacementError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            PlacementError::NoCapacity => write!(f, "No available nodes for game."),
        }
    }
}

/// Pick a node for a new instance of `game`.
///
/// Randomized-greedy: filter to nodes advertising the game, shuffle them
/// uniformly to spread load across ties, and take the first one strictly
/// under the utilization threshold. Nodes that were never polled have no
/// snapshot and are skipped — they are neither full nor empty yet.
///
/// The snapshot may be stale; nothing is reserved here, so two concurrent
/// placements can both pass the threshold against the same numbers. That is
/// the documented behavior of the heuristic, not a race to fix.
pub fn select_node<'a, R: Rng>(
    game: &str,
    nodes: &'a [Node],
    threshold: f64,
    rng: &mut R,
) -> Result<&'a Node, PlacementError> {
    let mut contenders: Vec<&Node> = nodes.iter().filter(|n| n.supports(game)).collect();
    contenders.shuffle(rng);

    contenders
        .into_iter()
        .find(|node| matches!(node.utilization(), Some(util) if util < threshold))
        .ok_or(PlacementError::NoCapacity)
}
