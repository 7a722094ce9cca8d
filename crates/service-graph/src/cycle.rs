//! Depth-first cycle search over the node arena.

use crate::coordinated::NodeId;
use std::collections::HashMap;

/// Visit marker for a node; nodes missing from the map are unvisited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Visit {
    /// On the current DFS path
    Visiting,
    /// Fully explored, no cycle reachable through it
    Done,
}

/// Visit markers shared across searches started from different nodes
pub(crate) type Colors = HashMap<NodeId, Visit>;

/// Search for a cycle reachable from `start`
///
/// `colors` carries state between calls so that every node of a graph is
/// explored once even when the search is started from each node in turn.
/// Returns the nodes on the cycle in traversal order, beginning and ending
/// with the node where the cycle closes.
///
/// Uses an explicit stack, so deep graphs do not grow the call stack.
pub(crate) fn find_cycle<F>(
    start: NodeId,
    colors: &mut Colors,
    mut successors: F,
) -> Option<Vec<NodeId>>
where
    F: FnMut(NodeId) -> Vec<NodeId>,
{
    if colors.contains_key(&start) {
        return None;
    }

    colors.insert(start, Visit::Visiting);
    let mut stack = vec![(start, successors(start).into_iter())];

    loop {
        let (node, iter) = stack.last_mut()?;
        let node = *node;

        match iter.next() {
            Some(next) => match colors.get(&next) {
                Some(Visit::Visiting) => {
                    let closes_at = stack
                        .iter()
                        .position(|(visiting, _)| *visiting == next)
                        .unwrap_or(0);
                    let mut path: Vec<NodeId> =
                        stack[closes_at..].iter().map(|(id, _)| *id).collect();
                    path.push(next);
                    return Some(path);
                }
                Some(Visit::Done) => {}
                None => {
                    colors.insert(next, Visit::Visiting);
                    stack.push((next, successors(next).into_iter()));
                }
            },
            None => {
                colors.insert(node, Visit::Done);
                stack.pop();
            }
        }
    }
}
