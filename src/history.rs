use std::collections::VecDeque;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::graph::build_subgraphs;
use crate::id::Identifier;

/// Which way to walk the history graph.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Follow parent links only (towards generated objects).
    Parents,
    /// Follow child links only (towards reconstructed objects).
    Children,
    /// Follow both, treating the graph as undirected.
    Undirected,
}

/// One node of the provenance graph: an identifier plus the identifiers of
/// its direct parents and children. Links are relational only; the node does
/// not own the objects it refers to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryNode {
    /// The object this node stands for.
    pub uid: Identifier,
    /// Objects this one was derived from.
    pub parents: IndexSet<Identifier>,
    /// Objects derived from this one.
    pub children: IndexSet<Identifier>,
}

impl HistoryNode {
    fn new(uid: Identifier) -> Self {
        Self {
            uid,
            parents: IndexSet::new(),
            children: IndexSet::new(),
        }
    }
}

/// The per-event provenance DAG.
///
/// Nodes are stored in an arena keyed by [`Identifier`]; edges are recorded
/// on both endpoints. The graph is append-only during one event and rebuilt
/// from scratch at the next. Directed cycles are never created by the
/// simulation or reconstruction (children are always minted after their
/// parents), but the undirected view may contain cycles, so traversals are
/// guarded by a visited set.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct History {
    nodes: IndexMap<Identifier, HistoryNode>,
}

impl History {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `child` was derived from `parent`, creating nodes on
    /// demand. Existing links are never removed.
    pub fn add_child(&mut self, parent: Identifier, child: Identifier) {
        self.nodes
            .entry(parent)
            .or_insert_with(|| HistoryNode::new(parent))
            .children
            .insert(child);
        self.nodes
            .entry(child)
            .or_insert_with(|| HistoryNode::new(child))
            .parents
            .insert(parent);
    }

    /// Look up a node.
    pub fn node(&self, uid: Identifier) -> Option<&HistoryNode> {
        self.nodes.get(&uid)
    }

    /// Whether an identifier has been recorded.
    pub fn contains(&self, uid: Identifier) -> bool {
        self.nodes.contains_key(&uid)
    }

    /// Number of recorded nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All recorded identifiers in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = Identifier> + '_ {
        self.nodes.keys().copied()
    }

    /// Breadth-first traversal from `start` in the given direction. The
    /// start node is included; every reachable node is visited exactly once.
    pub fn breadth_first(&self, start: Identifier, direction: Direction) -> Vec<Identifier> {
        let mut visited = IndexSet::new();
        let mut queue = VecDeque::new();
        if !self.nodes.contains_key(&start) {
            return Vec::new();
        }
        visited.insert(start);
        queue.push_back(start);
        while let Some(uid) = queue.pop_front() {
            let node = &self.nodes[&uid];
            let neighbours = match direction {
                Direction::Parents => node.parents.iter(),
                Direction::Children => node.children.iter(),
                Direction::Undirected => node.parents.iter(),
            };
            for &next in neighbours {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
            if direction == Direction::Undirected {
                for &next in &node.children {
                    if visited.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }
        visited.into_iter().collect()
    }

    /// Connected components of the undirected view, each sorted by
    /// identifier.
    pub fn connected_components(&self) -> Vec<Vec<Identifier>> {
        let ids: Vec<Identifier> = self.nodes.keys().copied().collect();
        let links: Vec<(Identifier, Identifier)> = self
            .nodes
            .values()
            .flat_map(|node| node.children.iter().map(move |&c| (node.uid, c)))
            .collect();
        build_subgraphs(&ids, &links)
    }

    /// Check for a directed cycle via iterative depth-first search with a
    /// recursion stack. Returns `true` if any node is reachable from itself
    /// through child links.
    pub fn has_directed_cycle(&self) -> bool {
        #[derive(Copy, Clone, PartialEq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }
        let mut marks: IndexMap<Identifier, Mark> =
            self.nodes.keys().map(|&k| (k, Mark::Unvisited)).collect();
        for &root in self.nodes.keys() {
            if marks[&root] != Mark::Unvisited {
                continue;
            }
            // stack of (node, next-child cursor)
            let mut stack: Vec<(Identifier, usize)> = vec![(root, 0)];
            marks[&root] = Mark::InProgress;
            while let Some(&mut (uid, cursor)) = stack.last_mut() {
                let children = &self.nodes[&uid].children;
                if let Some(&child) = children.get_index(cursor) {
                    if let Some(frame) = stack.last_mut() {
                        frame.1 += 1;
                    }
                    match marks[&child] {
                        Mark::InProgress => return true,
                        Mark::Unvisited => {
                            marks[&child] = Mark::InProgress;
                            stack.push((child, 0));
                        }
                        Mark::Done => {}
                    }
                } else {
                    marks[&uid] = Mark::Done;
                    stack.pop();
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{IdAllocator, IdKind, SubKind};

    fn ids(n: usize) -> Vec<Identifier> {
        let mut alloc = IdAllocator::new();
        (0..n)
            .map(|i| alloc.make(IdKind::Particle, SubKind::True, i as f64))
            .collect()
    }

    #[test]
    fn links_are_recorded_on_both_ends() {
        let v = ids(2);
        let mut history = History::new();
        history.add_child(v[0], v[1]);
        assert!(history.node(v[0]).unwrap().children.contains(&v[1]));
        assert!(history.node(v[1]).unwrap().parents.contains(&v[0]));
        // re-linking is a no-op
        history.add_child(v[0], v[1]);
        assert_eq!(history.node(v[0]).unwrap().children.len(), 1);
    }

    #[test]
    fn breadth_first_directions() {
        // 0 -> 1 -> 3, 0 -> 2
        let v = ids(4);
        let mut history = History::new();
        history.add_child(v[0], v[1]);
        history.add_child(v[0], v[2]);
        history.add_child(v[1], v[3]);
        let down = history.breadth_first(v[0], Direction::Children);
        assert_eq!(down.len(), 4);
        let up = history.breadth_first(v[3], Direction::Parents);
        assert_eq!(up, vec![v[3], v[1], v[0]]);
        let all = history.breadth_first(v[2], Direction::Undirected);
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn undirected_cycle_terminates() {
        // diamond: 0 -> 1, 0 -> 2, 1 -> 3, 2 -> 3; undirected view has a cycle
        let v = ids(4);
        let mut history = History::new();
        history.add_child(v[0], v[1]);
        history.add_child(v[0], v[2]);
        history.add_child(v[1], v[3]);
        history.add_child(v[2], v[3]);
        let all = history.breadth_first(v[0], Direction::Undirected);
        assert_eq!(all.len(), 4);
        assert!(!history.has_directed_cycle());
    }

    #[test]
    fn directed_cycle_detection() {
        let v = ids(3);
        let mut history = History::new();
        history.add_child(v[0], v[1]);
        history.add_child(v[1], v[2]);
        assert!(!history.has_directed_cycle());
        history.add_child(v[2], v[0]);
        assert!(history.has_directed_cycle());
    }

    #[test]
    fn components() {
        let v = ids(5);
        let mut history = History::new();
        history.add_child(v[0], v[1]);
        history.add_child(v[2], v[3]);
        history.add_child(v[3], v[4]);
        let comps = history.connected_components();
        assert_eq!(comps.len(), 2);
        assert_eq!(comps.iter().map(Vec::len).sum::<usize>(), 5);
    }
}
