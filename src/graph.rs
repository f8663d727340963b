use std::collections::VecDeque;
use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::distance::LinkKind;
use crate::id::Identifier;

/// A pairwise link between two detector elements, produced by a
/// [`Measure`](crate::distance::Measure) strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// One endpoint.
    pub id1: Identifier,
    /// The other endpoint.
    pub id2: Identifier,
    /// The category of the pair.
    pub kind: LinkKind,
    /// Whether the two elements are considered linked.
    pub linked: bool,
    /// Category-specific distance; `None` means the pair is not comparable.
    pub distance: Option<f64>,
}

/// The symmetric key of an edge: its endpoints in sorted order.
pub type EdgeKey = (Identifier, Identifier);

impl Edge {
    /// Build an edge; endpoint order does not matter.
    pub fn new(
        id1: Identifier,
        id2: Identifier,
        kind: LinkKind,
        linked: bool,
        distance: Option<f64>,
    ) -> Self {
        debug_assert!(distance.map_or(true, |d| d >= 0.0), "distances are non-negative");
        Self {
            id1,
            id2,
            kind,
            linked,
            distance,
        }
    }

    /// The symmetric key for this edge.
    pub fn key(&self) -> EdgeKey {
        Self::make_key(self.id1, self.id2)
    }

    /// The symmetric key for a pair of identifiers.
    pub fn make_key(a: Identifier, b: Identifier) -> EdgeKey {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// The other endpoint, given one of the two.
    pub fn other(&self, uid: Identifier) -> Identifier {
        if uid == self.id1 {
            self.id2
        } else {
            debug_assert_eq!(uid, self.id2);
            self.id1
        }
    }
}

/// Partition `nodes` into connected components under the given undirected
/// `links`.
///
/// Uses an iterative queue-based flood fill guarded by a visited set, so
/// arbitrarily large components and redundant links are handled without
/// recursion. Links mentioning nodes outside `nodes` are ignored. The result
/// is deterministic: components are discovered in sorted node order and each
/// component is itself sorted.
pub fn build_subgraphs<K>(nodes: &[K], links: &[(K, K)]) -> Vec<Vec<K>>
where
    K: Copy + Eq + Ord + Hash,
{
    let node_set: IndexSet<K> = nodes.iter().copied().collect();
    let mut adjacency: IndexMap<K, Vec<K>> =
        nodes.iter().map(|&n| (n, Vec::new())).collect();
    for &(a, b) in links {
        if a == b || !node_set.contains(&a) || !node_set.contains(&b) {
            continue;
        }
        adjacency[&a].push(b);
        adjacency[&b].push(a);
    }

    let mut ordered: Vec<K> = node_set.into_iter().collect();
    ordered.sort_unstable();

    let mut visited: IndexSet<K> = IndexSet::new();
    let mut subgraphs = Vec::new();
    for &start in &ordered {
        if visited.contains(&start) {
            continue;
        }
        let mut component = Vec::new();
        let mut queue = VecDeque::new();
        visited.insert(start);
        queue.push_back(start);
        while let Some(node) = queue.pop_front() {
            component.push(node);
            for &next in &adjacency[&node] {
                if visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        component.sort_unstable();
        subgraphs.push(component);
    }
    subgraphs
}
