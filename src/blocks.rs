use std::cmp::Ordering;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::distance::{ElementView, LinkKind, Measure};
use crate::event::EventStore;
use crate::graph::{build_subgraphs, Edge, EdgeKey};
use crate::history::History;
use crate::id::{IdAllocator, IdKind, Identifier, SubKind};

/// A group of tracks and clusters connected by links, reconstructed as one
/// unit.
///
/// A block keeps every measured edge between its elements, linked or not,
/// so downstream algorithms can rank neighbours by distance. The sort value
/// of the block identifier is the sum of its element sort values, which
/// makes blocks order by their total content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    uid: Identifier,
    element_ids: Vec<Identifier>,
    edges: IndexMap<EdgeKey, Edge>,
    active: bool,
}

impl Block {
    /// Build a block from its elements and the edges between them.
    pub fn new(
        allocator: &mut IdAllocator,
        subkind: SubKind,
        mut element_ids: Vec<Identifier>,
        edges: IndexMap<EdgeKey, Edge>,
    ) -> Self {
        element_ids.sort_unstable();
        let value: f64 = element_ids.iter().map(Identifier::value).sum();
        let uid = allocator.make(IdKind::Block, subkind, value);
        Self {
            uid,
            element_ids,
            edges,
            active: true,
        }
    }

    /// The block identifier.
    pub fn uid(&self) -> Identifier {
        self.uid
    }

    /// The element identifiers, sorted ascending.
    pub fn element_ids(&self) -> &[Identifier] {
        &self.element_ids
    }

    /// Number of elements in the block.
    pub fn len(&self) -> usize {
        self.element_ids.len()
    }

    /// `true` if the block has no elements.
    pub fn is_empty(&self) -> bool {
        self.element_ids.is_empty()
    }

    /// All measured edges between the block's elements.
    pub fn edges(&self) -> &IndexMap<EdgeKey, Edge> {
        &self.edges
    }

    /// The edge between two elements of the block, if it was measured.
    pub fn edge(&self, a: Identifier, b: Identifier) -> Option<&Edge> {
        self.edges.get(&Edge::make_key(a, b))
    }

    /// `true` until the block is superseded by its split products.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Mark the block as superseded.
    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Count of elements of a given kind.
    pub fn count_kind(&self, kind: IdKind) -> usize {
        self.element_ids
            .iter()
            .filter(|uid| uid.kind() == kind)
            .count()
    }

    /// The elements of `kind` linked to `uid` through this block, nearest
    /// first; edges without a distance sort last.
    pub fn linked_ids(&self, uid: Identifier, kind: LinkKind) -> Vec<Identifier> {
        let mut found: Vec<(Identifier, Option<f64>)> = self
            .edges
            .values()
            .filter(|edge| {
                edge.linked && edge.kind == kind && (edge.id1 == uid || edge.id2 == uid)
            })
            .map(|edge| (edge.other(uid), edge.distance))
            .collect();
        found.sort_by(|(a_id, a), (b_id, b)| {
            match (a, b) {
                (Some(x), Some(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
            .then(a_id.cmp(b_id))
        });
        found.into_iter().map(|(other, _)| other).collect()
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ecals={} hcals={} tracks={}",
            self.uid,
            self.count_kind(IdKind::EcalCluster),
            self.count_kind(IdKind::HcalCluster),
            self.count_kind(IdKind::Track),
        )
    }
}

/// Measure every unordered pair among `ids`, looking the elements up in the
/// store.
pub fn edges_between(
    ids: &[Identifier],
    store: &EventStore,
    measure: &dyn Measure,
) -> IndexMap<EdgeKey, Edge> {
    let views: Vec<ElementView> = ids
        .iter()
        .map(|&uid| match uid.kind() {
            IdKind::Track => ElementView::Track(
                store
                    .track(uid)
                    .unwrap_or_else(|| panic!("track {uid} missing from store")),
            ),
            IdKind::EcalCluster | IdKind::HcalCluster => ElementView::Cluster(
                store
                    .cluster(uid)
                    .unwrap_or_else(|| panic!("cluster {uid} missing from store")),
            ),
            kind => panic!("{kind:?} elements cannot be linked"),
        })
        .collect();
    let mut edges = IndexMap::new();
    for (i, a) in views.iter().enumerate() {
        for b in &views[i + 1..] {
            let result = measure.measure(a, b);
            let edge = Edge::new(a.uid(), b.uid(), result.kind, result.linked, result.distance);
            edges.insert(edge.key(), edge);
        }
    }
    edges
}

/// Partition elements into blocks of mutually reachable elements.
///
/// Reachability follows the linked edges only, but each block keeps every
/// measured edge between its elements. Every element becomes a history
/// parent of its block, so isolated elements still end up in a block of
/// their own.
pub fn build_blocks(
    ids: &[Identifier],
    edges: &IndexMap<EdgeKey, Edge>,
    subkind: SubKind,
    allocator: &mut IdAllocator,
    history: &mut History,
) -> Vec<Block> {
    let links: Vec<(Identifier, Identifier)> = edges
        .values()
        .filter(|edge| edge.linked)
        .map(|edge| (edge.id1, edge.id2))
        .collect();
    build_subgraphs(ids, &links)
        .into_iter()
        .map(|members| {
            let block_edges = edges
                .iter()
                .filter(|((a, b), _)| members.contains(a) && members.contains(b))
                .map(|(key, edge)| (*key, edge.clone()))
                .collect();
            let block = Block::new(allocator, subkind, members, block_edges);
            for &member in block.element_ids() {
                history.add_child(member, block.uid());
            }
            block
        })
        .collect()
}
