use indexmap::{IndexMap, IndexSet};

use crate::blocks::Block;
use crate::distance::LinkKind;
use crate::graph::{build_subgraphs, Edge, EdgeKey};
use crate::history::History;
use crate::id::{IdAllocator, IdKind, Identifier, SubKind};

/// Simplify blocks before reconstruction.
///
/// Two categories of link are cut: every ecal-hcal link, and for each track
/// every hcal link except the nearest one. The surviving links partition
/// each block into smaller blocks, which supersede the original; the
/// original is deactivated and becomes a history parent of its fragments,
/// alongside the fragment's own elements.
pub fn simplify_blocks(
    blocks: &mut IndexMap<Identifier, Block>,
    allocator: &mut IdAllocator,
    history: &mut History,
) -> IndexMap<Identifier, Block> {
    let mut split = IndexMap::new();
    for block in blocks.values_mut() {
        for fragment in split_block(block, allocator, history) {
            split.insert(fragment.uid(), fragment);
        }
        block.deactivate();
    }
    split
}

fn split_block(block: &Block, allocator: &mut IdAllocator, history: &mut History) -> Vec<Block> {
    let mut cut: IndexSet<EdgeKey> = block
        .edges()
        .values()
        .filter(|edge| edge.kind == LinkKind::EcalHcal)
        .map(Edge::key)
        .collect();
    for &track in block.element_ids() {
        if track.kind() != IdKind::Track {
            continue;
        }
        let hcals = block.linked_ids(track, LinkKind::HcalTrack);
        for &far in hcals.iter().skip(1) {
            cut.insert(Edge::make_key(track, far));
        }
    }

    let mut edges: IndexMap<EdgeKey, Edge> = block.edges().clone();
    for key in &cut {
        if let Some(edge) = edges.get_mut(key) {
            edge.linked = false;
        }
    }

    let links: Vec<(Identifier, Identifier)> = edges
        .values()
        .filter(|edge| edge.linked)
        .map(|edge| (edge.id1, edge.id2))
        .collect();
    build_subgraphs(block.element_ids(), &links)
        .into_iter()
        .map(|members| {
            let fragment_edges = edges
                .iter()
                .filter(|((a, b), _)| members.contains(a) && members.contains(b))
                .map(|(key, edge)| (*key, edge.clone()))
                .collect();
            let fragment = Block::new(allocator, SubKind::Smeared, members, fragment_edges);
            history.add_child(block.uid(), fragment.uid());
            for &member in fragment.element_ids() {
                history.add_child(member, fragment.uid());
            }
            fragment
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::IdAllocator;

    fn element(alloc: &mut IdAllocator, kind: IdKind, value: f64) -> Identifier {
        alloc.make(kind, SubKind::Smeared, value)
    }

    fn linked_edge(a: Identifier, b: Identifier, distance: f64) -> Edge {
        let kind = LinkKind::between(a.kind(), b.kind()).unwrap();
        Edge::new(a, b, kind, true, Some(distance))
    }

    fn block_of(
        alloc: &mut IdAllocator,
        ids: Vec<Identifier>,
        edges: Vec<Edge>,
    ) -> IndexMap<Identifier, Block> {
        let edges = edges.into_iter().map(|edge| (edge.key(), edge)).collect();
        let block = Block::new(alloc, SubKind::Reconstructed, ids, edges);
        let mut map = IndexMap::new();
        map.insert(block.uid(), block);
        map
    }

    #[test]
    fn track_keeps_only_nearest_hcal() {
        let mut alloc = IdAllocator::new();
        let track = element(&mut alloc, IdKind::Track, 10.0);
        let near = element(&mut alloc, IdKind::HcalCluster, 8.0);
        let far = element(&mut alloc, IdKind::HcalCluster, 4.0);
        let mut blocks = block_of(
            &mut alloc,
            vec![track, near, far],
            vec![
                linked_edge(track, near, 0.01),
                linked_edge(track, far, 0.3),
            ],
        );
        let original_uid = *blocks.keys().next().unwrap();
        let mut history = History::new();
        let split = simplify_blocks(&mut blocks, &mut alloc, &mut history);

        assert!(!blocks[&original_uid].is_active());
        assert_eq!(split.len(), 2);
        let with_track = split
            .values()
            .find(|block| block.element_ids().contains(&track))
            .unwrap();
        assert_eq!(with_track.element_ids(), [near, track]);
        assert_eq!(with_track.uid().subkind(), SubKind::Smeared);
        assert!(history
            .node(with_track.uid())
            .unwrap()
            .parents
            .contains(&original_uid));
    }

    #[test]
    fn ecal_hcal_links_are_always_cut() {
        let mut alloc = IdAllocator::new();
        let ecal = element(&mut alloc, IdKind::EcalCluster, 3.0);
        let hcal = element(&mut alloc, IdKind::HcalCluster, 6.0);
        let mut blocks = block_of(
            &mut alloc,
            vec![ecal, hcal],
            vec![linked_edge(ecal, hcal, 0.02)],
        );
        let mut history = History::new();
        let split = simplify_blocks(&mut blocks, &mut alloc, &mut history);
        assert_eq!(split.len(), 2);
        assert!(split.values().all(|block| block.len() == 1));
    }

    #[test]
    fn singleton_block_is_reissued() {
        let mut alloc = IdAllocator::new();
        let track = element(&mut alloc, IdKind::Track, 2.0);
        let mut blocks = block_of(&mut alloc, vec![track], vec![]);
        let mut history = History::new();
        let split = simplify_blocks(&mut blocks, &mut alloc, &mut history);
        assert_eq!(split.len(), 1);
        let fragment = split.values().next().unwrap();
        assert_eq!(fragment.element_ids(), [track]);
        assert!(history.node(fragment.uid()).unwrap().parents.contains(&track));
    }

    #[test]
    fn track_ecal_links_survive() {
        let mut alloc = IdAllocator::new();
        let track = element(&mut alloc, IdKind::Track, 10.0);
        let ecal = element(&mut alloc, IdKind::EcalCluster, 3.0);
        let hcal = element(&mut alloc, IdKind::HcalCluster, 6.0);
        let mut blocks = block_of(
            &mut alloc,
            vec![track, ecal, hcal],
            vec![
                linked_edge(track, ecal, 0.01),
                linked_edge(track, hcal, 0.05),
                linked_edge(ecal, hcal, 0.02),
            ],
        );
        let mut history = History::new();
        let split = simplify_blocks(&mut blocks, &mut alloc, &mut history);
        // everything still reachable through the track
        assert_eq!(split.len(), 1);
        assert_eq!(split.values().next().unwrap().len(), 3);
    }
}
