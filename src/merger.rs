use indexmap::IndexMap;

use crate::cluster::Cluster;
use crate::distance::{ElementView, Measure};
use crate::graph::build_subgraphs;
use crate::history::History;
use crate::id::{IdAllocator, Identifier};

/// Merge overlapping clusters of one calorimeter layer.
///
/// Clusters are grouped into connected components under the linking rule
/// and every component, singletons included, is replaced by one merged
/// cluster. The members become history parents of their merged cluster, so
/// downstream lookups always go through a merged collection.
pub fn merge_clusters(
    clusters: &IndexMap<Identifier, Cluster>,
    measure: &dyn Measure,
    allocator: &mut IdAllocator,
    history: &mut History,
) -> IndexMap<Identifier, Cluster> {
    let ids: Vec<Identifier> = clusters.keys().copied().collect();
    let mut links = Vec::new();
    for (i, &a) in ids.iter().enumerate() {
        for &b in &ids[i + 1..] {
            let result = measure.measure(
                &ElementView::Cluster(&clusters[&a]),
                &ElementView::Cluster(&clusters[&b]),
            );
            if result.linked {
                links.push((a, b));
            }
        }
    }
    let mut merged = IndexMap::new();
    for members in build_subgraphs(&ids, &links) {
        let group: Vec<&Cluster> = members.iter().map(|uid| &clusters[uid]).collect();
        let combined = Cluster::merge(allocator, &group);
        for &member in &members {
            history.add_child(member, combined.uid());
        }
        merged.insert(combined.uid(), combined);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::Layer;
    use crate::distance::Ruler;
    use crate::id::{IdAllocator, SubKind};
    use crate::utils::vectors::Vec3;
    use approx::assert_relative_eq;

    fn put(
        map: &mut IndexMap<Identifier, Cluster>,
        alloc: &mut IdAllocator,
        energy: f64,
        position: Vec3,
    ) -> Identifier {
        let cluster = Cluster::new(alloc, SubKind::True, Layer::Ecal, energy, position, 0.04, None);
        let uid = cluster.uid();
        map.insert(uid, cluster);
        uid
    }

    #[test]
    fn overlapping_pair_collapses_to_one() {
        let mut alloc = IdAllocator::new();
        let mut clusters = IndexMap::new();
        let a = put(&mut clusters, &mut alloc, 3.0, Vec3::new(1.5, 0.0, 0.0));
        let b = put(&mut clusters, &mut alloc, 1.0, Vec3::new(1.5, 0.05, 0.0));
        let far = put(&mut clusters, &mut alloc, 2.0, Vec3::new(0.0, -1.5, 0.0));

        let mut history = History::new();
        let merged = merge_clusters(&clusters, &Ruler, &mut alloc, &mut history);

        assert_eq!(merged.len(), 2);
        let pair = merged
            .values()
            .find(|cluster| cluster.subclusters().len() == 2)
            .unwrap();
        assert_relative_eq!(pair.energy(), 4.0);
        assert!(pair.subclusters().contains(&a));
        assert!(pair.subclusters().contains(&b));
        assert!(history.node(pair.uid()).unwrap().parents.contains(&a));
        assert!(history.node(pair.uid()).unwrap().parents.contains(&b));

        // the isolated cluster is still re-emitted as a merged singleton
        let single = merged
            .values()
            .find(|cluster| cluster.subclusters() == [far])
            .unwrap();
        assert_relative_eq!(single.energy(), 2.0);
        assert_eq!(single.uid().subkind(), SubKind::Merged);
    }

    #[test]
    fn merged_identifier_carries_total_energy() {
        let mut alloc = IdAllocator::new();
        let mut clusters = IndexMap::new();
        put(&mut clusters, &mut alloc, 5.0, Vec3::new(1.5, 0.0, 0.0));
        put(&mut clusters, &mut alloc, 7.0, Vec3::new(1.5, 0.02, 0.0));
        let mut history = History::new();
        let merged = merge_clusters(&clusters, &Ruler, &mut alloc, &mut history);
        assert_eq!(merged.len(), 1);
        let combined = merged.values().next().unwrap();
        assert_relative_eq!(combined.uid().value(), 12.0, epsilon = 1e-3);
    }
}
