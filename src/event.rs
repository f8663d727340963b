use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::blocks::Block;
use crate::cluster::Cluster;
use crate::id::{IdKind, Identifier, TypeCode};
use crate::particle::Particle;
use crate::track::Track;
use crate::{PflowError, PflowResult};

/// One homogeneous group of event objects, keyed by identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Collection {
    /// Tracks (true or smeared).
    Tracks(IndexMap<Identifier, Track>),
    /// Calorimeter clusters (true, smeared or merged).
    Clusters(IndexMap<Identifier, Cluster>),
    /// Particles (generated or reconstructed).
    Particles(IndexMap<Identifier, Particle>),
    /// Blocks of linked elements (built or split).
    Blocks(IndexMap<Identifier, Block>),
}

impl Collection {
    /// Number of objects in the collection.
    pub fn len(&self) -> usize {
        match self {
            Collection::Tracks(map) => map.len(),
            Collection::Clusters(map) => map.len(),
            Collection::Particles(map) => map.len(),
            Collection::Blocks(map) => map.len(),
        }
    }

    /// `true` if the collection holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The identifiers in the collection, in insertion order.
    pub fn ids(&self) -> Vec<Identifier> {
        match self {
            Collection::Tracks(map) => map.keys().copied().collect(),
            Collection::Clusters(map) => map.keys().copied().collect(),
            Collection::Particles(map) => map.keys().copied().collect(),
            Collection::Blocks(map) => map.keys().copied().collect(),
        }
    }

    fn contains(&self, uid: Identifier) -> bool {
        match self {
            Collection::Tracks(map) => map.contains_key(&uid),
            Collection::Clusters(map) => map.contains_key(&uid),
            Collection::Particles(map) => map.contains_key(&uid),
            Collection::Blocks(map) => map.contains_key(&uid),
        }
    }
}

/// All collections of one event, keyed by type code.
///
/// Each stage of the pipeline deposits its outputs under a distinct code
/// ("ts" smeared tracks, "em" merged ecal clusters, "pr" reconstructed
/// particles, ...); codes are write-once.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EventStore {
    collections: IndexMap<TypeCode, Collection>,
}

impl EventStore {
    /// Build an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collection under its type code.
    ///
    /// The code of every object in the collection must match `code`; a code
    /// already present is an error.
    pub fn add_collection(&mut self, code: TypeCode, collection: Collection) -> PflowResult<()> {
        if self.collections.contains_key(&code) {
            return Err(PflowError::DuplicateCollection {
                code: code.to_string(),
            });
        }
        debug_assert!(
            collection.ids().iter().all(|uid| uid.type_code() == code),
            "collection {code} holds objects with a foreign type code"
        );
        self.collections.insert(code, collection);
        Ok(())
    }

    /// The collection registered under `code`, if any.
    pub fn collection(&self, code: TypeCode) -> Option<&Collection> {
        self.collections.get(&code)
    }

    /// The registered type codes, in insertion order.
    pub fn codes(&self) -> impl Iterator<Item = TypeCode> + '_ {
        self.collections.keys().copied()
    }

    /// `true` if any collection holds `uid`.
    pub fn contains(&self, uid: Identifier) -> bool {
        self.collections
            .get(&uid.type_code())
            .is_some_and(|collection| collection.contains(uid))
    }

    /// Look up a track by identifier.
    pub fn track(&self, uid: Identifier) -> Option<&Track> {
        debug_assert_eq!(uid.kind(), IdKind::Track);
        match self.collections.get(&uid.type_code())? {
            Collection::Tracks(map) => map.get(&uid),
            _ => None,
        }
    }

    /// Look up a cluster by identifier.
    pub fn cluster(&self, uid: Identifier) -> Option<&Cluster> {
        debug_assert!(matches!(
            uid.kind(),
            IdKind::EcalCluster | IdKind::HcalCluster
        ));
        match self.collections.get(&uid.type_code())? {
            Collection::Clusters(map) => map.get(&uid),
            _ => None,
        }
    }

    /// Look up a particle by identifier.
    pub fn particle(&self, uid: Identifier) -> Option<&Particle> {
        debug_assert_eq!(uid.kind(), IdKind::Particle);
        match self.collections.get(&uid.type_code())? {
            Collection::Particles(map) => map.get(&uid),
            _ => None,
        }
    }

    /// Look up a block by identifier.
    pub fn block(&self, uid: Identifier) -> Option<&Block> {
        debug_assert_eq!(uid.kind(), IdKind::Block);
        match self.collections.get(&uid.type_code())? {
            Collection::Blocks(map) => map.get(&uid),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::Layer;
    use crate::id::{IdAllocator, SubKind};
    use crate::utils::vectors::Vec3;

    fn cluster_collection(alloc: &mut IdAllocator, n: usize) -> Collection {
        let mut map = IndexMap::new();
        for i in 0..n {
            let cluster = Cluster::new(
                alloc,
                SubKind::True,
                Layer::Ecal,
                1.0 + i as f64,
                Vec3::new(1.5, 0.0, 0.0),
                0.04,
                None,
            );
            map.insert(cluster.uid(), cluster);
        }
        Collection::Clusters(map)
    }

    #[test]
    fn lookup_resolves_through_type_code() {
        let mut alloc = IdAllocator::new();
        let collection = cluster_collection(&mut alloc, 3);
        let ids = collection.ids();
        let mut store = EventStore::new();
        let code = ids[0].type_code();
        store.add_collection(code, collection).unwrap();

        for uid in &ids {
            assert!(store.contains(*uid));
            assert_eq!(store.cluster(*uid).unwrap().uid(), *uid);
        }
    }

    #[test]
    fn duplicate_code_is_rejected() {
        let mut alloc = IdAllocator::new();
        let first = cluster_collection(&mut alloc, 1);
        let second = cluster_collection(&mut alloc, 1);
        let code = first.ids()[0].type_code();
        let mut store = EventStore::new();
        store.add_collection(code, first).unwrap();
        assert!(matches!(
            store.add_collection(code, second),
            Err(PflowError::DuplicateCollection { .. })
        ));
    }

    #[test]
    fn missing_collection_yields_none() {
        let mut alloc = IdAllocator::new();
        let cluster = Cluster::new(
            &mut alloc,
            SubKind::True,
            Layer::Hcal,
            4.0,
            Vec3::new(2.0, 0.0, 0.0),
            0.2,
            None,
        );
        let store = EventStore::new();
        assert!(!store.contains(cluster.uid()));
        assert!(store.cluster(cluster.uid()).is_none());
    }
}
