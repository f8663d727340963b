use serde::{Deserialize, Serialize};

use crate::detector::Layer;
use crate::id::{IdAllocator, IdKind, Identifier, SubKind};
use crate::utils::vectors::{delta_r, ThreeVector, Vec3};

/// An energy deposit in one calorimeter layer.
///
/// The same type covers all cluster variants, distinguished by composition
/// rather than inheritance: a smeared cluster carries `origin =
/// Some(true_cluster)`, a merged cluster carries the identifiers of the
/// clusters it absorbed in `subclusters`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    uid: Identifier,
    energy: f64,
    position: Vec3,
    size: f64,
    angular_size: f64,
    layer: Layer,
    particle: Option<Identifier>,
    origin: Option<Identifier>,
    subclusters: Vec<Identifier>,
}

fn kind_for(layer: Layer) -> IdKind {
    match layer {
        Layer::Ecal => IdKind::EcalCluster,
        Layer::Hcal => IdKind::HcalCluster,
    }
}

fn angular_size_for(size: f64, position: &Vec3) -> f64 {
    (size / position.norm()).atan()
}

impl Cluster {
    /// Build a cluster; the identifier's sort value is the energy.
    pub fn new(
        allocator: &mut IdAllocator,
        subkind: SubKind,
        layer: Layer,
        energy: f64,
        position: Vec3,
        size: f64,
        particle: Option<Identifier>,
    ) -> Self {
        let uid = allocator.make(kind_for(layer), subkind, energy);
        Self {
            uid,
            energy,
            position,
            size,
            angular_size: angular_size_for(size, &position),
            layer,
            particle,
            origin: None,
            subclusters: Vec::new(),
        }
    }

    /// Build the smeared counterpart of this cluster with a new energy; the
    /// position, size and layer are unchanged and `origin` points back here.
    pub fn smeared(&self, allocator: &mut IdAllocator, energy: f64) -> Self {
        let uid = allocator.make(kind_for(self.layer), SubKind::Smeared, energy);
        Self {
            uid,
            energy,
            origin: Some(self.uid),
            subclusters: Vec::new(),
            ..self.clone()
        }
    }

    /// Combine one or more overlapping clusters into a merged cluster.
    ///
    /// The energy is the sum of the members, the position is the
    /// energy-weighted centroid, and the size is taken from the first
    /// member. Members must share a layer and are listed in `subclusters`.
    pub fn merge(allocator: &mut IdAllocator, members: &[&Cluster]) -> Self {
        assert!(!members.is_empty(), "cannot merge zero clusters");
        let first = members[0];
        let layer = first.layer;
        let mut energy = 0.0;
        let mut weighted = Vec3::zeros();
        for member in members {
            assert_eq!(member.layer, layer, "merged clusters must share a layer");
            energy += member.energy;
            weighted += member.position * member.energy;
        }
        let position = if energy > 0.0 {
            weighted / energy
        } else {
            first.position
        };
        let uid = allocator.make(kind_for(layer), SubKind::Merged, energy);
        Self {
            uid,
            energy,
            position,
            size: first.size,
            angular_size: angular_size_for(first.size, &position),
            layer,
            particle: None,
            origin: None,
            subclusters: members.iter().map(|m| m.uid).collect(),
        }
    }

    /// The cluster identifier.
    pub fn uid(&self) -> Identifier {
        self.uid
    }
    /// The deposited energy.
    pub fn energy(&self) -> f64 {
        self.energy
    }
    /// The position of the deposit on the calorimeter entrance.
    pub fn position(&self) -> Vec3 {
        self.position
    }
    /// The physical extent of the deposit, in meters.
    pub fn size(&self) -> f64 {
        self.size
    }
    /// The angular extent as seen from the detector center.
    pub fn angular_size(&self) -> f64 {
        self.angular_size
    }
    /// Which calorimeter the deposit sits in.
    pub fn layer(&self) -> Layer {
        self.layer
    }
    /// Transverse energy $`E \sin\theta`$.
    pub fn pt(&self) -> f64 {
        self.energy * self.position.theta().sin()
    }
    /// The simulated particle that deposited this cluster, if recorded.
    pub fn particle(&self) -> Option<Identifier> {
        self.particle
    }
    /// The true cluster this smeared cluster was derived from, if any.
    pub fn origin(&self) -> Option<Identifier> {
        self.origin
    }
    /// Members of a merged cluster (empty otherwise).
    pub fn subclusters(&self) -> &[Identifier] {
        &self.subclusters
    }

    /// Distance from the cluster centroid to a point, and whether the point
    /// falls inside the cluster extent.
    pub fn is_inside(&self, point: &Vec3) -> (bool, f64) {
        let distance = (self.position - point).norm();
        (distance < self.size, distance)
    }

    /// Angular distance to another cluster, and whether the two overlap
    /// within their combined angular sizes.
    pub fn overlaps(&self, other: &Cluster) -> (bool, f64) {
        let dr = delta_r(&self.position, &other.position);
        (dr < self.angular_size + other.angular_size, dr)
    }
}

impl std::fmt::Display for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cluster {}: {} e = {:.3}, theta = {:.3}, phi = {:.3}",
            self.uid,
            self.layer,
            self.energy,
            self.position.theta(),
            self.position.phi()
        )
    }
}
