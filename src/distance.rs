use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;
use crate::id::{IdKind, Identifier};
use crate::track::Track;

/// The category of a pairwise link, named after the two element kinds in
/// identifier order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkKind {
    /// Two ecal clusters.
    EcalEcal,
    /// An ecal cluster and an hcal cluster.
    EcalHcal,
    /// An ecal cluster and a track.
    EcalTrack,
    /// Two hcal clusters.
    HcalHcal,
    /// An hcal cluster and a track.
    HcalTrack,
    /// Two tracks.
    TrackTrack,
}

impl LinkKind {
    /// The link category for a pair of element kinds; `None` for pairs that
    /// are never linked (particles, blocks).
    pub fn between(a: IdKind, b: IdKind) -> Option<Self> {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        match (lo, hi) {
            (IdKind::EcalCluster, IdKind::EcalCluster) => Some(LinkKind::EcalEcal),
            (IdKind::EcalCluster, IdKind::HcalCluster) => Some(LinkKind::EcalHcal),
            (IdKind::EcalCluster, IdKind::Track) => Some(LinkKind::EcalTrack),
            (IdKind::HcalCluster, IdKind::HcalCluster) => Some(LinkKind::HcalHcal),
            (IdKind::HcalCluster, IdKind::Track) => Some(LinkKind::HcalTrack),
            (IdKind::Track, IdKind::Track) => Some(LinkKind::TrackTrack),
            _ => None,
        }
    }
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LinkKind::EcalEcal => "ecal_ecal",
            LinkKind::EcalHcal => "ecal_hcal",
            LinkKind::EcalTrack => "ecal_track",
            LinkKind::HcalHcal => "hcal_hcal",
            LinkKind::HcalTrack => "hcal_track",
            LinkKind::TrackTrack => "track_track",
        };
        write!(f, "{name}")
    }
}

/// The outcome of measuring one pair of elements.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinkResult {
    /// The pair category.
    pub kind: LinkKind,
    /// Whether the two elements are linked.
    pub linked: bool,
    /// Category-specific distance, non-negative; `None` when the pair is
    /// not comparable (e.g. the track never reached the cluster's layer).
    pub distance: Option<f64>,
}

/// A borrowed view of one linkable detector element.
#[derive(Copy, Clone, Debug)]
pub enum ElementView<'a> {
    /// A track.
    Track(&'a Track),
    /// A cluster in either calorimeter.
    Cluster(&'a Cluster),
}

impl ElementView<'_> {
    /// The element identifier.
    pub fn uid(&self) -> Identifier {
        match self {
            ElementView::Track(track) => track.uid(),
            ElementView::Cluster(cluster) => cluster.uid(),
        }
    }

    /// The element kind.
    pub fn kind(&self) -> IdKind {
        self.uid().kind()
    }
}

/// The pluggable linking strategy between two detector elements.
///
/// Implementations must keep `linked` symmetric and distances non-negative;
/// beyond that the semantics of the distance are category-specific.
pub trait Measure {
    /// Measure one unordered pair.
    fn measure(&self, a: &ElementView, b: &ElementView) -> LinkResult;
}

/// The default geometric linking rule.
///
/// Cluster pairs are linked when their angular separation is inside the sum
/// of their angular sizes; track-cluster pairs when the track crossing point
/// at the cluster's layer falls inside the cluster extent; tracks are never
/// linked to each other.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ruler;

impl Measure for Ruler {
    fn measure(&self, a: &ElementView, b: &ElementView) -> LinkResult {
        let kind = LinkKind::between(a.kind(), b.kind())
            .expect("only tracks and clusters can be measured");
        match (a, b) {
            (ElementView::Cluster(c1), ElementView::Cluster(c2)) => {
                let (linked, dr) = c1.overlaps(c2);
                LinkResult {
                    kind,
                    linked,
                    distance: Some(dr),
                }
            }
            (ElementView::Track(track), ElementView::Cluster(cluster))
            | (ElementView::Cluster(cluster), ElementView::Track(track)) => {
                match track.path().point(cluster.layer().inner_surface()) {
                    Some(point) => {
                        let (linked, distance) = cluster.is_inside(point);
                        LinkResult {
                            kind,
                            linked,
                            distance: Some(distance),
                        }
                    }
                    None => LinkResult {
                        kind,
                        linked: false,
                        distance: None,
                    },
                }
            }
            (ElementView::Track(_), ElementView::Track(_)) => LinkResult {
                kind,
                linked: false,
                distance: None,
            },
        }
    }
}
