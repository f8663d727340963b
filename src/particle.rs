use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::detector::Layer;
use crate::id::{IdAllocator, IdKind, Identifier, SubKind};
use crate::path::Path;
use crate::utils::vectors::{Vec3, Vec4};

/// Electron mass in GeV.
pub const M_ELECTRON: f64 = 0.000_511;
/// Muon mass in GeV.
pub const M_MUON: f64 = 0.105_658;
/// Charged pion mass in GeV; the mass hypothesis for charged hadrons.
pub const M_PION: f64 = 0.139_570;
/// Neutral kaon mass in GeV; the mass hypothesis for neutral hadrons.
pub const M_K0: f64 = 0.497_611;

/// PDG code for a photon.
pub const PDG_PHOTON: i32 = 22;
/// PDG code for an electron.
pub const PDG_ELECTRON: i32 = 11;
/// PDG code for a muon.
pub const PDG_MUON: i32 = 13;
/// PDG code for a charged pion.
pub const PDG_PION: i32 = 211;
/// PDG code for a neutral kaon (long), used for neutral hadrons.
pub const PDG_K0L: i32 = 130;

/// The particle species the simulation distinguishes.
///
/// Simulation dispatch matches exhaustively on this enum; any stable
/// particle with an unlisted PDG code is treated as a hadron according to
/// its charge.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Species {
    /// A photon.
    Photon,
    /// An electron or positron.
    Electron,
    /// A muon or antimuon.
    Muon,
    /// Any neutrino flavour.
    Neutrino,
    /// A stable charged hadron.
    ChargedHadron,
    /// A stable neutral hadron.
    NeutralHadron,
}

impl Species {
    /// Classify a PDG code, falling back on the charge for hadrons.
    pub fn from_pdgid(pdgid: i32, charge: f64) -> Self {
        match pdgid.abs() {
            PDG_PHOTON => Species::Photon,
            PDG_ELECTRON => Species::Electron,
            PDG_MUON => Species::Muon,
            12 | 14 | 16 => Species::Neutrino,
            _ if charge != 0.0 => Species::ChargedHadron,
            _ => Species::NeutralHadron,
        }
    }
}

impl std::fmt::Display for Species {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Species::Photon => "photon",
            Species::Electron => "electron",
            Species::Muon => "muon",
            Species::Neutrino => "neutrino",
            Species::ChargedHadron => "charged hadron",
            Species::NeutralHadron => "neutral hadron",
        };
        write!(f, "{name}")
    }
}

/// A generated particle handed in by the surrounding pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenParticle {
    /// Four-momentum in GeV.
    pub p4: Vec4,
    /// Production vertex in meters.
    pub vertex: Vec3,
    /// Electric charge in units of $`e`$.
    pub charge: f64,
    /// PDG code.
    pub pdgid: i32,
    /// Generator status code (1 for stable).
    pub status: i32,
}

impl GenParticle {
    /// A stable particle produced at the origin.
    pub fn stable(p4: Vec4, charge: f64, pdgid: i32) -> Self {
        Self {
            p4,
            vertex: Vec3::zeros(),
            charge,
            pdgid,
            status: 1,
        }
    }
}

/// A simulated or reconstructed particle.
///
/// Beyond its kinematics, a particle owns at most one track identifier and
/// at most one cluster identifier per calorimeter layer; the objects
/// themselves live in the event collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Particle {
    uid: Identifier,
    p4: Vec4,
    vertex: Vec3,
    charge: f64,
    pdgid: i32,
    status: i32,
    path: Option<Path>,
    track: Option<Identifier>,
    clusters: IndexMap<Layer, Identifier>,
}

impl Particle {
    /// Build a particle; the identifier's sort value is the energy.
    pub fn new(
        allocator: &mut IdAllocator,
        subkind: SubKind,
        p4: Vec4,
        vertex: Vec3,
        charge: f64,
        pdgid: i32,
        status: i32,
    ) -> Self {
        let uid = allocator.make(IdKind::Particle, subkind, p4.e);
        Self {
            uid,
            p4,
            vertex,
            charge,
            pdgid,
            status,
            path: None,
            track: None,
            clusters: IndexMap::new(),
        }
    }

    /// The particle identifier.
    pub fn uid(&self) -> Identifier {
        self.uid
    }
    /// The four-momentum.
    pub fn p4(&self) -> Vec4 {
        self.p4
    }
    /// The energy.
    pub fn e(&self) -> f64 {
        self.p4.e
    }
    /// The production vertex.
    pub fn vertex(&self) -> Vec3 {
        self.vertex
    }
    /// The electric charge.
    pub fn charge(&self) -> f64 {
        self.charge
    }
    /// The PDG code.
    pub fn pdgid(&self) -> i32 {
        self.pdgid
    }
    /// The status code.
    pub fn status(&self) -> i32 {
        self.status
    }
    /// The species this particle simulates as.
    pub fn species(&self) -> Species {
        Species::from_pdgid(self.pdgid, self.charge)
    }

    /// The trajectory through the detector, if one was assigned.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_ref()
    }
    /// Mutable access to the trajectory.
    pub fn path_mut(&mut self) -> Option<&mut Path> {
        self.path.as_mut()
    }
    /// Assign the trajectory.
    pub fn set_path(&mut self, path: Path) {
        self.path = Some(path);
    }

    /// The associated track, if any.
    pub fn track(&self) -> Option<Identifier> {
        self.track
    }
    /// Associate a track.
    pub fn set_track(&mut self, uid: Identifier) {
        debug_assert!(uid.is_track());
        self.track = Some(uid);
    }

    /// The associated cluster in a given layer, if any.
    pub fn cluster(&self, layer: Layer) -> Option<Identifier> {
        self.clusters.get(&layer).copied()
    }
    /// Associate a cluster in its layer.
    pub fn set_cluster(&mut self, layer: Layer, uid: Identifier) {
        self.clusters.insert(layer, uid);
    }
    /// All associated clusters, keyed by layer.
    pub fn clusters(&self) -> &IndexMap<Layer, Identifier> {
        &self.clusters
    }
}

impl std::fmt::Display for Particle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "particle {}: pdgid = {}, {}",
            self.uid, self.pdgid, self.p4
        )
    }
}
