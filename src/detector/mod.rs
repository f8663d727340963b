use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;
use crate::particle::Species;
use crate::path::SurfaceKey;
use crate::track::Track;
use crate::utils::vectors::{ThreeVector, Vec3};

/// A CMS-like concrete detector model.
pub mod cms;

/// Calorimeter layer tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Layer {
    /// The electromagnetic calorimeter.
    Ecal,
    /// The hadronic calorimeter.
    Hcal,
}

impl Layer {
    /// The entrance surface of this layer.
    pub fn inner_surface(&self) -> SurfaceKey {
        match self {
            Layer::Ecal => SurfaceKey::EcalIn,
            Layer::Hcal => SurfaceKey::HcalIn,
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layer::Ecal => write!(f, "ecal"),
            Layer::Hcal => write!(f, "hcal"),
        }
    }
}

/// A cylinder centered on the beam axis, bounded at $`|z|`$.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct SurfaceCylinder {
    /// The key under which crossings of this surface are recorded.
    pub key: SurfaceKey,
    /// Cylinder radius in meters.
    pub rad: f64,
    /// Half-length along the beam axis in meters.
    pub z: f64,
}

impl SurfaceCylinder {
    /// Build a surface.
    pub const fn new(key: SurfaceKey, rad: f64, z: f64) -> Self {
        Self { key, rad, z }
    }
}

/// The space between two concentric [`SurfaceCylinder`]s.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct VolumeCylinder {
    /// Inner boundary.
    pub inner: SurfaceCylinder,
    /// Outer boundary.
    pub outer: SurfaceCylinder,
}

impl VolumeCylinder {
    /// Build a volume; the outer surface must enclose the inner one.
    pub fn new(inner: SurfaceCylinder, outer: SurfaceCylinder) -> Self {
        assert!(
            outer.rad >= inner.rad && outer.z >= inner.z,
            "volume outer surface must enclose the inner surface"
        );
        Self { inner, outer }
    }

    /// Whether a point lies inside the volume (between the two surfaces, or
    /// beyond the inner endcap within the outer cylinder).
    pub fn contains(&self, point: &Vec3) -> bool {
        let rho = point.rho();
        let z = point.z.abs();
        if rho > self.outer.rad || z > self.outer.z {
            return false;
        }
        rho >= self.inner.rad || z >= self.inner.z
    }
}

/// Passive material description: radiation length and nuclear interaction
/// length, both in meters.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Material {
    /// Radiation length $`X_0`$; `f64::INFINITY` for transparent material.
    pub x0: f64,
    /// Nuclear interaction length $`\lambda_I`$; `f64::INFINITY` for
    /// transparent material.
    pub lambda_i: f64,
}

impl Material {
    /// Build a material.
    pub const fn new(x0: f64, lambda_i: f64) -> Self {
        Self { x0, lambda_i }
    }

    /// A fully transparent material.
    pub const fn void() -> Self {
        Self::new(f64::INFINITY, f64::INFINITY)
    }

    /// Draw an exponential free path, in meters, before the first
    /// interaction of the given species. Returns `f64::INFINITY` when the
    /// material is transparent to it.
    pub fn path_length(&self, species: Species, rng: &mut dyn RngCore) -> f64 {
        let scale = match species {
            Species::Photon | Species::Electron => self.x0,
            _ => self.lambda_i,
        };
        if !scale.is_finite() {
            return f64::INFINITY;
        }
        let u: f64 = rng.gen();
        -scale * (1.0 - u).ln()
    }
}

/// A calorimeter element: geometry, material and parametrized response.
pub trait Calorimeter {
    /// The sensitive volume.
    fn volume(&self) -> &VolumeCylinder;
    /// The passive material in front of and inside the volume.
    fn material(&self) -> &Material;
    /// Which layer this calorimeter is.
    fn layer(&self) -> Layer;
    /// Fractional energy resolution at the given energy and pseudorapidity.
    fn energy_resolution(&self, energy: f64, eta: f64) -> f64;
    /// Multiplicative response bias at the given energy and pseudorapidity.
    fn energy_response(&self, energy: f64, eta: f64) -> f64;
    /// Physical cluster size, in meters, for a deposit from the given
    /// species.
    fn cluster_size(&self, species: Species) -> f64;
    /// Whether a smeared cluster is retained.
    fn acceptance(&self, cluster: &Cluster) -> bool;
}

/// The tracking volume.
pub trait Tracker {
    /// The outer boundary of the tracking volume.
    fn outer_surface(&self) -> &SurfaceCylinder;
    /// Fractional momentum resolution for the given track.
    fn pt_resolution(&self, track: &Track) -> f64;
    /// Whether a smeared track is retained; may draw on `rng` to model a
    /// per-track efficiency.
    fn acceptance(&self, track: &Track, rng: &mut dyn RngCore) -> bool;
}

/// A uniform axial magnetic field filling a cylinder.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct MagneticField {
    /// Field magnitude in tesla, along $`+z`$.
    pub magnitude: f64,
    /// The volume the field fills.
    pub volume: VolumeCylinder,
}

/// A full detector model as seen by the simulation and reconstruction.
pub trait Detector {
    /// The electromagnetic calorimeter.
    fn ecal(&self) -> &dyn Calorimeter;
    /// The hadronic calorimeter.
    fn hcal(&self) -> &dyn Calorimeter;
    /// The tracking volume.
    fn tracker(&self) -> &dyn Tracker;
    /// The magnetic field.
    fn field(&self) -> &MagneticField;

    /// The calorimeter for a given layer.
    fn calorimeter(&self, layer: Layer) -> &dyn Calorimeter {
        match layer {
            Layer::Ecal => self.ecal(),
            Layer::Hcal => self.hcal(),
        }
    }

    /// Fractional momentum resolution for an electron track.
    fn electron_resolution(&self, track: &Track) -> f64;
    /// Whether a smeared electron track is retained.
    fn electron_acceptance(&self, track: &Track, rng: &mut dyn RngCore) -> bool;
    /// Fractional momentum resolution for a muon track.
    fn muon_resolution(&self, track: &Track) -> f64;
    /// Whether a smeared muon track is retained.
    fn muon_acceptance(&self, track: &Track, rng: &mut dyn RngCore) -> bool;
}
