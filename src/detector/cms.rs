use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;
use crate::particle::Species;
use crate::path::SurfaceKey;
use crate::track::Track;
use crate::utils::vectors::ThreeVector;

use super::{
    Calorimeter, Detector, Layer, MagneticField, Material, SurfaceCylinder, Tracker,
    VolumeCylinder,
};

/// The CMS-like electromagnetic calorimeter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmsEcal {
    volume: VolumeCylinder,
    material: Material,
    eta_crack: f64,
    /// Resolution parameters (stochastic, noise, constant) for barrel and
    /// endcap.
    eres: [[f64; 3]; 2],
}

impl Default for CmsEcal {
    fn default() -> Self {
        Self {
            volume: VolumeCylinder::new(
                SurfaceCylinder::new(SurfaceKey::EcalIn, 1.30, 2.0),
                SurfaceCylinder::new(SurfaceKey::EcalOut, 1.55, 2.1),
            ),
            material: Material::new(8.9e-3, 0.275),
            eta_crack: 1.479,
            eres: [
                [4.22163e-2, 1.55903e-1, 7.14166e-3],
                [-2.08048e-1, 3.25097e-1, 7.34244e-3],
            ],
        }
    }
}

impl Calorimeter for CmsEcal {
    fn volume(&self) -> &VolumeCylinder {
        &self.volume
    }

    fn material(&self) -> &Material {
        &self.material
    }

    fn layer(&self) -> Layer {
        Layer::Ecal
    }

    fn energy_resolution(&self, energy: f64, eta: f64) -> f64 {
        let energy = energy.max(1e-9);
        let [stoch, noise, constant] = if eta.abs() < self.eta_crack {
            self.eres[0]
        } else {
            self.eres[1]
        };
        (stoch.powi(2) / energy + noise.powi(2) / energy.powi(2) + constant.powi(2)).sqrt()
    }

    fn energy_response(&self, _energy: f64, _eta: f64) -> f64 {
        1.0
    }

    fn cluster_size(&self, species: Species) -> f64 {
        match species {
            Species::Photon | Species::Electron => 0.04,
            _ => 0.07,
        }
    }

    fn acceptance(&self, cluster: &Cluster) -> bool {
        let energy = cluster.energy();
        let eta = cluster.position().eta().abs();
        if eta < self.eta_crack {
            energy > 0.3
        } else if eta < 2.93 {
            energy > 1.0 && cluster.pt() > 0.2
        } else {
            false
        }
    }
}

/// The CMS-like hadronic calorimeter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmsHcal {
    volume: VolumeCylinder,
    material: Material,
    eta_crack: f64,
    eres: [f64; 3],
}

impl Default for CmsHcal {
    fn default() -> Self {
        Self {
            volume: VolumeCylinder::new(
                SurfaceCylinder::new(SurfaceKey::HcalIn, 1.9, 2.6),
                SurfaceCylinder::new(SurfaceKey::HcalOut, 2.9, 3.6),
            ),
            // transparent to electromagnetic showers
            material: Material::new(f64::INFINITY, 0.17),
            eta_crack: 1.3,
            eres: [1.1, 0.0, 9.0e-2],
        }
    }
}

impl Calorimeter for CmsHcal {
    fn volume(&self) -> &VolumeCylinder {
        &self.volume
    }

    fn material(&self) -> &Material {
        &self.material
    }

    fn layer(&self) -> Layer {
        Layer::Hcal
    }

    fn energy_resolution(&self, energy: f64, _eta: f64) -> f64 {
        let energy = energy.max(1e-9);
        let [stoch, noise, constant] = self.eres;
        (stoch.powi(2) / energy + noise.powi(2) / energy.powi(2) + constant.powi(2)).sqrt()
    }

    fn energy_response(&self, _energy: f64, _eta: f64) -> f64 {
        1.0
    }

    fn cluster_size(&self, _species: Species) -> f64 {
        0.2
    }

    fn acceptance(&self, cluster: &Cluster) -> bool {
        let energy = cluster.energy();
        let eta = cluster.position().eta().abs();
        if eta < self.eta_crack {
            energy > 1.0
        } else if eta < 3.0 {
            energy > 2.0
        } else {
            false
        }
    }
}

/// The CMS-like tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmsTracker {
    outer: SurfaceCylinder,
    resolution: f64,
}

impl Default for CmsTracker {
    fn default() -> Self {
        Self {
            outer: SurfaceCylinder::new(SurfaceKey::TrackerOut, 1.29, 1.99),
            resolution: 1.1e-2,
        }
    }
}

impl Tracker for CmsTracker {
    fn outer_surface(&self) -> &SurfaceCylinder {
        &self.outer
    }

    fn pt_resolution(&self, _track: &Track) -> f64 {
        self.resolution
    }

    fn acceptance(&self, track: &Track, rng: &mut dyn RngCore) -> bool {
        let pt = track.p3().rho();
        let eta = track.p3().eta().abs();
        if pt <= 0.5 {
            return false;
        }
        let efficiency = if eta < 1.35 {
            0.95
        } else if eta < 2.5 {
            0.9
        } else {
            return false;
        };
        rng.gen::<f64>() < efficiency
    }
}

/// A CMS-like detector model with parametrized calorimetry and tracking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cms {
    ecal: CmsEcal,
    hcal: CmsHcal,
    tracker: CmsTracker,
    field: MagneticField,
}

impl Default for MagneticField {
    fn default() -> Self {
        Self {
            magnitude: 3.8,
            // the field fills the whole cylinder down to the beam line
            volume: VolumeCylinder::new(
                SurfaceCylinder::new(SurfaceKey::Vertex, 0.0, 0.0),
                SurfaceCylinder::new(SurfaceKey::HcalOut, 2.9, 3.6),
            ),
        }
    }
}

impl Detector for Cms {
    fn ecal(&self) -> &dyn Calorimeter {
        &self.ecal
    }

    fn hcal(&self) -> &dyn Calorimeter {
        &self.hcal
    }

    fn tracker(&self) -> &dyn Tracker {
        &self.tracker
    }

    fn field(&self) -> &MagneticField {
        &self.field
    }

    fn electron_resolution(&self, track: &Track) -> f64 {
        (0.1 / track.energy().max(1e-9).sqrt()).max(5.0e-3)
    }

    fn electron_acceptance(&self, track: &Track, rng: &mut dyn RngCore) -> bool {
        track.p3().norm() > 5.0 && track.p3().eta().abs() < 2.5 && rng.gen::<f64>() < 0.95
    }

    fn muon_resolution(&self, _track: &Track) -> f64 {
        0.02
    }

    fn muon_acceptance(&self, track: &Track, _rng: &mut dyn RngCore) -> bool {
        track.p3().rho() > 5.0 && track.p3().eta().abs() < 2.4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{IdAllocator, SubKind};
    use crate::utils::vectors::Vec3;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn ecal_resolution_improves_with_energy() {
        let ecal = CmsEcal::default();
        let low = ecal.energy_resolution(1.0, 0.0);
        let high = ecal.energy_resolution(100.0, 0.0);
        assert!(high < low);
        // constant term dominates at high energy
        assert_relative_eq!(
            ecal.energy_resolution(1e6, 0.0),
            7.14166e-3,
            epsilon = 1e-4
        );
    }

    #[test]
    fn hcal_rejects_forward_clusters() {
        let hcal = CmsHcal::default();
        let mut alloc = IdAllocator::new();
        let barrel = Cluster::new(
            &mut alloc,
            SubKind::Smeared,
            Layer::Hcal,
            5.0,
            Vec3::new(1.9, 0.0, 0.0),
            0.2,
            None,
        );
        assert!(hcal.acceptance(&barrel));
        let forward = Cluster::new(
            &mut alloc,
            SubKind::Smeared,
            Layer::Hcal,
            50.0,
            Vec3::new(0.1, 0.0, 2.6),
            0.2,
            None,
        );
        assert!(!forward.position().eta().abs().is_nan());
        assert!(!hcal.acceptance(&forward));
    }

    #[test]
    fn tracker_cuts_low_pt() {
        use crate::path::{Path, Trajectory};
        let tracker = CmsTracker::default();
        let mut alloc = IdAllocator::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let p3 = Vec3::new(0.2, 0.0, 0.0);
        let path = Path::new(Trajectory::helix(&p3.with_mass(0.139), 1.0, 3.8, Vec3::zeros()));
        let soft = Track::new(&mut alloc, SubKind::True, p3, 1.0, path, None);
        assert!(!tracker.acceptance(&soft, &mut rng));
    }

    #[test]
    fn muon_acceptance_is_deterministic() {
        use crate::path::{Path, Trajectory};
        let cms = Cms::default();
        let mut alloc = IdAllocator::new();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let p3 = Vec3::new(20.0, 0.0, 0.0);
        let path = Path::new(Trajectory::helix(&p3.with_mass(0.105), 1.0, 3.8, Vec3::zeros()));
        let muon = Track::new(&mut alloc, SubKind::True, p3, 1.0, path, None);
        assert!(cms.muon_acceptance(&muon, &mut rng));
        assert_relative_eq!(cms.muon_resolution(&muon), 0.02);
    }
}
