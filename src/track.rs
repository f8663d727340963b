use serde::{Deserialize, Serialize};

use crate::id::{IdAllocator, IdKind, Identifier, SubKind};
use crate::path::Path;
use crate::utils::vectors::{ThreeVector, Vec3};

/// A track in the tracking volume: a momentum, a charge and the trajectory
/// it was measured on.
///
/// A smeared track is an ordinary [`Track`] whose `origin` points at the
/// true track it was derived from; it differs only in its resolution-smeared
/// momentum and its acceptance decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    uid: Identifier,
    p3: Vec3,
    charge: f64,
    path: Path,
    origin: Option<Identifier>,
}

impl Track {
    /// Build a track; the identifier's sort value is the momentum magnitude.
    pub fn new(
        allocator: &mut IdAllocator,
        subkind: SubKind,
        p3: Vec3,
        charge: f64,
        path: Path,
        origin: Option<Identifier>,
    ) -> Self {
        let uid = allocator.make(IdKind::Track, subkind, p3.norm());
        Self {
            uid,
            p3,
            charge,
            path,
            origin,
        }
    }

    /// The track identifier.
    pub fn uid(&self) -> Identifier {
        self.uid
    }
    /// The measured momentum.
    pub fn p3(&self) -> Vec3 {
        self.p3
    }
    /// Momentum magnitude; tracks enter the energy balance at $`|\vec{p}|`$.
    pub fn energy(&self) -> f64 {
        self.p3.norm()
    }
    /// Transverse momentum.
    pub fn pt(&self) -> f64 {
        self.p3.rho()
    }
    /// The track charge.
    pub fn charge(&self) -> f64 {
        self.charge
    }
    /// The trajectory with its cached surface crossings.
    pub fn path(&self) -> &Path {
        &self.path
    }
    /// The true track this smeared track was derived from, if any.
    pub fn origin(&self) -> Option<Identifier> {
        self.origin
    }
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "track {}: p = {:.3}, pt = {:.3}, charge = {:+.0}",
            self.uid,
            self.energy(),
            self.pt(),
            self.charge
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Trajectory;
    use approx::assert_relative_eq;

    #[test]
    fn sort_value_is_momentum() {
        let mut alloc = IdAllocator::new();
        let p3 = Vec3::new(3.0, 4.0, 0.0);
        let p4 = p3.with_mass(0.139);
        let path = Path::new(Trajectory::helix(&p4, 1.0, 3.8, Vec3::zeros()));
        let track = Track::new(&mut alloc, SubKind::True, p3, 1.0, path, None);
        assert_relative_eq!(track.uid().value(), 5.0, max_relative = 1e-6);
        assert_relative_eq!(track.energy(), 5.0);
        assert!(track.uid().is_track());
        assert!(track.origin().is_none());
    }
}
