use auto_ops::impl_op_ex;
use serde::{Deserialize, Serialize};

/// Three-vector used for positions, momenta and directions.
pub type Vec3 = nalgebra::Vector3<f64>;

/// Angular helpers for [`Vec3`] treated as a momentum or a position relative
/// to the detector center.
pub trait ThreeVector {
    /// Cylindrical radius $`\rho = \sqrt{x^2 + y^2}`$ (the transverse
    /// component; named to avoid nalgebra's own `perp`).
    fn rho(&self) -> f64;
    /// Polar angle from the $`z`$-axis.
    fn theta(&self) -> f64;
    /// Azimuthal angle in $`(-\pi, \pi]`$.
    fn phi(&self) -> f64;
    /// Pseudorapidity $`\eta = -\ln\tan(\theta/2)`$.
    fn eta(&self) -> f64;
    /// Attach a mass, producing an on-shell four-momentum.
    fn with_mass(&self, mass: f64) -> Vec4;
    /// Attach an energy directly (no mass-shell condition imposed).
    fn with_energy(&self, energy: f64) -> Vec4;
}

impl ThreeVector for Vec3 {
    fn rho(&self) -> f64 {
        self.x.hypot(self.y)
    }
    fn theta(&self) -> f64 {
        self.rho().atan2(self.z)
    }
    fn phi(&self) -> f64 {
        self.y.atan2(self.x)
    }
    fn eta(&self) -> f64 {
        -((self.theta() / 2.0).tan().ln())
    }
    fn with_mass(&self, mass: f64) -> Vec4 {
        Vec4::new(
            self.x,
            self.y,
            self.z,
            (mass * mass + self.norm_squared()).sqrt(),
        )
    }
    fn with_energy(&self, energy: f64) -> Vec4 {
        Vec4::new(self.x, self.y, self.z, energy)
    }
}

/// Wrap an angle difference into $`(-\pi, \pi]`$.
pub fn wrap_angle(dphi: f64) -> f64 {
    let mut d = dphi % std::f64::consts::TAU;
    if d > std::f64::consts::PI {
        d -= std::f64::consts::TAU;
    } else if d <= -std::f64::consts::PI {
        d += std::f64::consts::TAU;
    }
    d
}

/// Angular separation $`\Delta R = \sqrt{\Delta\eta^2 + \Delta\phi^2}`$
/// between two directions.
pub fn delta_r(a: &Vec3, b: &Vec3) -> f64 {
    let deta = a.eta() - b.eta();
    let dphi = wrap_angle(a.phi() - b.phi());
    deta.hypot(dphi)
}

/// A four-momentum $`(p_x, p_y, p_z, E)`$.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec4 {
    /// $`x`$-component of the momentum.
    pub px: f64,
    /// $`y`$-component of the momentum.
    pub py: f64,
    /// $`z`$-component of the momentum.
    pub pz: f64,
    /// Energy.
    pub e: f64,
}

impl Vec4 {
    /// Construct a four-momentum from its components.
    pub const fn new(px: f64, py: f64, pz: f64, e: f64) -> Self {
        Self { px, py, pz, e }
    }
    /// The spatial part as a [`Vec3`].
    pub fn vec3(&self) -> Vec3 {
        Vec3::new(self.px, self.py, self.pz)
    }
    /// Momentum magnitude $`|\vec{p}|`$.
    pub fn p(&self) -> f64 {
        self.vec3().norm()
    }
    /// Transverse momentum.
    pub fn pt(&self) -> f64 {
        self.px.hypot(self.py)
    }
    /// Squared invariant mass $`E^2 - |\vec{p}|^2`$ (may be slightly negative
    /// from rounding).
    pub fn m2(&self) -> f64 {
        self.e * self.e - self.vec3().norm_squared()
    }
    /// Invariant mass (clamped at zero).
    pub fn m(&self) -> f64 {
        self.m2().max(0.0).sqrt()
    }
    /// Velocity magnitude in units of $`c`$.
    pub fn beta(&self) -> f64 {
        self.p() / self.e
    }
    /// Polar angle of the momentum.
    pub fn theta(&self) -> f64 {
        self.vec3().theta()
    }
    /// Azimuthal angle of the momentum.
    pub fn phi(&self) -> f64 {
        self.vec3().phi()
    }
    /// Pseudorapidity of the momentum.
    pub fn eta(&self) -> f64 {
        self.vec3().eta()
    }
}

impl std::fmt::Display for Vec4 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[e = {:.5}; p = ({:.5}, {:.5}, {:.5})]",
            self.e, self.px, self.py, self.pz
        )
    }
}

impl_op_ex!(+ |a: &Vec4, b: &Vec4| -> Vec4 {
    Vec4::new(a.px + b.px, a.py + b.py, a.pz + b.pz, a.e + b.e)
});
impl_op_ex!(-|a: &Vec4, b: &Vec4| -> Vec4 {
    Vec4::new(a.px - b.px, a.py - b.py, a.pz - b.pz, a.e - b.e)
});
impl_op_ex!(*|a: &Vec4, s: &f64| -> Vec4 {
    Vec4::new(a.px * s, a.py * s, a.pz * s, a.e * s)
});

impl std::iter::Sum for Vec4 {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Vec4::default(), |acc, p| acc + p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn four_momentum_basics() {
        let p = Vec3::new(3.0, 4.0, 5.0).with_energy(10.0);
        assert_relative_eq!(p.p(), 50.0_f64.sqrt());
        assert_relative_eq!(p.pt(), 5.0);
        assert_relative_eq!(p.m2(), 50.0);
        assert_relative_eq!(p.m(), 50.0_f64.sqrt());
        assert_relative_eq!(p.beta(), 50.0_f64.sqrt() / 10.0);
        assert_relative_eq!(p.phi(), 4.0_f64.atan2(3.0));
    }

    #[test]
    fn mass_shell_construction() {
        let p = Vec3::new(1.0, 2.0, 3.0).with_mass(0.5);
        assert_relative_eq!(p.m(), 0.5, epsilon = 1e-12);
        let massless = Vec3::new(0.0, 0.0, 7.0).with_mass(0.0);
        assert_relative_eq!(massless.e, 7.0);
    }

    #[test]
    fn cylindrical_radius_is_scalar() {
        // resolves to the extension method, not nalgebra's 2-D perp product
        let v = Vec3::new(3.0, 4.0, 12.0);
        assert_relative_eq!(ThreeVector::rho(&v), 5.0);
        assert_relative_eq!(v.rho(), 5.0);
        assert_relative_eq!(v.theta(), 5.0_f64.atan2(12.0));
    }

    #[test]
    fn angles() {
        let z = Vec3::new(0.0, 0.0, 2.0);
        assert_relative_eq!(z.theta(), 0.0);
        let t = Vec3::new(1.0, 0.0, 0.0);
        assert_relative_eq!(t.eta(), 0.0);
        assert_relative_eq!(delta_r(&t, &Vec3::new(0.0, 1.0, 0.0)), std::f64::consts::FRAC_PI_2);
    }

    #[test]
    fn sums_and_scaling() {
        let a = Vec4::new(1.0, 2.0, 3.0, 10.0);
        let b = Vec4::new(4.0, 5.0, 6.0, 20.0);
        let s: Vec4 = [a, b].into_iter().sum();
        assert_relative_eq!(s.e, 30.0);
        assert_relative_eq!((s - a).px, 4.0);
        assert_relative_eq!((a * 2.0).pz, 6.0);
    }

    #[test]
    fn angle_wrapping() {
        assert_relative_eq!(wrap_angle(3.0 * std::f64::consts::PI), std::f64::consts::PI);
        assert_relative_eq!(wrap_angle(-3.0 * std::f64::consts::PI), std::f64::consts::PI);
    }
}
