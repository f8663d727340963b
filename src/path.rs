use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::detector::SurfaceCylinder;
use crate::utils::vectors::{ThreeVector, Vec3, Vec4};
use crate::{PflowError, PflowResult};

/// Speed of light in m/s.
pub const C_LIGHT: f64 = 299_792_458.0;

/// Names for the surfaces a trajectory can cross. Crossing points are cached
/// on the [`Path`] under these keys.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SurfaceKey {
    /// The production vertex (always present).
    Vertex,
    /// Outer boundary of the tracking volume.
    TrackerOut,
    /// Entrance of the electromagnetic calorimeter.
    EcalIn,
    /// Exit of the electromagnetic calorimeter.
    EcalOut,
    /// Entrance of the hadronic calorimeter.
    HcalIn,
    /// Exit of the hadronic calorimeter.
    HcalOut,
    /// The point where a hadron starts showering inside the ecal.
    EcalDecay,
}

impl std::fmt::Display for SurfaceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SurfaceKey::Vertex => "vertex",
            SurfaceKey::TrackerOut => "tracker_out",
            SurfaceKey::EcalIn => "ecal_in",
            SurfaceKey::EcalOut => "ecal_out",
            SurfaceKey::HcalIn => "hcal_in",
            SurfaceKey::HcalOut => "hcal_out",
            SurfaceKey::EcalDecay => "ecal_decay",
        };
        write!(f, "{name}")
    }
}

/// A straight-line trajectory, used for neutral particles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Line {
    origin: Vec3,
    udir: Vec3,
    speed: f64,
}

/// A helical trajectory for a charged particle in a uniform axial field.
///
/// Parameters are derived analytically from the four-momentum, charge and
/// field magnitude: transverse radius $`\rho = p_T / (0.3 |q| B)`$ (meters,
/// GeV, tesla), signed angular velocity $`\omega = q B c^2 / E`$, and the
/// circle center offset from the origin along the rotated transverse
/// momentum direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Helix {
    origin: Vec3,
    /// Transverse radius in meters.
    rho: f64,
    /// Signed angular velocity in rad/s; the sign matches the charge.
    omega: f64,
    vz: f64,
    speed: f64,
    center_x: f64,
    center_y: f64,
    phi0: f64,
}

impl Helix {
    /// Azimuth of the helix point at time `t`, measured around the helix
    /// center.
    fn phi_at_time(&self, t: f64) -> f64 {
        self.phi0 - self.omega * t
    }

    /// Azimuth around the helix center of a transverse point.
    fn phi_of(&self, x: f64, y: f64) -> f64 {
        (y - self.center_y).atan2(x - self.center_x)
    }

    /// Earliest non-negative time at which the helix azimuth equals `phi`.
    fn time_at_phi(&self, phi: f64) -> f64 {
        let period = std::f64::consts::TAU / self.omega.abs();
        ((self.phi0 - phi) / self.omega).rem_euclid(period)
    }

    /// Largest transverse distance from the beam axis ever reached.
    fn max_rho(&self) -> f64 {
        self.center_x.hypot(self.center_y) + self.rho
    }
}

/// A trajectory model, polymorphic over the capability set
/// `{point_at_time, time_at_z, delta_time}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Trajectory {
    /// Straight-line motion.
    Line(Line),
    /// Helical motion in the magnetic field.
    Helix(Helix),
}

impl Trajectory {
    /// Straight-line trajectory for a particle with the given four-momentum
    /// starting at `origin`.
    pub fn line(p4: &Vec4, origin: Vec3) -> Self {
        let p = p4.p();
        debug_assert!(p > 0.0, "cannot build a trajectory for a particle at rest");
        Trajectory::Line(Line {
            origin,
            udir: p4.vec3() / p,
            speed: p4.beta() * C_LIGHT,
        })
    }

    /// Helical trajectory for a particle of the given `charge` in an axial
    /// field of `field` tesla.
    pub fn helix(p4: &Vec4, charge: f64, field: f64, origin: Vec3) -> Self {
        debug_assert!(charge != 0.0 && field > 0.0);
        let pt = p4.pt();
        let rho = pt / (charge.abs() * field) * 1e9 / C_LIGHT;
        let omega = charge * field * C_LIGHT * C_LIGHT / (p4.e * 1e9);
        // center sits perpendicular to the transverse momentum, on the side
        // set by the charge sign
        let momperp = Vec3::new(-p4.py, p4.px, 0.0).normalize();
        let center_x = origin.x - charge.signum() * momperp.x * rho;
        let center_y = origin.y - charge.signum() * momperp.y * rho;
        let phi0 = (origin.y - center_y).atan2(origin.x - center_x);
        Trajectory::Helix(Helix {
            origin,
            rho,
            omega,
            vz: p4.pz / p4.e * C_LIGHT,
            speed: p4.beta() * C_LIGHT,
            center_x,
            center_y,
            phi0,
        })
    }

    /// The production vertex.
    pub fn origin(&self) -> Vec3 {
        match self {
            Trajectory::Line(l) => l.origin,
            Trajectory::Helix(h) => h.origin,
        }
    }

    /// Velocity component along the beam axis, in m/s.
    pub fn vz(&self) -> f64 {
        match self {
            Trajectory::Line(l) => l.udir.z * l.speed,
            Trajectory::Helix(h) => h.vz,
        }
    }

    /// Total speed, in m/s.
    pub fn speed(&self) -> f64 {
        match self {
            Trajectory::Line(l) => l.speed,
            Trajectory::Helix(h) => h.speed,
        }
    }

    /// Position at time `t` seconds after the vertex.
    pub fn point_at_time(&self, t: f64) -> Vec3 {
        match self {
            Trajectory::Line(l) => l.origin + l.udir * (l.speed * t),
            Trajectory::Helix(h) => {
                let phi = h.phi_at_time(t);
                Vec3::new(
                    h.center_x + h.rho * phi.cos(),
                    h.center_y + h.rho * phi.sin(),
                    h.origin.z + h.vz * t,
                )
            }
        }
    }

    /// Time at which the trajectory reaches the plane `z`; `None` when the
    /// motion has no component along the beam axis.
    pub fn time_at_z(&self, z: f64) -> Option<f64> {
        let vz = self.vz();
        if vz == 0.0 {
            return None;
        }
        Some((z - self.origin().z) / vz)
    }

    /// Time taken to travel a given path length along the trajectory.
    pub fn delta_time(&self, path_length: f64) -> f64 {
        path_length / self.speed()
    }

    /// Path length travelled in `delta_t` seconds.
    pub fn path_length(&self, delta_t: f64) -> f64 {
        self.speed() * delta_t
    }

    /// Signed impact parameter with respect to `vertex`.
    ///
    /// The magnitude is the minimum distance between the trajectory and the
    /// vertex, found by a bracketed 1-D golden-section search over time
    /// around $`t = 0`$; the sign is the sign of the dot product between the
    /// vertex-to-closest-point vector and the reference `jet_direction`.
    pub fn impact_parameter(&self, vertex: &Vec3, jet_direction: &Vec3) -> f64 {
        // +-1 ns brackets ~30 cm of flight on either side of the vertex
        let bracket = 1e-9;
        let t_min = minimize_scalar(
            |t| (self.point_at_time(t) - vertex).norm_squared(),
            -bracket,
            bracket,
            1e-15,
        );
        let vector = self.point_at_time(t_min) - vertex;
        if vector.dot(jet_direction) < 0.0 {
            -vector.norm()
        } else {
            vector.norm()
        }
    }
}

/// Golden-section minimization of `f` over `[a, b]` down to an interval of
/// width `tol`. Assumes a single local minimum inside the bracket.
fn minimize_scalar<F: Fn(f64) -> f64>(f: F, mut a: f64, mut b: f64, tol: f64) -> f64 {
    const INVPHI: f64 = 0.618_033_988_749_894_8;
    let mut c = b - (b - a) * INVPHI;
    let mut d = a + (b - a) * INVPHI;
    let mut fc = f(c);
    let mut fd = f(d);
    while (b - a).abs() > tol {
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - (b - a) * INVPHI;
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + (b - a) * INVPHI;
            fd = f(d);
        }
    }
    (a + b) / 2.0
}

/// Intersections of a circle centered at `(x0, y0)` with radius `r0` and a
/// circle of radius `r` centered on the beam axis.
fn circle_intersection(x0: f64, y0: f64, r0: f64, r: f64) -> Option<((f64, f64), (f64, f64))> {
    let d = x0.hypot(y0);
    if d == 0.0 || d > r0 + r || d < (r0 - r).abs() {
        return None;
    }
    let a = (r * r - r0 * r0 + d * d) / (2.0 * d);
    let h2 = r * r - a * a;
    if h2 < 0.0 {
        return None;
    }
    let h = h2.sqrt();
    let (ux, uy) = (x0 / d, y0 / d);
    let (px, py) = (a * ux, a * uy);
    Some((
        (px - h * uy, py + h * ux),
        (px + h * uy, py - h * ux),
    ))
}

/// A trajectory together with its cached surface crossings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Path {
    /// The underlying trajectory model.
    pub trajectory: Trajectory,
    points: IndexMap<SurfaceKey, Vec3>,
}

impl Path {
    /// Wrap a trajectory; the vertex point is recorded immediately.
    pub fn new(trajectory: Trajectory) -> Self {
        let origin = trajectory.origin();
        let mut points = IndexMap::new();
        points.insert(SurfaceKey::Vertex, origin);
        Self { trajectory, points }
    }

    /// The cached crossing point for a surface, if the path reached it.
    pub fn point(&self, key: SurfaceKey) -> Option<&Vec3> {
        self.points.get(&key)
    }

    /// Record an extra point (e.g. a shower start inside a volume).
    pub fn set_point(&mut self, key: SurfaceKey, point: Vec3) {
        self.points.insert(key, point);
    }

    /// Compute the first forward crossing with `surface`, record it under
    /// the surface's key and return `(time, point)`.
    ///
    /// Fails with [`PflowError::Propagation`] when no real forward crossing
    /// exists, e.g. a low-momentum track that curls up before reaching the
    /// surface.
    pub fn propagate_to(&mut self, surface: &SurfaceCylinder) -> PflowResult<(f64, Vec3)> {
        let (time, point) = match &self.trajectory {
            Trajectory::Line(_) => self.line_crossing(surface)?,
            Trajectory::Helix(_) => self.helix_crossing(surface)?,
        };
        self.points.insert(surface.key, point);
        Ok((time, point))
    }

    fn no_crossing(&self, surface: &SurfaceCylinder) -> PflowError {
        PflowError::Propagation {
            surface: surface.key.to_string(),
        }
    }

    fn line_crossing(&self, surface: &SurfaceCylinder) -> PflowResult<(f64, Vec3)> {
        let line = match &self.trajectory {
            Trajectory::Line(l) => l,
            Trajectory::Helix(_) => unreachable!(),
        };
        let origin = line.origin;
        let mut best: Option<f64> = None;
        // endcap candidate
        if line.udir.z != 0.0 {
            let z_target = surface.z.copysign(line.udir.z);
            let s = (z_target - origin.z) / line.udir.z;
            if s >= 0.0 && (origin + line.udir * s).rho() <= surface.rad {
                best = Some(s);
            }
        }
        // barrel candidate: |xy(s)| = rad, quadratic in the path length
        let a = line.udir.x * line.udir.x + line.udir.y * line.udir.y;
        if a > 0.0 {
            let b = 2.0 * (origin.x * line.udir.x + origin.y * line.udir.y);
            let c = origin.x * origin.x + origin.y * origin.y - surface.rad * surface.rad;
            let delta = b * b - 4.0 * a * c;
            if delta >= 0.0 {
                let s = (-b + delta.sqrt()) / (2.0 * a);
                if s >= 0.0
                    && (origin + line.udir * s).z.abs() <= surface.z
                    && best.map_or(true, |earlier| s < earlier)
                {
                    best = Some(s);
                }
            }
        }
        let s = best.ok_or_else(|| self.no_crossing(surface))?;
        Ok((s / line.speed, origin + line.udir * s))
    }

    fn helix_crossing(&self, surface: &SurfaceCylinder) -> PflowResult<(f64, Vec3)> {
        let helix = match &self.trajectory {
            Trajectory::Helix(h) => h,
            Trajectory::Line(_) => unreachable!(),
        };
        let mut times: Vec<f64> = Vec::with_capacity(3);
        // endcap candidate
        if helix.vz != 0.0 {
            let z_target = surface.z.copysign(helix.vz);
            if let Some(t) = self.trajectory.time_at_z(z_target) {
                if t >= 0.0 && self.trajectory.point_at_time(t).rho() <= surface.rad {
                    times.push(t);
                }
            }
        }
        // barrel candidates, unless the helix circle never reaches the
        // barrel radius and the particle curls back inside the cylinder
        if helix.max_rho() >= surface.rad {
            if let Some(((x1, y1), (x2, y2))) =
                circle_intersection(helix.center_x, helix.center_y, helix.rho, surface.rad)
            {
                for (x, y) in [(x1, y1), (x2, y2)] {
                    let t = helix.time_at_phi(helix.phi_of(x, y));
                    if self.trajectory.point_at_time(t).z.abs() <= surface.z {
                        times.push(t);
                    }
                }
            }
        }
        let t = times
            .into_iter()
            .min_by(|a, b| a.total_cmp(b))
            .ok_or_else(|| self.no_crossing(surface))?;
        Ok((t, self.trajectory.point_at_time(t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ecal_inner() -> SurfaceCylinder {
        SurfaceCylinder::new(SurfaceKey::EcalIn, 1.30, 2.0)
    }

    #[test]
    fn line_barrel_crossing() {
        let p4 = Vec3::new(1.0, 0.0, 0.0).with_mass(0.0);
        let mut path = Path::new(Trajectory::line(&p4, Vec3::zeros()));
        let (t, point) = path.propagate_to(&ecal_inner()).unwrap();
        assert_relative_eq!(point.x, 1.30, epsilon = 1e-9);
        assert_relative_eq!(point.y, 0.0);
        assert_relative_eq!(t, 1.30 / C_LIGHT, epsilon = 1e-15);
        assert!(path.point(SurfaceKey::EcalIn).is_some());
    }

    #[test]
    fn line_endcap_crossing() {
        // nearly along the beam axis: exits through the endcap
        let p4 = Vec3::new(0.1, 0.0, 10.0).with_mass(0.0);
        let mut path = Path::new(Trajectory::line(&p4, Vec3::zeros()));
        let (_, point) = path.propagate_to(&ecal_inner()).unwrap();
        assert_relative_eq!(point.z, 2.0, epsilon = 1e-9);
        assert!(point.rho() < 1.30);
    }

    #[test]
    fn line_backwards_endcap() {
        let p4 = Vec3::new(0.0, 0.1, -10.0).with_mass(0.0);
        let mut path = Path::new(Trajectory::line(&p4, Vec3::zeros()));
        let (_, point) = path.propagate_to(&ecal_inner()).unwrap();
        assert_relative_eq!(point.z, -2.0, epsilon = 1e-9);
    }

    #[test]
    fn helix_radius_and_start() {
        // pT = 2 GeV in a 3.8 T field: rho = 2 / (0.3 * 3.8) m
        let p4 = Vec3::new(2.0, 0.0, 1.0).with_mass(0.139);
        let trajectory = Trajectory::helix(&p4, 1.0, 3.8, Vec3::zeros());
        if let Trajectory::Helix(h) = &trajectory {
            assert_relative_eq!(h.rho, 2.0 * 1e9 / (3.8 * C_LIGHT), epsilon = 1e-9);
        } else {
            panic!("expected a helix");
        }
        let start = trajectory.point_at_time(0.0);
        assert_relative_eq!(start.norm(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn helix_moves_along_momentum_initially() {
        let p4 = Vec3::new(1.5, 0.7, 0.3).with_mass(0.139);
        for charge in [1.0, -1.0] {
            let trajectory = Trajectory::helix(&p4, charge, 3.8, Vec3::zeros());
            let dt = 1e-13;
            let step = trajectory.point_at_time(dt);
            let dir = step / step.norm();
            let pdir = p4.vec3() / p4.p();
            assert_relative_eq!(dir.x, pdir.x, epsilon = 1e-4);
            assert_relative_eq!(dir.y, pdir.y, epsilon = 1e-4);
            assert_relative_eq!(dir.z, pdir.z, epsilon = 1e-4);
        }
    }

    #[test]
    fn helix_barrel_crossing() {
        // stiff track, reaches the barrel well before curling
        let p4 = Vec3::new(10.0, 0.0, 0.5).with_mass(0.139);
        let mut path = Path::new(Trajectory::helix(&p4, -1.0, 3.8, Vec3::zeros()));
        let (t, point) = path.propagate_to(&ecal_inner()).unwrap();
        assert!(t > 0.0);
        assert_relative_eq!(point.rho(), 1.30, epsilon = 1e-9);
        assert!(point.z.abs() < 2.0);
    }

    #[test]
    fn helix_curler_fails() {
        // pT = 0.2 GeV: rho ~ 0.18 m, never reaches the 1.3 m barrel, and
        // no longitudinal motion means it never exits an endcap either
        let p4 = Vec3::new(0.2, 0.0, 0.0).with_mass(0.139);
        let mut path = Path::new(Trajectory::helix(&p4, 1.0, 3.8, Vec3::zeros()));
        let result = path.propagate_to(&ecal_inner());
        assert!(matches!(result, Err(PflowError::Propagation { .. })));
    }

    #[test]
    fn helix_curler_exits_endcap() {
        // same curler but with pz: escapes through the endcap
        let p4 = Vec3::new(0.2, 0.0, 1.0).with_mass(0.139);
        let mut path = Path::new(Trajectory::helix(&p4, 1.0, 3.8, Vec3::zeros()));
        let (_, point) = path.propagate_to(&ecal_inner()).unwrap();
        assert_relative_eq!(point.z, 2.0, epsilon = 1e-9);
        assert!(point.rho() < 1.30);
    }

    #[test]
    fn impact_parameter_sign() {
        let jet = Vec3::new(1.0, 0.0, 0.0);
        // line parallel to the jet, displaced towards +y
        let p4 = Vec3::new(5.0, 0.0, 0.0).with_mass(0.0);
        let displaced = Trajectory::line(&p4, Vec3::new(0.0, 1e-3, 0.0));
        let ip = displaced.impact_parameter(&Vec3::zeros(), &jet);
        assert_relative_eq!(ip.abs(), 1e-3, epsilon = 1e-6);
        // trajectory through the vertex itself: tiny impact parameter
        let through = Trajectory::line(&p4, Vec3::zeros());
        assert!(through.impact_parameter(&Vec3::zeros(), &jet).abs() < 1e-6);
    }

    #[test]
    fn impact_parameter_signed_by_jet_direction() {
        let p4 = Vec3::new(0.0, 0.0, 5.0).with_mass(0.0);
        let trajectory = Trajectory::line(&p4, Vec3::new(2e-3, 0.0, 0.0));
        let ip_towards = trajectory.impact_parameter(&Vec3::zeros(), &Vec3::new(1.0, 0.0, 0.0));
        let ip_away = trajectory.impact_parameter(&Vec3::zeros(), &Vec3::new(-1.0, 0.0, 0.0));
        assert!(ip_towards > 0.0);
        assert!(ip_away < 0.0);
        assert_relative_eq!(ip_towards, -ip_away, epsilon = 1e-9);
    }
}
