use indexmap::IndexMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::cluster::Cluster;
use crate::detector::{Calorimeter, Detector, Layer};
use crate::history::History;
use crate::id::{IdAllocator, Identifier, SubKind};
use crate::particle::{GenParticle, Particle, Species};
use crate::path::{Path, SurfaceKey, Trajectory};
use crate::track::Track;
use crate::utils::vectors::ThreeVector;
use crate::{PflowError, PflowResult};

/// Everything the simulation deposits for one event.
///
/// True objects record what the particle actually left in the detector;
/// smeared objects are the detected counterparts after resolution and
/// acceptance, and are the only ones reconstruction may look at.
#[derive(Debug, Default, Clone)]
pub struct SimulationOutput {
    /// Simulated particles, with their paths and associations ("ps").
    pub particles: IndexMap<Identifier, Particle>,
    /// True tracks of charged particles ("tt").
    pub true_tracks: IndexMap<Identifier, Track>,
    /// Smeared tracks that passed acceptance ("ts").
    pub smeared_tracks: IndexMap<Identifier, Track>,
    /// True ecal deposits ("et").
    pub true_ecals: IndexMap<Identifier, Cluster>,
    /// Smeared ecal clusters that passed acceptance ("es").
    pub smeared_ecals: IndexMap<Identifier, Cluster>,
    /// True hcal deposits ("ht").
    pub true_hcals: IndexMap<Identifier, Cluster>,
    /// Smeared hcal clusters that passed acceptance ("hs").
    pub smeared_hcals: IndexMap<Identifier, Cluster>,
}

/// Propagates generated particles through the detector and deposits true
/// and smeared tracks and clusters.
///
/// All randomness comes from one seeded generator, so a given detector,
/// particle list and seed always reproduce the same event.
pub struct Simulator<'a> {
    detector: &'a dyn Detector,
    rng: ChaCha8Rng,
    output: SimulationOutput,
}

impl<'a> Simulator<'a> {
    /// Build a simulator with a fresh random stream.
    pub fn new(detector: &'a dyn Detector, seed: u64) -> Self {
        Self {
            detector,
            rng: ChaCha8Rng::seed_from_u64(seed),
            output: SimulationOutput::default(),
        }
    }

    /// Simulate every stable generated particle and return the deposits.
    ///
    /// A particle whose trajectory never reaches the surface it must cross
    /// aborts the whole event.
    pub fn simulate(
        mut self,
        particles: &[GenParticle],
        allocator: &mut IdAllocator,
        history: &mut History,
    ) -> PflowResult<SimulationOutput> {
        for gen in particles {
            if gen.status != 1 {
                debug!(pdgid = gen.pdgid, status = gen.status, "skipping unstable particle");
                continue;
            }
            if !(gen.p4.e > 0.0) || !gen.p4.e.is_finite() {
                return Err(PflowError::Simulation(format!(
                    "particle with pdgid {} has unphysical energy {}",
                    gen.pdgid, gen.p4.e
                )));
            }
            // a particle at rest has no trajectory to propagate
            if !(gen.p4.p() > 0.0) || !gen.p4.p().is_finite() {
                return Err(PflowError::Simulation(format!(
                    "particle with pdgid {} has unphysical momentum {}",
                    gen.pdgid,
                    gen.p4.p()
                )));
            }
            let mut particle = Particle::new(
                allocator,
                SubKind::Smeared,
                gen.p4,
                gen.vertex,
                gen.charge,
                gen.pdgid,
                gen.status,
            );
            match particle.species() {
                Species::Photon => self.simulate_photon(&mut particle, allocator, history)?,
                Species::Electron => self.simulate_electron(&mut particle, allocator, history)?,
                Species::Muon => self.simulate_muon(&mut particle, allocator, history)?,
                Species::Neutrino => self.simulate_neutrino(&mut particle)?,
                Species::ChargedHadron | Species::NeutralHadron => {
                    self.simulate_hadron(&mut particle, allocator, history)?
                }
            }
            self.output.particles.insert(particle.uid(), particle);
        }
        Ok(self.output)
    }

    fn trajectory(&self, particle: &Particle) -> Trajectory {
        if particle.charge() == 0.0 {
            Trajectory::line(&particle.p4(), particle.vertex())
        } else {
            Trajectory::helix(
                &particle.p4(),
                particle.charge(),
                self.detector.field().magnitude,
                particle.vertex(),
            )
        }
    }

    fn simulate_photon(
        &mut self,
        particle: &mut Particle,
        allocator: &mut IdAllocator,
        history: &mut History,
    ) -> PflowResult<()> {
        let mut path = Path::new(self.trajectory(particle));
        path.propagate_to(&self.detector.ecal().volume().inner)?;
        particle.set_path(path);
        self.deposit_cluster(particle, Layer::Ecal, SurfaceKey::EcalIn, 1.0, allocator, history);
        Ok(())
    }

    fn simulate_electron(
        &mut self,
        particle: &mut Particle,
        allocator: &mut IdAllocator,
        history: &mut History,
    ) -> PflowResult<()> {
        let mut path = Path::new(self.trajectory(particle));
        path.propagate_to(&self.detector.ecal().volume().inner)?;
        particle.set_path(path);
        let true_track = self.deposit_true_track(particle, allocator, history);
        let resolution = self.detector.electron_resolution(&true_track);
        let smeared = self.smear_track(&true_track, resolution, allocator);
        if self.detector.electron_acceptance(&smeared, &mut self.rng) {
            self.keep_smeared_track(&true_track, smeared, history);
        } else {
            debug!(track = %smeared.uid(), "electron track rejected");
        }
        Ok(())
    }

    fn simulate_muon(
        &mut self,
        particle: &mut Particle,
        allocator: &mut IdAllocator,
        history: &mut History,
    ) -> PflowResult<()> {
        let mut path = Path::new(self.trajectory(particle));
        path.propagate_to(&self.detector.ecal().volume().inner)?;
        path.propagate_to(&self.detector.hcal().volume().inner)?;
        particle.set_path(path);
        let true_track = self.deposit_true_track(particle, allocator, history);
        let resolution = self.detector.muon_resolution(&true_track);
        let smeared = self.smear_track(&true_track, resolution, allocator);
        if self.detector.muon_acceptance(&smeared, &mut self.rng) {
            self.keep_smeared_track(&true_track, smeared, history);
        } else {
            debug!(track = %smeared.uid(), "muon track rejected");
        }
        Ok(())
    }

    fn simulate_neutrino(&mut self, particle: &mut Particle) -> PflowResult<()> {
        // propagated for bookkeeping only, nothing is deposited
        let mut path = Path::new(self.trajectory(particle));
        path.propagate_to(&self.detector.hcal().volume().outer)?;
        particle.set_path(path);
        Ok(())
    }

    fn simulate_hadron(
        &mut self,
        particle: &mut Particle,
        allocator: &mut IdAllocator,
        history: &mut History,
    ) -> PflowResult<()> {
        let species = particle.species();
        let mut path = Path::new(self.trajectory(particle));
        let (time_ecal_in, _) = path.propagate_to(&self.detector.ecal().volume().inner)?;
        particle.set_path(path);

        if particle.charge() != 0.0 {
            let true_track = self.deposit_true_track(particle, allocator, history);
            let resolution = self.detector.tracker().pt_resolution(&true_track);
            let smeared = self.smear_track(&true_track, resolution, allocator);
            if self.detector.tracker().acceptance(&smeared, &mut self.rng) {
                self.keep_smeared_track(&true_track, smeared, history);
            } else {
                debug!(track = %smeared.uid(), "hadron track rejected");
            }
        }

        // the hadron may shower early inside the ecal and leave a fraction
        // of its energy there
        let mut frac_ecal = 0.0;
        let path_length = self
            .detector
            .ecal()
            .material()
            .path_length(species, &mut self.rng);
        if path_length.is_finite() {
            let path = particle.path_mut().ok_or_else(|| {
                PflowError::Simulation("hadron path missing after propagation".into())
            })?;
            let time_decay = time_ecal_in + path.trajectory.delta_time(path_length);
            let decay_point = path.trajectory.point_at_time(time_decay);
            if self.detector.ecal().volume().contains(&decay_point) {
                frac_ecal = self.rng.gen_range(0.0..0.7);
                path.set_point(SurfaceKey::EcalDecay, decay_point);
                self.deposit_cluster(
                    particle,
                    Layer::Ecal,
                    SurfaceKey::EcalDecay,
                    frac_ecal,
                    allocator,
                    history,
                );
            }
        }

        particle
            .path_mut()
            .ok_or_else(|| PflowError::Simulation("hadron path missing after propagation".into()))?
            .propagate_to(&self.detector.hcal().volume().inner)?;
        self.deposit_cluster(
            particle,
            Layer::Hcal,
            SurfaceKey::HcalIn,
            1.0 - frac_ecal,
            allocator,
            history,
        );
        Ok(())
    }

    /// Record the true deposit of `fraction` of the particle's energy at a
    /// point already on its path, then smear it.
    fn deposit_cluster(
        &mut self,
        particle: &mut Particle,
        layer: Layer,
        at: SurfaceKey,
        fraction: f64,
        allocator: &mut IdAllocator,
        history: &mut History,
    ) {
        let Some(position) = particle.path().and_then(|path| path.point(at)).copied() else {
            return;
        };
        let calorimeter = self.detector.calorimeter(layer);
        let size = calorimeter.cluster_size(particle.species());
        let cluster = Cluster::new(
            allocator,
            SubKind::True,
            layer,
            particle.e() * fraction,
            position,
            size,
            Some(particle.uid()),
        );
        history.add_child(particle.uid(), cluster.uid());
        particle.set_cluster(layer, cluster.uid());

        // hadronic deposits in the ecal are smeared with the hcal response,
        // matching the reconstruction's excess-energy test
        let smearing = match (layer, particle.species()) {
            (Layer::Ecal, Species::ChargedHadron | Species::NeutralHadron) => self.detector.hcal(),
            _ => calorimeter,
        };
        let eta = position.eta();
        let resolution = smearing.energy_resolution(cluster.energy(), eta);
        let response = smearing.energy_response(cluster.energy(), eta);
        let factor = gauss(&mut self.rng, response, resolution);
        let smeared = cluster.smeared(allocator, (cluster.energy() * factor).max(0.0));
        if smearing.acceptance(&smeared) {
            history.add_child(cluster.uid(), smeared.uid());
            match layer {
                Layer::Ecal => self.output.smeared_ecals.insert(smeared.uid(), smeared),
                Layer::Hcal => self.output.smeared_hcals.insert(smeared.uid(), smeared),
            };
        } else {
            debug!(cluster = %smeared.uid(), %layer, "cluster rejected");
        }
        match layer {
            Layer::Ecal => self.output.true_ecals.insert(cluster.uid(), cluster),
            Layer::Hcal => self.output.true_hcals.insert(cluster.uid(), cluster),
        };
    }

    fn deposit_true_track(
        &mut self,
        particle: &mut Particle,
        allocator: &mut IdAllocator,
        history: &mut History,
    ) -> Track {
        let path = particle
            .path()
            .cloned()
            .unwrap_or_else(|| Path::new(self.trajectory(particle)));
        let track = Track::new(
            allocator,
            SubKind::True,
            particle.p4().vec3(),
            particle.charge(),
            path,
            None,
        );
        history.add_child(particle.uid(), track.uid());
        particle.set_track(track.uid());
        self.output.true_tracks.insert(track.uid(), track.clone());
        track
    }

    fn smear_track(
        &mut self,
        track: &Track,
        resolution: f64,
        allocator: &mut IdAllocator,
    ) -> Track {
        let factor = gauss(&mut self.rng, 1.0, resolution).max(0.0);
        Track::new(
            allocator,
            SubKind::Smeared,
            track.p3() * factor,
            track.charge(),
            track.path().clone(),
            Some(track.uid()),
        )
    }

    fn keep_smeared_track(&mut self, true_track: &Track, smeared: Track, history: &mut History) {
        history.add_child(true_track.uid(), smeared.uid());
        self.output.smeared_tracks.insert(smeared.uid(), smeared);
    }
}

/// One standard normal draw scaled to `mu`, `sigma`, via the Box-Muller
/// transform (avoids a rand_distr dependency).
fn gauss(rng: &mut ChaCha8Rng, mu: f64, sigma: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.gen();
    mu + sigma * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}
