use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use crate::blocks::Block;
use crate::detector::{Calorimeter, Detector, Layer};
use crate::distance::LinkKind;
use crate::event::EventStore;
use crate::history::{Direction, History};
use crate::id::{IdAllocator, IdKind, Identifier, SubKind};
use crate::particle::{Particle, M_ELECTRON, M_K0, M_MUON, M_PION, PDG_K0L, PDG_PHOTON};
use crate::splitter::simplify_blocks;
use crate::track::Track;
use crate::utils::vectors::{ThreeVector, Vec3};

/// Significance threshold on the calorimeter excess over the track energy.
const NSIGMA: f64 = 2.0;

/// The split blocks and reconstructed particles of one event.
#[derive(Debug, Clone)]
pub struct ReconstructionOutput {
    /// Simplified blocks actually reconstructed ("bs").
    pub split_blocks: IndexMap<Identifier, Block>,
    /// Reconstructed particles ("pr").
    pub particles: IndexMap<Identifier, Particle>,
}

/// Turns blocks of linked tracks and clusters into particles.
///
/// Blocks are simplified first, then walked in descending identifier order
/// (most energetic first). Within a block, identified muons and electrons
/// are taken from their tracks, then each hcal cluster is resolved against
/// the tracks pointing at it, and whatever charge remains becomes charged
/// hadrons. Every element ends up locked by exactly one rule; leftovers are
/// reported.
pub struct Reconstructor<'a> {
    detector: &'a dyn Detector,
    store: &'a EventStore,
    locked: IndexSet<Identifier>,
    particles: IndexMap<Identifier, Particle>,
}

impl<'a> Reconstructor<'a> {
    /// Build a reconstructor over the event's collections.
    pub fn new(detector: &'a dyn Detector, store: &'a EventStore) -> Self {
        Self {
            detector,
            store,
            locked: IndexSet::new(),
            particles: IndexMap::new(),
        }
    }

    /// Simplify the given blocks and reconstruct each fragment.
    ///
    /// The input blocks are deactivated in place, superseded by the split
    /// blocks in the output.
    pub fn reconstruct(
        mut self,
        blocks: &mut IndexMap<Identifier, Block>,
        allocator: &mut IdAllocator,
        history: &mut History,
    ) -> ReconstructionOutput {
        let split = simplify_blocks(blocks, allocator, history);
        let mut order: Vec<Identifier> = split.keys().copied().collect();
        order.sort_unstable_by(|a, b| b.cmp(a));
        for uid in order {
            self.reconstruct_block(&split[&uid], allocator, history);
        }
        for block in split.values() {
            for &element in block.element_ids() {
                if !self.locked.contains(&element) {
                    warn!(%element, block = %block.uid(), "element left unused by reconstruction");
                }
            }
        }
        ReconstructionOutput {
            split_blocks: split,
            particles: self.particles,
        }
    }

    fn reconstruct_block(
        &mut self,
        block: &Block,
        allocator: &mut IdAllocator,
        history: &mut History,
    ) {
        // identified leptons first: their tracks must not be swallowed by
        // the calorimeter balancing below
        for &uid in block.element_ids() {
            if uid.kind() == IdKind::Track && !self.locked.contains(&uid) {
                if let Some(track) = self.store.track(uid) {
                    if self.is_from_pdgid(uid, 13, history) {
                        self.reconstruct_lepton(track, M_MUON, 13, block, allocator, history);
                    } else if self.is_from_pdgid(uid, 11, history) {
                        self.reconstruct_lepton(track, M_ELECTRON, 11, block, allocator, history);
                    }
                }
            }
        }

        // a lone unlocked element (whether the block was a singleton to
        // begin with, or the lepton pass claimed everything else) is
        // reconstructed on its own
        let unlocked: Vec<Identifier> = block
            .element_ids()
            .iter()
            .copied()
            .filter(|uid| !self.locked.contains(uid))
            .collect();
        if let [uid] = unlocked[..] {
            match uid.kind() {
                IdKind::EcalCluster => {
                    self.reconstruct_cluster(uid, Layer::Ecal, None, block, allocator, history);
                }
                IdKind::HcalCluster => {
                    self.reconstruct_cluster(uid, Layer::Hcal, None, block, allocator, history);
                }
                IdKind::Track => {
                    if let Some(track) = self.store.track(uid) {
                        self.reconstruct_track(track, block, allocator, history);
                    }
                }
                _ => {}
            }
            self.locked.insert(uid);
            return;
        }

        let mut hcals: Vec<Identifier> = block
            .element_ids()
            .iter()
            .copied()
            .filter(|uid| uid.kind() == IdKind::HcalCluster)
            .collect();
        hcals.sort_unstable_by(|a, b| b.cmp(a));
        for hcal in hcals {
            if !self.locked.contains(&hcal) {
                self.reconstruct_hcal(hcal, block, allocator, history);
            }
        }

        // tracks with no hcal: their momentum is all we know
        for &uid in block.element_ids() {
            if uid.kind() == IdKind::Track && !self.locked.contains(&uid) {
                if let Some(track) = self.store.track(uid) {
                    self.reconstruct_track(track, block, allocator, history);
                }
                // the ecal energy linked to such a track is dropped rather
                // than turned into photons, to avoid double counting
                for ecal in block.linked_ids(uid, LinkKind::EcalTrack) {
                    if self.locked.insert(ecal) {
                        debug!(%ecal, track = %uid, "ecal absorbed by leftover track");
                    }
                }
            }
        }
    }

    /// Resolve one hcal cluster against the unlocked tracks pointing at it.
    fn reconstruct_hcal(
        &mut self,
        hcal_id: Identifier,
        block: &Block,
        allocator: &mut IdAllocator,
        history: &mut History,
    ) {
        let Some(hcal) = self.store.cluster(hcal_id).cloned() else {
            return;
        };
        let mut tracks: Vec<&Track> = Vec::new();
        let mut ecal_energy = 0.0;
        for track_id in block.linked_ids(hcal_id, LinkKind::HcalTrack) {
            if self.locked.contains(&track_id) {
                continue;
            }
            let Some(track) = self.store.track(track_id) else {
                continue;
            };
            tracks.push(track);
            // the ecals seen by this track are accounted to this hcal
            for ecal_id in block.linked_ids(track_id, LinkKind::EcalTrack) {
                if self.locked.insert(ecal_id) {
                    if let Some(ecal) = self.store.cluster(ecal_id) {
                        ecal_energy += ecal.energy();
                    }
                }
            }
        }

        if tracks.is_empty() {
            self.reconstruct_cluster(hcal_id, Layer::Hcal, None, block, allocator, history);
            self.locked.insert(hcal_id);
            return;
        }

        let track_energy: f64 = tracks.iter().map(|track| track.energy()).sum();
        for track in &tracks {
            self.reconstruct_track(track, block, allocator, history);
        }

        let delta_e_rel = (hcal.energy() + ecal_energy) / track_energy - 1.0;
        let calo_res = self
            .detector
            .hcal()
            .energy_resolution(track_energy, hcal.position().eta());
        if delta_e_rel > NSIGMA * calo_res {
            // significant excess over the charged energy: make it neutral,
            // pointing from the hcal position even for the photon part
            let excess = delta_e_rel * track_energy;
            if excess <= ecal_energy {
                self.emit_from_position(
                    hcal.position(),
                    Layer::Ecal,
                    excess,
                    block,
                    allocator,
                    history,
                );
            } else if ecal_energy > 0.0 {
                self.emit_from_position(
                    hcal.position(),
                    Layer::Hcal,
                    excess - ecal_energy,
                    block,
                    allocator,
                    history,
                );
                self.emit_from_position(
                    hcal.position(),
                    Layer::Ecal,
                    ecal_energy,
                    block,
                    allocator,
                    history,
                );
            } else {
                self.emit_from_position(
                    hcal.position(),
                    Layer::Hcal,
                    excess,
                    block,
                    allocator,
                    history,
                );
            }
        }
        self.locked.insert(hcal_id);
    }

    /// Whether the element descends from a simulated particle with the
    /// given absolute PDG code.
    fn is_from_pdgid(&self, uid: Identifier, pdgid: i32, history: &History) -> bool {
        history
            .breadth_first(uid, Direction::Parents)
            .into_iter()
            .filter(|ancestor| ancestor.kind() == IdKind::Particle)
            .filter_map(|ancestor| self.store.particle(ancestor))
            .any(|particle| particle.pdgid().abs() == pdgid)
    }

    fn reconstruct_lepton(
        &mut self,
        track: &Track,
        mass: f64,
        pdgid_abs: i32,
        block: &Block,
        allocator: &mut IdAllocator,
        history: &mut History,
    ) {
        let track = track.clone();
        let charge = track.charge();
        // negative lepton carries the positive code
        let pdgid = if charge < 0.0 { pdgid_abs } else { -pdgid_abs };
        let p4 = track.p3().with_mass(mass);
        let mut particle = Particle::new(
            allocator,
            SubKind::Reconstructed,
            p4,
            track.path().trajectory.origin(),
            charge,
            pdgid,
            1,
        );
        particle.set_track(track.uid());
        self.locked.insert(track.uid());
        self.insert_particle(particle, block, history);
    }

    fn reconstruct_track(
        &mut self,
        track: &Track,
        block: &Block,
        allocator: &mut IdAllocator,
        history: &mut History,
    ) {
        let charge = track.charge();
        let pdgid = if charge > 0.0 { 211 } else { -211 };
        let p4 = track.p3().with_mass(M_PION);
        let mut particle = Particle::new(
            allocator,
            SubKind::Reconstructed,
            p4,
            track.path().trajectory.origin(),
            charge,
            pdgid,
            1,
        );
        particle.set_track(track.uid());
        self.locked.insert(track.uid());
        self.insert_particle(particle, block, history);
    }

    /// Reconstruct a neutral particle from a cluster: a photon in the ecal,
    /// a neutral hadron in the hcal. `energy` overrides the cluster energy.
    fn reconstruct_cluster(
        &mut self,
        cluster_id: Identifier,
        layer: Layer,
        energy: Option<f64>,
        block: &Block,
        allocator: &mut IdAllocator,
        history: &mut History,
    ) {
        let Some(cluster) = self.store.cluster(cluster_id).cloned() else {
            return;
        };
        let energy = energy.unwrap_or_else(|| cluster.energy());
        if let Some(mut particle) =
            self.neutral_from(cluster.position(), layer, energy, allocator)
        {
            particle.set_cluster(layer, cluster_id);
            self.insert_particle(particle, block, history);
        }
        self.locked.insert(cluster_id);
    }

    fn emit_from_position(
        &mut self,
        position: Vec3,
        layer: Layer,
        energy: f64,
        block: &Block,
        allocator: &mut IdAllocator,
        history: &mut History,
    ) {
        if let Some(particle) = self.neutral_from(position, layer, energy, allocator) {
            self.insert_particle(particle, block, history);
        }
    }

    fn neutral_from(
        &self,
        position: Vec3,
        layer: Layer,
        energy: f64,
        allocator: &mut IdAllocator,
    ) -> Option<Particle> {
        let (pdgid, mass) = match layer {
            Layer::Ecal => (PDG_PHOTON, 0.0),
            Layer::Hcal => (PDG_K0L, M_K0),
        };
        if energy < mass {
            debug!(%layer, energy, "cluster below mass threshold");
            return None;
        }
        let momentum = (energy * energy - mass * mass).sqrt();
        let direction = position.normalize();
        let p3: Vec3 = direction * momentum;
        let p4 = p3.with_energy(energy);
        Some(Particle::new(
            allocator,
            SubKind::Reconstructed,
            p4,
            Vec3::zeros(),
            0.0,
            pdgid,
            1,
        ))
    }

    /// Store a reconstructed particle and link it below its block and every
    /// element of the block.
    fn insert_particle(&mut self, particle: Particle, block: &Block, history: &mut History) {
        history.add_child(block.uid(), particle.uid());
        for &element in block.element_ids() {
            history.add_child(element, particle.uid());
        }
        self.particles.insert(particle.uid(), particle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{build_blocks, edges_between};
    use crate::cluster::Cluster;
    use crate::detector::cms::Cms;
    use crate::distance::Ruler;
    use crate::event::Collection;
    use crate::particle::Species;
    use crate::path::{Path, SurfaceKey, Trajectory};
    use approx::assert_relative_eq;

    struct Fixture {
        detector: Cms,
        allocator: IdAllocator,
        history: History,
        store: EventStore,
        tracks: IndexMap<Identifier, Track>,
        clusters: IndexMap<Identifier, Cluster>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                detector: Cms::default(),
                allocator: IdAllocator::new(),
                history: History::new(),
                store: EventStore::new(),
                tracks: IndexMap::new(),
                clusters: IndexMap::new(),
            }
        }

        fn add_track(&mut self, p3: Vec3, charge: f64) -> Identifier {
            let p4 = p3.with_mass(M_PION);
            let mut path = Path::new(Trajectory::helix(&p4, charge, 3.8, Vec3::zeros()));
            path.propagate_to(&self.detector.ecal().volume().inner).unwrap();
            path.propagate_to(&self.detector.hcal().volume().inner).unwrap();
            let track = Track::new(&mut self.allocator, SubKind::Smeared, p3, charge, path, None);
            let uid = track.uid();
            self.tracks.insert(uid, track);
            uid
        }

        fn add_cluster(&mut self, layer: Layer, energy: f64, position: Vec3) -> Identifier {
            let size = match layer {
                Layer::Ecal => 0.04,
                Layer::Hcal => 0.2,
            };
            let cluster = Cluster::new(
                &mut self.allocator,
                SubKind::Merged,
                layer,
                energy,
                position,
                size,
                None,
            );
            let uid = cluster.uid();
            self.clusters.insert(uid, cluster);
            uid
        }

        fn run(mut self) -> ReconstructionOutput {
            let mut ids: Vec<Identifier> = Vec::new();
            if !self.tracks.is_empty() {
                let code = self.tracks.keys().next().unwrap().type_code();
                ids.extend(self.tracks.keys().copied());
                self.store
                    .add_collection(code, Collection::Tracks(self.tracks.clone()))
                    .unwrap();
            }
            for layer_kind in [IdKind::EcalCluster, IdKind::HcalCluster] {
                let group: IndexMap<Identifier, Cluster> = self
                    .clusters
                    .iter()
                    .filter(|(uid, _)| uid.kind() == layer_kind)
                    .map(|(uid, cluster)| (*uid, cluster.clone()))
                    .collect();
                if let Some(code) = group.keys().next().map(Identifier::type_code) {
                    ids.extend(group.keys().copied());
                    self.store
                        .add_collection(code, Collection::Clusters(group))
                        .unwrap();
                }
            }
            let edges = edges_between(&ids, &self.store, &Ruler);
            let blocks = build_blocks(
                &ids,
                &edges,
                SubKind::Reconstructed,
                &mut self.allocator,
                &mut self.history,
            );
            let mut blocks: IndexMap<Identifier, Block> =
                blocks.into_iter().map(|block| (block.uid(), block)).collect();
            Reconstructor::new(&self.detector, &self.store).reconstruct(
                &mut blocks,
                &mut self.allocator,
                &mut self.history,
            )
        }
    }

    #[test]
    fn lone_ecal_becomes_photon() {
        let mut fixture = Fixture::new();
        fixture.add_cluster(Layer::Ecal, 8.0, Vec3::new(1.3, 0.1, 0.0));
        let output = fixture.run();
        assert_eq!(output.particles.len(), 1);
        let photon = output.particles.values().next().unwrap();
        assert_eq!(photon.pdgid(), PDG_PHOTON);
        assert_relative_eq!(photon.p4().p(), photon.e());
        assert_relative_eq!(photon.e(), 8.0);
    }

    #[test]
    fn lone_hcal_becomes_neutral_hadron() {
        let mut fixture = Fixture::new();
        fixture.add_cluster(Layer::Hcal, 6.0, Vec3::new(1.9, -0.2, 0.3));
        let output = fixture.run();
        assert_eq!(output.particles.len(), 1);
        let hadron = output.particles.values().next().unwrap();
        assert_eq!(hadron.pdgid(), PDG_K0L);
        assert_relative_eq!(hadron.p4().m(), M_K0, epsilon = 1e-6);
        assert_relative_eq!(hadron.e(), 6.0);
    }

    #[test]
    fn sub_threshold_hcal_yields_nothing() {
        let mut fixture = Fixture::new();
        fixture.add_cluster(Layer::Hcal, 0.3, Vec3::new(1.9, 0.0, 0.0));
        let output = fixture.run();
        assert!(output.particles.is_empty());
    }

    #[test]
    fn balanced_track_and_hcal_give_one_charged_hadron() {
        let mut fixture = Fixture::new();
        let p3 = Vec3::new(20.0, 0.0, 0.0);
        let track_id = fixture.add_track(p3, 1.0);
        let hcal_point = *fixture.tracks[&track_id]
            .path()
            .point(SurfaceKey::HcalIn)
            .unwrap();
        fixture.add_cluster(Layer::Hcal, p3.norm(), hcal_point);
        let output = fixture.run();
        assert_eq!(output.particles.len(), 1);
        let hadron = output.particles.values().next().unwrap();
        assert_eq!(hadron.species(), Species::ChargedHadron);
        assert_eq!(hadron.pdgid(), 211);
        assert_relative_eq!(hadron.p4().p(), 20.0);
    }

    #[test]
    fn large_excess_adds_a_neutral_hadron() {
        let mut fixture = Fixture::new();
        let p3 = Vec3::new(10.0, 0.0, 0.0);
        let track_id = fixture.add_track(p3, -1.0);
        let hcal_point = *fixture.tracks[&track_id]
            .path()
            .point(SurfaceKey::HcalIn)
            .unwrap();
        // twice the track energy in the hcal
        fixture.add_cluster(Layer::Hcal, 2.0 * p3.norm(), hcal_point);
        let output = fixture.run();
        assert_eq!(output.particles.len(), 2);
        let pdgids: IndexSet<i32> = output
            .particles
            .values()
            .map(Particle::pdgid)
            .collect();
        assert!(pdgids.contains(&-211));
        assert!(pdgids.contains(&PDG_K0L));
        let total: f64 = output.particles.values().map(Particle::e).sum();
        assert!(total > 2.0 * p3.norm() * 0.95);
    }

    #[test]
    fn lone_track_is_a_charged_hadron() {
        let mut fixture = Fixture::new();
        let p3 = Vec3::new(0.0, 15.0, 2.0);
        fixture.add_track(p3, 1.0);
        let output = fixture.run();
        assert_eq!(output.particles.len(), 1);
        let hadron = output.particles.values().next().unwrap();
        assert_eq!(hadron.species(), Species::ChargedHadron);
        // the momentum is taken from the track unchanged
        assert_relative_eq!(hadron.p4().vec3().x, p3.x);
        assert_relative_eq!(hadron.p4().vec3().y, p3.y);
        assert_relative_eq!(hadron.p4().vec3().z, p3.z);
    }

    #[test]
    fn balanced_two_track_block_gives_only_charged_hadrons() {
        let mut fixture = Fixture::new();
        // same-sign tracks bend together and stay within the cluster extent
        let t1 = fixture.add_track(Vec3::new(12.0, 0.1, 0.0), 1.0);
        let t2 = fixture.add_track(Vec3::new(12.0, -0.1, 0.0), 1.0);
        let hcal_point = *fixture.tracks[&t1].path().point(SurfaceKey::HcalIn).unwrap();
        let total = fixture.tracks[&t1].energy() + fixture.tracks[&t2].energy();
        fixture.add_cluster(Layer::Hcal, total, hcal_point);
        let output = fixture.run();
        assert_eq!(output.particles.len(), 2);
        assert!(output
            .particles
            .values()
            .all(|particle| particle.species() == Species::ChargedHadron
                && particle.pdgid() == 211));
    }

    #[test]
    fn muon_track_is_identified_through_history() {
        let mut fixture = Fixture::new();
        let sim = Particle::new(
            &mut fixture.allocator,
            SubKind::Smeared,
            Vec3::new(30.0, 0.0, 0.0).with_mass(M_MUON),
            Vec3::zeros(),
            -1.0,
            13,
            1,
        );
        let track_id = fixture.add_track(Vec3::new(30.0, 0.0, 0.0), -1.0);
        fixture.history.add_child(sim.uid(), track_id);
        let mut sims = IndexMap::new();
        let code = sim.uid().type_code();
        sims.insert(sim.uid(), sim);
        fixture
            .store
            .add_collection(code, Collection::Particles(sims))
            .unwrap();
        let output = fixture.run();
        assert_eq!(output.particles.len(), 1);
        let muon = output.particles.values().next().unwrap();
        assert_eq!(muon.pdgid(), 13);
        assert_relative_eq!(muon.p4().m(), M_MUON, epsilon = 1e-6);
    }

    #[test]
    fn ecal_left_behind_by_a_muon_becomes_a_photon() {
        let mut fixture = Fixture::new();
        let sim = Particle::new(
            &mut fixture.allocator,
            SubKind::Smeared,
            Vec3::new(30.0, 0.0, 0.0).with_mass(M_MUON),
            Vec3::zeros(),
            -1.0,
            13,
            1,
        );
        let track_id = fixture.add_track(Vec3::new(30.0, 0.0, 0.0), -1.0);
        fixture.history.add_child(sim.uid(), track_id);
        let ecal_point = *fixture.tracks[&track_id]
            .path()
            .point(SurfaceKey::EcalIn)
            .unwrap();
        fixture.add_cluster(Layer::Ecal, 5.0, ecal_point);
        let mut sims = IndexMap::new();
        let code = sim.uid().type_code();
        sims.insert(sim.uid(), sim);
        fixture
            .store
            .add_collection(code, Collection::Particles(sims))
            .unwrap();
        let output = fixture.run();
        assert_eq!(output.particles.len(), 2);
        let pdgids: IndexSet<i32> = output
            .particles
            .values()
            .map(Particle::pdgid)
            .collect();
        assert!(pdgids.contains(&13));
        assert!(pdgids.contains(&PDG_PHOTON));
        let photon = output
            .particles
            .values()
            .find(|p| p.pdgid() == PDG_PHOTON)
            .unwrap();
        assert_relative_eq!(photon.e(), 5.0);
    }

    #[test]
    fn linked_ecal_and_hcal_are_split_apart() {
        let mut fixture = Fixture::new();
        // colinear clusters overlap angularly and land in one built block
        fixture.add_cluster(Layer::Ecal, 3.0, Vec3::new(1.3, 0.0, 0.0));
        fixture.add_cluster(Layer::Hcal, 5.0, Vec3::new(1.9, 0.0, 0.0));
        let output = fixture.run();
        assert_eq!(output.split_blocks.len(), 2);
        for block in output.split_blocks.values() {
            assert!(block.is_active());
            assert_eq!(block.uid().subkind(), SubKind::Smeared);
            assert_eq!(block.len(), 1);
        }
        let pdgids: IndexSet<i32> = output.particles.values().map(Particle::pdgid).collect();
        assert!(pdgids.contains(&PDG_PHOTON));
        assert!(pdgids.contains(&PDG_K0L));
    }
}
