use indexmap::IndexMap;
use tracing::info;

use crate::blocks::{build_blocks, edges_between, Block};
use crate::detector::Detector;
use crate::distance::Ruler;
use crate::event::{Collection, EventStore};
use crate::history::History;
use crate::id::{IdAllocator, IdKind, Identifier, SubKind, TypeCode};
use crate::merger::merge_clusters;
use crate::particle::GenParticle;
use crate::reconstructor::Reconstructor;
use crate::simulator::Simulator;
use crate::PflowResult;

/// One fully processed event: every collection produced along the way plus
/// the provenance graph connecting them.
#[derive(Debug, Default, Clone)]
pub struct PflowEvent {
    /// All collections, from simulated particles to reconstructed ones.
    pub store: EventStore,
    /// The append-only provenance graph over all identifiers.
    pub history: History,
}

impl PflowEvent {
    /// The reconstructed particle identifiers, if reconstruction ran.
    pub fn reconstructed_ids(&self) -> Vec<Identifier> {
        self.store
            .collection(TypeCode::new(IdKind::Particle, SubKind::Reconstructed))
            .map(|collection| collection.ids())
            .unwrap_or_default()
    }
}

/// Run the full chain on one event: simulate the generated particles, merge
/// the smeared clusters, link everything into blocks and reconstruct.
///
/// Identifiers restart from zero for every event, and the same detector,
/// particles and seed reproduce the same event exactly.
pub fn process_event(
    detector: &dyn Detector,
    particles: &[GenParticle],
    seed: u64,
) -> PflowResult<PflowEvent> {
    let mut allocator = IdAllocator::new();
    let mut history = History::new();
    let mut store = EventStore::new();

    let sim = Simulator::new(detector, seed).simulate(particles, &mut allocator, &mut history)?;
    info!(
        particles = sim.particles.len(),
        tracks = sim.smeared_tracks.len(),
        ecals = sim.smeared_ecals.len(),
        hcals = sim.smeared_hcals.len(),
        "simulated event"
    );

    let merged_ecals = merge_clusters(&sim.smeared_ecals, &Ruler, &mut allocator, &mut history);
    let merged_hcals = merge_clusters(&sim.smeared_hcals, &Ruler, &mut allocator, &mut history);

    let mut element_ids: Vec<Identifier> = Vec::new();
    element_ids.extend(sim.smeared_tracks.keys().copied());
    element_ids.extend(merged_ecals.keys().copied());
    element_ids.extend(merged_hcals.keys().copied());

    store.add_collection(
        TypeCode::new(IdKind::Particle, SubKind::Smeared),
        Collection::Particles(sim.particles),
    )?;
    store.add_collection(
        TypeCode::new(IdKind::Track, SubKind::True),
        Collection::Tracks(sim.true_tracks),
    )?;
    store.add_collection(
        TypeCode::new(IdKind::Track, SubKind::Smeared),
        Collection::Tracks(sim.smeared_tracks),
    )?;
    store.add_collection(
        TypeCode::new(IdKind::EcalCluster, SubKind::True),
        Collection::Clusters(sim.true_ecals),
    )?;
    store.add_collection(
        TypeCode::new(IdKind::EcalCluster, SubKind::Smeared),
        Collection::Clusters(sim.smeared_ecals),
    )?;
    store.add_collection(
        TypeCode::new(IdKind::HcalCluster, SubKind::True),
        Collection::Clusters(sim.true_hcals),
    )?;
    store.add_collection(
        TypeCode::new(IdKind::HcalCluster, SubKind::Smeared),
        Collection::Clusters(sim.smeared_hcals),
    )?;
    store.add_collection(
        TypeCode::new(IdKind::EcalCluster, SubKind::Merged),
        Collection::Clusters(merged_ecals),
    )?;
    store.add_collection(
        TypeCode::new(IdKind::HcalCluster, SubKind::Merged),
        Collection::Clusters(merged_hcals),
    )?;

    let edges = edges_between(&element_ids, &store, &Ruler);
    let built = build_blocks(
        &element_ids,
        &edges,
        SubKind::Reconstructed,
        &mut allocator,
        &mut history,
    );
    let mut built: IndexMap<Identifier, Block> =
        built.into_iter().map(|block| (block.uid(), block)).collect();

    let output =
        Reconstructor::new(detector, &store).reconstruct(&mut built, &mut allocator, &mut history);
    info!(
        blocks = output.split_blocks.len(),
        particles = output.particles.len(),
        "reconstructed event"
    );

    store.add_collection(
        TypeCode::new(IdKind::Block, SubKind::Reconstructed),
        Collection::Blocks(built),
    )?;
    store.add_collection(
        TypeCode::new(IdKind::Block, SubKind::Smeared),
        Collection::Blocks(output.split_blocks),
    )?;
    store.add_collection(
        TypeCode::new(IdKind::Particle, SubKind::Reconstructed),
        Collection::Particles(output.particles),
    )?;

    Ok(PflowEvent { store, history })
}
