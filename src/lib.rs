//! A particle-flow simulation and reconstruction toolkit.
//!
//! Generated particles are propagated through a parametrized detector model,
//! deposit energy as tracks and calorimeter clusters, and are then rebuilt
//! into physics objects by linking those deposits back together. The chain
//! mirrors the particle-flow approach used at collider experiments:
//!
//! 1. **Simulation** ([`simulator`]): each stable particle follows a
//!    straight line or a helix through the magnetic field, leaving true
//!    deposits which are smeared by the detector resolutions and filtered
//!    by its acceptance.
//! 2. **Merging** ([`merger`]): overlapping clusters in one calorimeter are
//!    combined.
//! 3. **Linking** ([`distance`], [`blocks`]): tracks and clusters that point
//!    at each other are tied into blocks.
//! 4. **Reconstruction** ([`splitter`], [`reconstructor`]): blocks are
//!    simplified and resolved into photons, hadrons and leptons.
//!
//! Every object carries a packed 64-bit [`Identifier`](id::Identifier)
//! encoding what it is, which stage produced it and how energetic it is,
//! and every production step is recorded in an append-only provenance
//! graph ([`history::History`]). Events are fully deterministic for a
//! given detector, input and seed.
//!
//! ```rust,no_run
//! use pflow::detector::cms::Cms;
//! use pflow::particle::{GenParticle, PDG_PHOTON};
//! use pflow::pipeline::process_event;
//! use pflow::utils::vectors::{ThreeVector, Vec3};
//!
//! let detector = Cms::default();
//! let photon = GenParticle::stable(Vec3::new(10.0, 0.0, 0.0).with_mass(0.0), 0.0, PDG_PHOTON);
//! let event = process_event(&detector, &[photon], 42)?;
//! for uid in event.reconstructed_ids() {
//!     println!("{}", event.store.particle(uid).unwrap());
//! }
//! # Ok::<(), pflow::PflowError>(())
//! ```

use thiserror::Error;

/// Blocks of linked elements and the flood-fill that builds them.
pub mod blocks;
/// Calorimeter clusters.
pub mod cluster;
/// Detector geometry, materials and response traits.
pub mod detector;
/// Pairwise linking rules between detector elements.
pub mod distance;
/// Per-event object collections.
pub mod event;
/// Generic edges and subgraph construction.
pub mod graph;
/// The append-only provenance graph.
pub mod history;
/// Packed identifiers and their allocator.
pub mod id;
/// Cluster merging.
pub mod merger;
/// Particles, generated and reconstructed.
pub mod particle;
/// Trajectories and surface crossings.
pub mod path;
/// The full per-event processing chain.
pub mod pipeline;
/// Block resolution into particles.
pub mod reconstructor;
/// Detector response simulation.
pub mod simulator;
/// Block simplification before reconstruction.
pub mod splitter;
/// Charged-particle tracks.
pub mod track;
/// Vector types and kinematic helpers.
pub mod utils;

/// A convenience alias for a `Result` with this crate's error type.
pub type PflowResult<T> = Result<T, PflowError>;

/// The error type produced anywhere in the processing chain.
///
/// Propagation and simulation failures abort the whole event rather than
/// silently dropping the particle that caused them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PflowError {
    /// A trajectory has no forward crossing with a surface it must reach,
    /// e.g. a low-momentum track curling up inside the tracker.
    #[error("trajectory never crosses surface \"{surface}\"")]
    Propagation {
        /// The surface that was not reached.
        surface: String,
    },
    /// The simulation was handed something it cannot process.
    #[error("simulation error: {0}")]
    Simulation(String),
    /// A collection was registered twice under the same type code.
    #[error("a collection with code \"{code}\" is already registered in this event")]
    DuplicateCollection {
        /// The offending type code.
        code: String,
    },
    /// A string failed to parse into one of this crate's types.
    #[error("failed to parse string: \"{name}\" does not correspond to a valid \"{object}\"")]
    ParseError {
        /// The string which was parsed.
        name: String,
        /// The name of the type it failed to parse into.
        object: String,
    },
}

pub use crate::event::EventStore;
pub use crate::history::History;
pub use crate::id::{IdAllocator, Identifier};
pub use crate::pipeline::{process_event, PflowEvent};
