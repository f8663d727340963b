use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::PflowError;

/// The kind of object an [`Identifier`] refers to.
///
/// Discriminants occupy the top three bits of an identifier, so identifiers
/// of different kinds sort in this order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum IdKind {
    /// An energy deposit in the electromagnetic calorimeter.
    EcalCluster = 1,
    /// An energy deposit in the hadronic calorimeter.
    HcalCluster = 2,
    /// A track in the tracking volume.
    Track = 3,
    /// A generated, simulated or reconstructed particle.
    Particle = 4,
    /// A connected block of linked detector elements.
    Block = 5,
}

impl IdKind {
    fn from_bits(bits: u64) -> Self {
        match bits {
            1 => IdKind::EcalCluster,
            2 => IdKind::HcalCluster,
            3 => IdKind::Track,
            4 => IdKind::Particle,
            5 => IdKind::Block,
            _ => panic!("invalid identifier kind bits {bits}"),
        }
    }

    /// One-letter tag used in collection codes and pretty printing.
    pub fn letter(&self) -> char {
        match self {
            IdKind::EcalCluster => 'e',
            IdKind::HcalCluster => 'h',
            IdKind::Track => 't',
            IdKind::Particle => 'p',
            IdKind::Block => 'b',
        }
    }
}

/// The provenance stage of an object, stored as one ASCII character inside
/// its [`Identifier`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SubKind {
    /// A generated (generator-level) object.
    Generated,
    /// A merged object combining several overlapping ones.
    Merged,
    /// A reconstructed object.
    Reconstructed,
    /// A smeared detector response, or a block produced by splitting.
    ///
    /// Smeared tracks/clusters and split blocks share this tag.
    Smeared,
    /// A true (unsmeared) detector response.
    True,
    /// No particular provenance stage.
    Unspecified,
}

impl SubKind {
    /// The character stored in the identifier.
    pub fn letter(&self) -> char {
        match self {
            SubKind::Generated => 'g',
            SubKind::Merged => 'm',
            SubKind::Reconstructed => 'r',
            SubKind::Smeared => 's',
            SubKind::True => 't',
            SubKind::Unspecified => 'u',
        }
    }

    fn from_letter(c: char) -> Option<Self> {
        match c {
            'g' => Some(SubKind::Generated),
            'm' => Some(SubKind::Merged),
            'r' => Some(SubKind::Reconstructed),
            's' => Some(SubKind::Smeared),
            't' => Some(SubKind::True),
            'u' => Some(SubKind::Unspecified),
            _ => None,
        }
    }
}

const KIND_SHIFT: u32 = 61;
const SUBKIND_SHIFT: u32 = 53;
const VALUE_SHIFT: u32 = 21;
const COUNTER_BITS: u32 = 21;
const COUNTER_MASK: u64 = (1 << COUNTER_BITS) - 1;

/// Map an `f32` to a `u32` whose unsigned ordering matches the float
/// ordering, so packed identifiers compare by sort value without unpacking.
fn ordered_bits(value: f32) -> u32 {
    let bits = value.to_bits();
    if bits & 0x8000_0000 != 0 {
        !bits
    } else {
        bits | 0x8000_0000
    }
}

fn from_ordered_bits(bits: u32) -> f32 {
    f32::from_bits(if bits & 0x8000_0000 != 0 {
        bits & 0x7fff_ffff
    } else {
        !bits
    })
}

/// A packed 64-bit key for every object produced during one event.
///
/// Bit layout (MSB → LSB): 3-bit [`IdKind`], 8-bit [`SubKind`] character,
/// 32-bit order-preserving encoding of an `f32` sort value (typically the
/// object's energy), 21-bit per-event counter. Identifiers therefore sort by
/// kind, then sub-kind, then value, then creation order; reconstruction
/// relies on this to process the highest-energy elements first.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Identifier(u64);

impl Identifier {
    /// The kind encoded in this identifier.
    pub fn kind(&self) -> IdKind {
        IdKind::from_bits(self.0 >> KIND_SHIFT)
    }

    /// The sub-kind encoded in this identifier.
    pub fn subkind(&self) -> SubKind {
        let c = ((self.0 >> SUBKIND_SHIFT) & 0xff) as u8 as char;
        SubKind::from_letter(c).expect("identifier holds an invalid sub-kind character")
    }

    /// The sort value, decoded back to `f64`.
    pub fn value(&self) -> f64 {
        from_ordered_bits(((self.0 >> VALUE_SHIFT) & 0xffff_ffff) as u32) as f64
    }

    /// The per-event sequence number.
    pub fn counter(&self) -> u64 {
        self.0 & COUNTER_MASK
    }

    /// The raw packed value.
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// The two-character collection code `(kind letter, sub-kind letter)`.
    pub fn type_code(&self) -> TypeCode {
        TypeCode::new(self.kind(), self.subkind())
    }

    /// Whether this identifier refers to an ecal cluster.
    pub fn is_ecal(&self) -> bool {
        self.kind() == IdKind::EcalCluster
    }
    /// Whether this identifier refers to an hcal cluster.
    pub fn is_hcal(&self) -> bool {
        self.kind() == IdKind::HcalCluster
    }
    /// Whether this identifier refers to a track.
    pub fn is_track(&self) -> bool {
        self.kind() == IdKind::Track
    }
    /// Whether this identifier refers to a particle.
    pub fn is_particle(&self) -> bool {
        self.kind() == IdKind::Particle
    }
    /// Whether this identifier refers to a block.
    pub fn is_block(&self) -> bool {
        self.kind() == IdKind::Block
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.kind().letter(),
            self.subkind().letter(),
            self.counter()
        )
    }
}

/// A two-character code naming one collection in an
/// [`EventStore`](crate::event::EventStore), e.g. `ts` for smeared tracks or
/// `em` for merged ecal clusters.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TypeCode {
    /// The object kind.
    pub kind: IdKind,
    /// The provenance stage.
    pub subkind: SubKind,
}

impl TypeCode {
    /// Build a code from its parts.
    pub const fn new(kind: IdKind, subkind: SubKind) -> Self {
        Self { kind, subkind }
    }
}

impl Display for TypeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.kind.letter(), self.subkind.letter())
    }
}

impl FromStr for TypeCode {
    type Err = PflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse_err = || PflowError::ParseError {
            name: s.to_string(),
            object: "TypeCode".to_string(),
        };
        let mut chars = s.chars();
        let (k, sk) = match (chars.next(), chars.next(), chars.next()) {
            (Some(k), Some(sk), None) => (k, sk),
            _ => return Err(parse_err()),
        };
        let kind = match k {
            'e' => IdKind::EcalCluster,
            'h' => IdKind::HcalCluster,
            't' => IdKind::Track,
            'p' => IdKind::Particle,
            'b' => IdKind::Block,
            _ => return Err(parse_err()),
        };
        let subkind = SubKind::from_letter(sk).ok_or_else(parse_err)?;
        Ok(TypeCode::new(kind, subkind))
    }
}

/// Allocates sequence numbers for [`Identifier`]s.
///
/// One allocator is created (or [`reset`](IdAllocator::reset)) per event and
/// passed explicitly to every component that mints identifiers; there is no
/// hidden global counter.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    /// Create an allocator starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the counter at the start of a new event.
    pub fn reset(&mut self) {
        self.next = 0;
    }

    /// Mint the next identifier for the given kind, sub-kind and sort value.
    ///
    /// Panics if more than $`2^{21}`$ identifiers are requested in one event;
    /// that is a programming error, not a recoverable condition.
    pub fn make(&mut self, kind: IdKind, subkind: SubKind, value: f64) -> Identifier {
        let counter = self.next;
        assert!(
            counter <= COUNTER_MASK,
            "identifier counter overflow: more than 2^21 objects in one event"
        );
        self.next += 1;
        let id = Identifier(
            ((kind as u64) << KIND_SHIFT)
                | ((subkind.letter() as u64) << SUBKIND_SHIFT)
                | ((ordered_bits(value as f32) as u64) << VALUE_SHIFT)
                | counter,
        );
        debug_assert_eq!(id.kind(), kind);
        debug_assert_eq!(id.subkind(), subkind);
        debug_assert_eq!(id.counter(), counter);
        id
    }
}
