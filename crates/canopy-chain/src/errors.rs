//! Failure types for snapshot reconstruction.

use canopy_primitives::{Buf20, Buf32};
use thiserror::Error;

/// Why a snapshot could not be rebuilt into a chain.
///
/// Every variant means the snapshot is corrupt or incomplete; no partial
/// chain is ever returned alongside one of these.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum SnapshotError {
    /// A node record names a prev hash with no node record of its own.
    #[error("node {node} references unknown prev {prev}")]
    UnknownPrev { node: Buf32, prev: Buf32 },

    /// A leaf hash does not resolve to any node record.
    #[error("leaf hash {0} does not resolve to a node")]
    UnknownLeaf(Buf32),

    /// A staker record's location does not resolve to any node record.
    #[error("staker {staker} located at unknown node {location}")]
    UnknownStakerLocation { staker: Buf20, location: Buf32 },

    /// A staker record names a challenge contract with no challenge record.
    #[error("staker {staker} references unknown challenge {contract}")]
    UnknownChallenge { staker: Buf20, contract: Buf20 },

    /// The latest-confirmed hash does not resolve to any node record.
    #[error("latest confirmed hash {0} does not resolve to a node")]
    UnknownLatestConfirmed(Buf32),

    /// A node record carries a link type outside the closed enum.
    #[error("unknown link type {0}")]
    UnknownLinkType(u32),

    /// A node record's stored hash disagrees with the hash recomputed
    /// from its fields.
    #[error("node record {recorded} rehashes to {computed}")]
    HashMismatch { recorded: Buf32, computed: Buf32 },

    /// Two node records share a hash.
    #[error("duplicate node record {0}")]
    DuplicateNode(Buf32),

    /// The leaf list names the same hash twice.
    #[error("duplicate leaf hash {0}")]
    DuplicateLeaf(Buf32),

    /// Two staker records share an address.
    #[error("duplicate staker record {0}")]
    DuplicateStaker(Buf20),

    /// Two challenge records share a contract address.
    #[error("duplicate challenge record {0}")]
    DuplicateChallenge(Buf20),

    /// The raw snapshot bytes failed to decode.
    #[error("snapshot decode: {0}")]
    Decode(String),
}
