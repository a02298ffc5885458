//! Validator-side state machine mirroring the on-chain dispute protocol of
//! an optimistic rollup.
//!
//! The [`Chain`] aggregate maintains the tree of assertion nodes rooted at
//! the latest confirmed node, the set of unextended leaves, the stakers
//! bonded to tree positions, and the challenges open between staker pairs.
//! An external event driver applies on-chain events through the mutator
//! methods; the whole aggregate snapshots to a binary record and back.
//!
//! Node hashes are Keccak-256 over packed fields, bit-identical to the
//! hashes the on-chain contract computes, so they serve as references both
//! locally and on-chain.

mod arena;
mod chain;
mod challenge;
mod errors;
mod inbox;
mod leaves;
mod node;
mod params;
mod snapshot;
mod staker;

pub use chain::Chain;
pub use challenge::{Challenge, ChallengeKind};
pub use errors::SnapshotError;
pub use inbox::PendingInbox;
pub use leaves::LeafSet;
pub use node::{node_hash, ChildType, DisputableNode, Node};
pub use params::ChainParams;
pub use snapshot::{ChainSnapshot, NodeRecord, StakerRecord};
pub use staker::{Staker, StakerSet};
