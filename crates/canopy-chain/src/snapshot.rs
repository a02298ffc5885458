//! Whole-graph snapshots, with hashes as the internal references.

use std::collections::HashMap;

use borsh::{BorshDeserialize, BorshSerialize};
use canopy_primitives::{Buf20, Buf32, RollupTime};
use serde::{Deserialize, Serialize};

use crate::arena::NodeArena;
use crate::chain::Chain;
use crate::challenge::Challenge;
use crate::errors::SnapshotError;
use crate::inbox::PendingInbox;
use crate::leaves::LeafSet;
use crate::node::{ChildType, DisputableNode, Node};
use crate::params::ChainParams;
use crate::staker::{Staker, StakerSet};

/// Flat image of one node.
///
/// `prev_hash` is the creation-time parent hash (zero for the origin
/// node); it feeds hash verification even after the live backlink has
/// been severed, which `detached` records separately. The machine handle
/// is a cache and is never serialized; an external checkpoint store may
/// rehydrate it by `machine_hash`.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct NodeRecord {
    pub hash: Buf32,
    pub disputable: Option<DisputableNode>,
    pub machine_hash: Buf32,
    pub pending_top_hash: Buf32,
    pub link_type: u32,
    pub prev_hash: Buf32,
    pub detached: bool,
}

/// Flat image of one staker; location and challenge reference node and
/// challenge records by hash and contract address.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct StakerRecord {
    pub address: Buf20,
    pub location: Buf32,
    pub creation_time: RollupTime,
    pub challenge: Option<Buf20>,
}

/// Snapshot of the whole chain aggregate. Produced by [`Chain::marshal`],
/// consumed by [`Chain::unmarshal`]; record order is unspecified.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub contract: Buf20,
    pub params: ChainParams,
    pub pending_inbox: PendingInbox,
    pub nodes: Vec<NodeRecord>,
    pub leaf_hashes: Vec<Buf32>,
    pub stakers: Vec<StakerRecord>,
    pub challenges: Vec<Challenge>,
    pub latest_confirmed: Buf32,
}

impl ChainSnapshot {
    /// Encodes the snapshot as an opaque binary record.
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("snapshot encoding is infallible")
    }

    /// Decodes a snapshot produced by [`Self::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SnapshotError> {
        borsh::from_slice(bytes).map_err(|e| SnapshotError::Decode(e.to_string()))
    }
}

impl Chain {
    /// Emits a snapshot of the whole aggregate.
    pub fn marshal(&self) -> ChainSnapshot {
        let mut nodes = Vec::with_capacity(self.node_from_hash.len());
        for (&hash, &id) in &self.node_from_hash {
            let node = self.arena.get(id).expect("indexed node allocated");
            nodes.push(NodeRecord {
                hash,
                disputable: node.disputable().copied(),
                machine_hash: node.machine_hash(),
                pending_top_hash: node.pending_top_hash(),
                link_type: node.link_type().to_wire(),
                prev_hash: node.prev_hash(),
                detached: node.is_detached(),
            });
        }

        let leaf_hashes: Vec<Buf32> = self.leaves.hashes().copied().collect();
        let stakers: Vec<StakerRecord> = self
            .stakers
            .iter()
            .map(|staker| StakerRecord {
                address: staker.address(),
                location: self
                    .arena
                    .get(staker.location())
                    .expect("stake location allocated")
                    .hash(),
                creation_time: staker.creation_time(),
                challenge: staker.challenge(),
            })
            .collect();
        let challenges: Vec<Challenge> = self.challenges.values().cloned().collect();

        ChainSnapshot {
            contract: self.rollup_addr,
            params: self.params,
            pending_inbox: self.pending_inbox.clone(),
            nodes,
            leaf_hashes,
            stakers,
            challenges,
            latest_confirmed: self.latest_confirmed_hash(),
        }
    }

    /// Rebuilds a chain from a snapshot.
    ///
    /// References are by hash, so reconstruction is two-pass: every node
    /// is materialized and re-hashed first, then prev/successor wiring,
    /// leaves, challenges, stakers, and the latest confirmed node are
    /// resolved against the rebuilt index. Any unresolved reference fails
    /// the whole rebuild; no partial chain is returned.
    pub fn unmarshal(snapshot: &ChainSnapshot) -> Result<Self, SnapshotError> {
        let mut arena = NodeArena::new();
        let mut node_from_hash = HashMap::with_capacity(snapshot.nodes.len());

        for record in &snapshot.nodes {
            let link_type = ChildType::from_wire(record.link_type)
                .ok_or(SnapshotError::UnknownLinkType(record.link_type))?;
            let node = Node::materialize(
                record.prev_hash,
                link_type,
                record.disputable,
                record.machine_hash,
                record.pending_top_hash,
            );
            if node.hash() != record.hash {
                return Err(SnapshotError::HashMismatch {
                    recorded: record.hash,
                    computed: node.hash(),
                });
            }
            if node_from_hash.contains_key(&record.hash) {
                return Err(SnapshotError::DuplicateNode(record.hash));
            }
            let id = arena.insert(node);
            node_from_hash.insert(record.hash, id);
        }

        for record in &snapshot.nodes {
            if record.detached || record.prev_hash.is_zero() {
                continue;
            }
            let id = node_from_hash[&record.hash];
            let prev_id = *node_from_hash
                .get(&record.prev_hash)
                .ok_or(SnapshotError::UnknownPrev {
                    node: record.hash,
                    prev: record.prev_hash,
                })?;
            let link_type =
                ChildType::from_wire(record.link_type).expect("validated in first pass");
            arena
                .get_mut(id)
                .expect("materialized above")
                .set_prev(prev_id);
            arena
                .get_mut(prev_id)
                .expect("materialized above")
                .set_successor(link_type, record.hash);
        }

        let mut leaves = LeafSet::default();
        for &leaf_hash in &snapshot.leaf_hashes {
            let id = *node_from_hash
                .get(&leaf_hash)
                .ok_or(SnapshotError::UnknownLeaf(leaf_hash))?;
            if leaves.contains(&leaf_hash) {
                return Err(SnapshotError::DuplicateLeaf(leaf_hash));
            }
            leaves.add(leaf_hash, id);
        }

        let mut challenges = HashMap::with_capacity(snapshot.challenges.len());
        for challenge in &snapshot.challenges {
            if challenges
                .insert(challenge.contract(), challenge.clone())
                .is_some()
            {
                return Err(SnapshotError::DuplicateChallenge(challenge.contract()));
            }
        }

        let mut stakers = StakerSet::default();
        for record in &snapshot.stakers {
            let location =
                *node_from_hash
                    .get(&record.location)
                    .ok_or(SnapshotError::UnknownStakerLocation {
                        staker: record.address,
                        location: record.location,
                    })?;
            if let Some(contract) = record.challenge {
                if !challenges.contains_key(&contract) {
                    return Err(SnapshotError::UnknownChallenge {
                        staker: record.address,
                        contract,
                    });
                }
            }
            if stakers.get(&record.address).is_some() {
                return Err(SnapshotError::DuplicateStaker(record.address));
            }
            let mut staker = Staker::new(record.address, location, record.creation_time);
            staker.set_challenge(record.challenge);
            stakers.add(staker);
        }

        let latest_confirmed = *node_from_hash
            .get(&snapshot.latest_confirmed)
            .ok_or(SnapshotError::UnknownLatestConfirmed(snapshot.latest_confirmed))?;

        Ok(Chain {
            rollup_addr: snapshot.contract,
            params: snapshot.params,
            pending_inbox: snapshot.pending_inbox.clone(),
            latest_confirmed,
            leaves,
            arena,
            node_from_hash,
            stakers,
            challenges,
            latest_block_height: 0,
        })
    }
}
