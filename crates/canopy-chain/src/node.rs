//! Node entity of the rollup tree and its hash derivation.

use std::sync::Arc;

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use canopy_primitives::{hash, Buf32, Machine, RollupTime};
use serde::{Deserialize, Serialize};

use crate::arena::NodeId;

/// Kind of parent-to-child edge in the rollup tree.
///
/// Wire values are fixed by the on-chain contract: an assertion extends a
/// leaf with one `Valid` child and one child per way the assertion could
/// be wrong.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Arbitrary, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChildType {
    Valid = 0,
    InvalidPending = 1,
    InvalidMessages = 2,
    InvalidExecution = 3,
}

impl ChildType {
    /// Number of child slots on every node.
    pub const COUNT: usize = 4;

    pub const ALL: [ChildType; 4] = [
        ChildType::Valid,
        ChildType::InvalidPending,
        ChildType::InvalidMessages,
        ChildType::InvalidExecution,
    ];

    /// The invalid kinds, in wire order.
    pub const INVALID: [ChildType; 3] = [
        ChildType::InvalidPending,
        ChildType::InvalidMessages,
        ChildType::InvalidExecution,
    ];

    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            0 => Some(ChildType::Valid),
            1 => Some(ChildType::InvalidPending),
            2 => Some(ChildType::InvalidMessages),
            3 => Some(ChildType::InvalidExecution),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u32 {
        self as u32
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// The portion of an assertion subject to challenge: the assertion's data
/// hash commitment, the pending-inbox top it claims, and the deadline by
/// which a challenger must act.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct DisputableNode {
    hash: Buf32,
    pending_top_hash: Buf32,
    deadline: RollupTime,
}

impl DisputableNode {
    pub fn new(hash: Buf32, pending_top_hash: Buf32, deadline: RollupTime) -> Self {
        Self {
            hash,
            pending_top_hash,
            deadline,
        }
    }

    pub fn hash(&self) -> Buf32 {
        self.hash
    }

    pub fn pending_top_hash(&self) -> Buf32 {
        self.pending_top_hash
    }

    pub fn deadline(&self) -> RollupTime {
        self.deadline
    }
}

/// Computes the deterministic node hash the on-chain contract assigns to a
/// node, from the parent hash (zero for the origin node), the disputable
/// data hash (zero for the origin node), the link type, and the machine
/// state hash.
///
/// The construction is three packed Keccak-256 layers:
/// `keccak(prev || keccak(disputable || uint256(linkType) || keccak(machine)))`.
pub fn node_hash(
    prev_hash: Buf32,
    disputable_hash: Buf32,
    link_type: ChildType,
    machine_hash: Buf32,
) -> Buf32 {
    let proto_state = hash::keccak(machine_hash.as_slice());
    let link_word = hash::uint256_word(u64::from(link_type.to_wire()));
    let inner = hash::keccak_iter([
        disputable_hash.as_slice(),
        &link_word,
        proto_state.as_slice(),
    ]);
    hash::keccak_iter([prev_hash.as_slice(), inner.as_slice()])
}

/// One position in the rollup tree.
///
/// Nodes are owned by the chain's arena and indexed by hash; `prev` is an
/// arena id so a node that has left the hash index stays addressable by
/// its children until reclamation frees it. The `machine` handle is a
/// cache: it never participates in the hash and is never serialized.
#[derive(Clone, Debug)]
pub struct Node {
    hash: Buf32,
    disputable: Option<DisputableNode>,
    machine_hash: Buf32,
    machine: Option<Arc<dyn Machine>>,
    pending_top_hash: Buf32,
    /// Hash of the parent at creation time. Part of the node's identity:
    /// it feeds the hash derivation and survives detachment. Zero for the
    /// origin node.
    prev_hash: Buf32,
    /// Live backlink to the parent; severed by reclamation.
    prev: Option<NodeId>,
    link_type: ChildType,
    has_successors: bool,
    successor_hashes: [Buf32; ChildType::COUNT],
}

impl Node {
    fn make(
        prev: Option<NodeId>,
        prev_hash: Buf32,
        link_type: ChildType,
        disputable: Option<DisputableNode>,
        machine_hash: Buf32,
        machine: Option<Arc<dyn Machine>>,
        pending_top_hash: Buf32,
    ) -> Self {
        let disputable_hash = disputable.map(|d| d.hash()).unwrap_or_else(Buf32::zero);
        Self {
            hash: node_hash(prev_hash, disputable_hash, link_type, machine_hash),
            disputable,
            machine_hash,
            machine,
            pending_top_hash,
            prev_hash,
            prev,
            link_type,
            has_successors: false,
            successor_hashes: [Buf32::zero(); ChildType::COUNT],
        }
    }

    /// The chain's origin node: no parent, no disputable data (its hash
    /// derivation substitutes a zero disputable hash), `Valid` link.
    pub(crate) fn new_origin(
        machine_hash: Buf32,
        machine: Option<Arc<dyn Machine>>,
        pending_top_hash: Buf32,
    ) -> Self {
        Self::make(
            None,
            Buf32::zero(),
            ChildType::Valid,
            None,
            machine_hash,
            machine,
            pending_top_hash,
        )
    }

    /// A child node created by an assertion on `prev`.
    pub(crate) fn new_child(
        prev: NodeId,
        prev_hash: Buf32,
        link_type: ChildType,
        disputable: DisputableNode,
        machine_hash: Buf32,
        machine: Option<Arc<dyn Machine>>,
        pending_top_hash: Buf32,
    ) -> Self {
        Self::make(
            Some(prev),
            prev_hash,
            link_type,
            Some(disputable),
            machine_hash,
            machine,
            pending_top_hash,
        )
    }

    /// Rebuilds a node from snapshot fields, with prev and successor wiring
    /// left for the caller's second pass. The hash is recomputed, not
    /// trusted.
    pub(crate) fn materialize(
        prev_hash: Buf32,
        link_type: ChildType,
        disputable: Option<DisputableNode>,
        machine_hash: Buf32,
        pending_top_hash: Buf32,
    ) -> Self {
        Self::make(
            None,
            prev_hash,
            link_type,
            disputable,
            machine_hash,
            None,
            pending_top_hash,
        )
    }

    pub fn hash(&self) -> Buf32 {
        self.hash
    }

    pub fn disputable(&self) -> Option<&DisputableNode> {
        self.disputable.as_ref()
    }

    pub fn machine_hash(&self) -> Buf32 {
        self.machine_hash
    }

    pub fn machine(&self) -> Option<&dyn Machine> {
        self.machine.as_deref()
    }

    pub fn pending_top_hash(&self) -> Buf32 {
        self.pending_top_hash
    }

    /// Hash of the parent this node was created under; zero for the
    /// origin node. Unlike the live backlink, this never changes.
    pub fn prev_hash(&self) -> Buf32 {
        self.prev_hash
    }

    /// Whether the live backlink to the parent has been severed.
    pub fn is_detached(&self) -> bool {
        self.prev.is_none()
    }

    pub fn link_type(&self) -> ChildType {
        self.link_type
    }

    pub fn has_successors(&self) -> bool {
        self.has_successors
    }

    /// Hash of the child in the given slot, or zero if the slot is empty.
    pub fn successor_hash(&self, kind: ChildType) -> Buf32 {
        self.successor_hashes[kind.index()]
    }

    pub(crate) fn prev(&self) -> Option<NodeId> {
        self.prev
    }

    pub(crate) fn set_prev(&mut self, prev: NodeId) {
        self.prev = Some(prev);
    }

    pub(crate) fn take_prev(&mut self) -> Option<NodeId> {
        self.prev.take()
    }

    pub(crate) fn machine_handle(&self) -> Option<Arc<dyn Machine>> {
        self.machine.clone()
    }

    pub(crate) fn set_successor(&mut self, kind: ChildType, hash: Buf32) {
        self.successor_hashes[kind.index()] = hash;
        self.has_successors = true;
    }

    pub(crate) fn clear_successor(&mut self, kind: ChildType) {
        self.successor_hashes[kind.index()] = Buf32::zero();
    }

    pub(crate) fn has_any_successor(&self) -> bool {
        self.successor_hashes.iter().any(|h| !h.is_zero())
    }
}

/// Nodes are equal iff their hashes are equal; the hash commits to every
/// identity-bearing field.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for Node {}
