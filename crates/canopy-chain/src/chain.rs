//! The chain aggregate and its event-handler API.
//!
//! One logical actor drives all mutations in the order the on-chain event
//! source emits them; no method blocks, re-enters, or runs concurrently
//! with another. Precondition violations are programmer errors on the
//! driver's side and abort the process.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use canopy_primitives::{hash, Buf20, Buf32, Machine, RollupTime};
use tracing::debug;

use crate::arena::{NodeArena, NodeId};
use crate::challenge::{Challenge, ChallengeKind};
use crate::inbox::PendingInbox;
use crate::leaves::LeafSet;
use crate::node::{ChildType, DisputableNode, Node};
use crate::params::ChainParams;
use crate::staker::{Staker, StakerSet};

/// Local mirror of the on-chain rollup: the node tree rooted at the
/// latest confirmed node, its leaves, the stakers bonded to positions on
/// it, and the challenges open between them.
#[derive(Debug)]
pub struct Chain {
    pub(crate) rollup_addr: Buf20,
    pub(crate) params: ChainParams,
    pub(crate) pending_inbox: PendingInbox,
    pub(crate) latest_confirmed: NodeId,
    pub(crate) leaves: LeafSet,
    pub(crate) arena: NodeArena,
    pub(crate) node_from_hash: HashMap<Buf32, NodeId>,
    pub(crate) stakers: StakerSet,
    pub(crate) challenges: HashMap<Buf20, Challenge>,
    pub(crate) latest_block_height: u64,
}

impl Chain {
    /// Creates a chain whose only node commits to the given machine's
    /// state: no disputable data, no parent, pending top at the
    /// empty-inbox sentinel. The node starts out as both the latest
    /// confirmed node and the sole leaf.
    pub fn new(rollup_addr: Buf20, machine: &dyn Machine, params: ChainParams) -> Self {
        let mut arena = NodeArena::new();
        let mut leaves = LeafSet::default();
        let mut node_from_hash = HashMap::new();

        let origin = Node::new_origin(
            machine.hash(),
            Some(Arc::from(machine.clone_handle())),
            hash::empty_inbox_hash(),
        );
        let origin_hash = origin.hash();
        let origin_id = arena.insert(origin);
        node_from_hash.insert(origin_hash, origin_id);
        leaves.add(origin_hash, origin_id);
        debug!(%origin_hash, "created initial node");

        Self {
            rollup_addr,
            params,
            pending_inbox: PendingInbox::new(),
            latest_confirmed: origin_id,
            leaves,
            arena,
            node_from_hash,
            stakers: StakerSet::default(),
            challenges: HashMap::new(),
            latest_block_height: 0,
        }
    }

    /// Applies an assertion made on the leaf `prev_hash`: the leaf stops
    /// being a leaf and gains four children, one `Valid` child carrying
    /// the asserted post-state and one child per invalid kind carrying
    /// the parent's unchanged state. All four become leaves.
    ///
    /// Panics if `prev_hash` is not a current leaf.
    pub fn create_nodes_on_assert(
        &mut self,
        prev_hash: Buf32,
        disputable: DisputableNode,
        after_machine_hash: Buf32,
        after_machine: Option<&dyn Machine>,
        after_inbox_hash: Buf32,
    ) {
        let prev_id = self.expect_node(prev_hash, "assertion parent");
        if !self.leaves.contains(&prev_hash) {
            panic!("can't assert on non-leaf node {prev_hash}");
        }
        self.leaves.delete(&prev_hash);

        let (prev_machine_hash, prev_machine, prev_pending_top) = {
            let prev = self.arena.get(prev_id).expect("assertion parent allocated");
            (
                prev.machine_hash(),
                prev.machine_handle(),
                prev.pending_top_hash(),
            )
        };

        let after_machine: Option<Arc<dyn Machine>> =
            after_machine.map(|m| Arc::from(m.clone_handle()));
        let valid = Node::new_child(
            prev_id,
            prev_hash,
            ChildType::Valid,
            disputable,
            after_machine_hash,
            after_machine,
            disputable.pending_top_hash(),
        );
        self.attach_child(prev_id, valid);

        // the state does not advance on an invalid path
        for kind in ChildType::INVALID {
            let child = Node::new_child(
                prev_id,
                prev_hash,
                kind,
                disputable,
                prev_machine_hash,
                prev_machine.clone(),
                prev_pending_top,
            );
            self.attach_child(prev_id, child);
        }

        debug!(%prev_hash, %after_inbox_hash, "created assertion nodes");
    }

    fn attach_child(&mut self, prev_id: NodeId, child: Node) {
        let child_hash = child.hash();
        let link_type = child.link_type();
        let child_id = self.arena.insert(child);
        if self.node_from_hash.insert(child_hash, child_id).is_some() {
            panic!("node {child_hash} inserted twice");
        }
        self.arena
            .get_mut(prev_id)
            .expect("assertion parent allocated")
            .set_successor(link_type, child_hash);
        self.leaves.add(child_hash, child_id);
    }

    /// Marks the named node as confirmed on-chain. The node's backlink to
    /// its former parent is severed and anything that stops being
    /// reachable is reclaimed; the node itself stays indexed as the new
    /// root of the live subtree.
    pub fn confirm_node(&mut self, node_hash: Buf32) {
        let id = self.expect_node(node_hash, "confirmed node");
        self.latest_confirmed = id;
        self.remove_prev(id);
        self.reclaim();
        debug!(%node_hash, "confirmed node");
    }

    /// Drops the named node from the chain, detaching it from its parent
    /// and reclaiming whatever the removal orphans.
    pub fn prune_node(&mut self, node_hash: Buf32) {
        let id = self.expect_node(node_hash, "pruned node");
        self.node_from_hash.remove(&node_hash);
        self.leaves.delete(&node_hash);
        self.remove_prev(id);
        self.reclaim();
        debug!(%node_hash, "pruned node");
    }

    /// Severs the upward link of the given node and cascades: the former
    /// parent's child slot for this link type is zeroed, and a parent
    /// left with no children at all is severed from its own parent in
    /// turn.
    fn remove_prev(&mut self, id: NodeId) {
        let mut cur = id;
        loop {
            let node = self.arena.get_mut(cur).expect("node allocated");
            let Some(prev_id) = node.take_prev() else {
                return;
            };
            let link_type = node.link_type();

            let parent = self.arena.get_mut(prev_id).expect("parent allocated");
            parent.clear_successor(link_type);
            if parent.has_any_successor() {
                return;
            }
            cur = prev_id;
        }
    }

    /// Frees every node no longer reachable from the live roots: the
    /// latest confirmed node, the current leaves, and every staker's
    /// location. Liveness follows `prev` links, so a detached ancestor
    /// stays allocated while any live descendant still points at it.
    fn reclaim(&mut self) {
        let mut stack: Vec<NodeId> = vec![self.latest_confirmed];
        stack.extend(self.leaves.ids());
        stack.extend(self.stakers.iter().map(|s| s.location()));

        let mut live = HashSet::with_capacity(self.arena.len());
        while let Some(id) = stack.pop() {
            if !live.insert(id) {
                continue;
            }
            let node = self.arena.get(id).expect("live node allocated");
            if let Some(prev_id) = node.prev() {
                stack.push(prev_id);
            }
        }

        let dead: Vec<NodeId> = self.arena.ids().filter(|id| !live.contains(id)).collect();
        for id in dead {
            let node = self.arena.remove(id).expect("dead node allocated");
            let node_hash = node.hash();
            if self
                .node_from_hash
                .get(&node_hash)
                .is_some_and(|cur| *cur == id)
            {
                self.node_from_hash.remove(&node_hash);
            }
            debug!(%node_hash, "reclaimed node");
        }
    }

    /// Registers a new staker bonded to the named node.
    ///
    /// Panics if the address is already staked or the node is unknown.
    pub fn create_stake(&mut self, staker_addr: Buf20, node_hash: Buf32, creation_time: RollupTime) {
        let location = self.expect_node(node_hash, "stake location");
        self.stakers
            .add(Staker::new(staker_addr, location, creation_time));
        debug!(%staker_addr, %node_hash, "created stake");
    }

    /// Moves an existing staker to the named node.
    ///
    /// Panics if the staker or node is unknown, or if the staker is a
    /// party to an open challenge; a disputed position is frozen until
    /// the challenge resolves.
    pub fn move_stake(&mut self, staker_addr: Buf20, node_hash: Buf32) {
        let location = self.expect_node(node_hash, "stake destination");
        let staker = self
            .stakers
            .get_mut(&staker_addr)
            .unwrap_or_else(|| panic!("unknown staker {staker_addr}"));
        if let Some(contract) = staker.challenge() {
            panic!("staker {staker_addr} can't move while in challenge {contract}");
        }
        staker.set_location(location);
        self.reclaim();
        debug!(%staker_addr, %node_hash, "moved stake");
    }

    /// Withdraws a staker from the chain.
    ///
    /// Panics if the address is not staked.
    pub fn remove_stake(&mut self, staker_addr: Buf20) {
        if self.stakers.get(&staker_addr).is_none() {
            panic!("unknown staker {staker_addr}");
        }
        self.stakers.delete(&staker_addr);
        self.reclaim();
        debug!(%staker_addr, "removed stake");
    }

    /// Opens a challenge between two stakers, deployed at `contract`.
    ///
    /// Panics unless both stakers exist, are distinct, and neither is
    /// already a party to an open challenge.
    pub fn new_challenge(
        &mut self,
        contract: Buf20,
        asserter: Buf20,
        challenger: Buf20,
        kind: ChallengeKind,
    ) {
        if asserter == challenger {
            panic!("challenge {contract} names {asserter} as both parties");
        }
        if self.challenges.contains_key(&contract) {
            panic!("challenge {contract} registered twice");
        }
        for party in [asserter, challenger] {
            let staker = self
                .stakers
                .get(&party)
                .unwrap_or_else(|| panic!("unknown staker {party}"));
            if let Some(open) = staker.challenge() {
                panic!("staker {party} is already in challenge {open}");
            }
        }

        self.challenges
            .insert(contract, Challenge::new(contract, asserter, challenger, kind));
        for party in [asserter, challenger] {
            self.stakers
                .get_mut(&party)
                .expect("party checked above")
                .set_challenge(Some(contract));
        }
        debug!(%contract, %asserter, %challenger, ?kind, "opened challenge");
    }

    /// Applies the on-chain resolution of a challenge: the losing staker
    /// is withdrawn, the challenge record dropped, and the winner's
    /// challenge reference cleared.
    pub fn challenge_resolved(&mut self, contract: Buf20, winner: Buf20, loser: Buf20) {
        self.remove_stake(loser);
        self.challenges.remove(&contract);
        if let Some(winner_staker) = self.stakers.get_mut(&winner) {
            winner_staker.set_challenge(None);
        }
        debug!(%contract, %winner, %loser, "challenge resolved");
    }

    /// Hook invoked when the event driver observes a new L1 block.
    pub fn notify_new_block_number(&mut self, block_height: u64) {
        // TODO trigger a snapshot checkpoint from here once the external
        // checkpoint store settles on a cadence
        self.latest_block_height = block_height;
    }

    fn expect_node(&self, node_hash: Buf32, what: &str) -> NodeId {
        *self
            .node_from_hash
            .get(&node_hash)
            .unwrap_or_else(|| panic!("{what} {node_hash} is not a known node"))
    }

    // Read-only aggregate views consumed by the coordinator/RPC side.

    pub fn rollup_addr(&self) -> Buf20 {
        self.rollup_addr
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn pending_inbox(&self) -> &PendingInbox {
        &self.pending_inbox
    }

    pub fn pending_inbox_mut(&mut self) -> &mut PendingInbox {
        &mut self.pending_inbox
    }

    /// Latest L1 height seen through [`Self::notify_new_block_number`].
    pub fn latest_block_height(&self) -> u64 {
        self.latest_block_height
    }

    pub fn latest_confirmed_hash(&self) -> Buf32 {
        self.arena
            .get(self.latest_confirmed)
            .expect("latest confirmed allocated")
            .hash()
    }

    /// The latest confirmed node itself.
    pub fn latest_confirmed(&self) -> &Node {
        self.arena
            .get(self.latest_confirmed)
            .expect("latest confirmed allocated")
    }

    /// Looks up a node by hash. Misses are benign: pruned and reclaimed
    /// nodes simply stop resolving.
    pub fn node(&self, node_hash: &Buf32) -> Option<&Node> {
        let id = self.node_from_hash.get(node_hash)?;
        self.arena.get(*id)
    }

    /// Hash of the named node's parent, if the node is known and still
    /// has one.
    pub fn prev_hash_of(&self, node_hash: &Buf32) -> Option<Buf32> {
        let id = self.node_from_hash.get(node_hash)?;
        let prev_id = self.arena.get(*id)?.prev()?;
        Some(self.arena.get(prev_id)?.hash())
    }

    pub fn leaves(&self) -> &LeafSet {
        &self.leaves
    }

    pub fn stakers(&self) -> &StakerSet {
        &self.stakers
    }

    /// Hash of the node the given staker is bonded to.
    pub fn staker_location(&self, staker_addr: &Buf20) -> Option<Buf32> {
        let staker = self.stakers.get(staker_addr)?;
        Some(self.arena.get(staker.location())?.hash())
    }

    pub fn challenge(&self, contract: &Buf20) -> Option<&Challenge> {
        self.challenges.get(contract)
    }

    pub fn challenge_count(&self) -> usize {
        self.challenges.len()
    }

    /// Number of nodes currently indexed by hash.
    pub fn node_count(&self) -> usize {
        self.node_from_hash.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use alloy_primitives::U256;
    use canopy_primitives::test_utils::StubMachine;
    use proptest::prelude::*;

    use crate::node::node_hash;

    use super::*;

    fn test_params() -> ChainParams {
        ChainParams::new(U256::from(1000u64), RollupTime::from_blocks(100), 250_000)
    }

    fn new_chain() -> Chain {
        Chain::new(
            Buf20::from([0xcc; 20]),
            &StubMachine::from_byte(0x01),
            test_params(),
        )
    }

    fn disputable(byte: u8) -> DisputableNode {
        DisputableNode::new(
            Buf32::from([byte; 32]),
            Buf32::from([0x55; 32]),
            RollupTime::from_blocks(100),
        )
    }

    /// Asserts on `prev` and returns the four child hashes in wire order.
    fn assert_on(
        chain: &mut Chain,
        prev: Buf32,
        disp: DisputableNode,
        after_machine: &StubMachine,
    ) -> [Buf32; 4] {
        chain.create_nodes_on_assert(
            prev,
            disp,
            after_machine.hash(),
            Some(after_machine),
            Buf32::from([0x66; 32]),
        );
        let prev_node = chain.node(&prev).unwrap();
        ChildType::ALL.map(|kind| prev_node.successor_hash(kind))
    }

    #[test]
    fn test_initial_chain() {
        let chain = new_chain();
        assert_eq!(chain.leaves().len(), 1);
        assert_eq!(chain.node_count(), 1);

        let confirmed = chain.latest_confirmed();
        assert_eq!(confirmed.machine_hash(), Buf32::from([0x01; 32]));
        assert_eq!(confirmed.pending_top_hash(), hash::empty_inbox_hash());
        assert_eq!(confirmed.link_type(), ChildType::Valid);
        assert!(confirmed.disputable().is_none());
        assert!(confirmed.machine().is_some());
        assert!(chain.leaves().contains(&confirmed.hash()));
        assert_eq!(chain.prev_hash_of(&confirmed.hash()), None);
    }

    #[test]
    fn test_assert_creates_four_leaves() {
        let mut chain = new_chain();
        let root = chain.latest_confirmed_hash();
        let disp = disputable(0x7f);
        let children = assert_on(&mut chain, root, disp, &StubMachine::from_byte(0x02));

        assert_eq!(chain.leaves().len(), 4);
        assert!(!chain.leaves().contains(&root));
        assert!(chain.node(&root).unwrap().has_successors());

        let distinct: HashSet<Buf32> = children.iter().copied().collect();
        assert_eq!(distinct.len(), 4);

        let valid = chain.node(&children[0]).unwrap();
        assert_eq!(valid.link_type(), ChildType::Valid);
        assert_eq!(valid.machine_hash(), Buf32::from([0x02; 32]));
        assert_eq!(valid.pending_top_hash(), Buf32::from([0x55; 32]));
        assert_eq!(valid.disputable(), Some(&disp));
        assert!(valid.machine().is_some());

        for (kind, child_hash) in ChildType::INVALID.iter().zip(&children[1..]) {
            let child = chain.node(child_hash).unwrap();
            assert_eq!(child.link_type(), *kind);
            assert_eq!(child.machine_hash(), Buf32::from([0x01; 32]));
            assert_eq!(child.pending_top_hash(), hash::empty_inbox_hash());
            assert_eq!(child.disputable(), Some(&disp));
            assert!(chain.leaves().contains(child_hash));
            assert_eq!(chain.prev_hash_of(child_hash), Some(root));
        }
    }

    #[test]
    #[should_panic(expected = "non-leaf")]
    fn test_assert_on_non_leaf_panics() {
        let mut chain = new_chain();
        let root = chain.latest_confirmed_hash();
        assert_on(&mut chain, root, disputable(1), &StubMachine::from_byte(2));
        assert_on(&mut chain, root, disputable(3), &StubMachine::from_byte(4));
    }

    #[test]
    #[should_panic(expected = "not a known node")]
    fn test_assert_on_unknown_node_panics() {
        let mut chain = new_chain();
        assert_on(
            &mut chain,
            Buf32::from([0xee; 32]),
            disputable(1),
            &StubMachine::from_byte(2),
        );
    }

    #[test]
    fn test_valid_child_hash_recomputes_by_hand() {
        let mut chain = new_chain();
        let root = chain.latest_confirmed_hash();
        let disp = disputable(0x7f);
        let children = assert_on(&mut chain, root, disp, &StubMachine::from_byte(0x02));

        assert_eq!(
            children[0],
            node_hash(root, disp.hash(), ChildType::Valid, Buf32::from([0x02; 32]))
        );
    }

    #[test]
    fn test_confirm_severs_backlink_and_keeps_pinned_root() {
        let mut chain = new_chain();
        let root = chain.latest_confirmed_hash();
        let children = assert_on(&mut chain, root, disputable(0x7f), &StubMachine::from_byte(2));
        let valid = children[0];

        chain.confirm_node(valid);

        assert_eq!(chain.latest_confirmed_hash(), valid);
        assert_eq!(chain.prev_hash_of(&valid), None);
        let root_node = chain.node(&root).unwrap();
        assert!(root_node.successor_hash(ChildType::Valid).is_zero());
        // three invalid leaves still pin the old root
        for kind in ChildType::INVALID {
            assert!(!root_node.successor_hash(kind).is_zero());
        }
        assert_eq!(chain.node_count(), 5);
    }

    #[test]
    fn test_confirm_initial_node_is_a_noop_on_prev() {
        let mut chain = new_chain();
        let root = chain.latest_confirmed_hash();
        chain.confirm_node(root);
        assert_eq!(chain.latest_confirmed_hash(), root);
        assert_eq!(chain.node_count(), 1);
    }

    #[test]
    fn test_prune_leaf() {
        let mut chain = new_chain();
        let root = chain.latest_confirmed_hash();
        let children = assert_on(&mut chain, root, disputable(0x7f), &StubMachine::from_byte(2));

        chain.prune_node(children[1]);

        assert!(chain.node(&children[1]).is_none());
        assert!(!chain.leaves().contains(&children[1]));
        assert_eq!(chain.leaves().len(), 3);
        assert!(chain
            .node(&root)
            .unwrap()
            .successor_hash(ChildType::InvalidPending)
            .is_zero());
        assert_eq!(chain.node_count(), 4);
    }

    #[test]
    fn test_pruning_all_siblings_reclaims_the_detached_root() {
        //        root
        //      / |  |  \
        //     V  P  M   E
        // confirm V, then prune P, M, E: nothing pins root any longer
        let mut chain = new_chain();
        let root = chain.latest_confirmed_hash();
        let children = assert_on(&mut chain, root, disputable(0x7f), &StubMachine::from_byte(2));

        chain.confirm_node(children[0]);
        for invalid in &children[1..] {
            chain.prune_node(*invalid);
        }

        assert!(chain.node(&root).is_none());
        assert_eq!(chain.node_count(), 1);
        assert_eq!(chain.leaves().len(), 1);
        assert!(chain.leaves().contains(&children[0]));
    }

    #[test]
    fn test_pruned_internal_node_stays_addressable_to_descendants() {
        let mut chain = new_chain();
        let root = chain.latest_confirmed_hash();
        let children = assert_on(&mut chain, root, disputable(1), &StubMachine::from_byte(2));
        let valid = children[0];
        let grandchildren =
            assert_on(&mut chain, valid, disputable(3), &StubMachine::from_byte(4));

        chain.prune_node(valid);

        // the pruned node no longer resolves by hash...
        assert!(chain.node(&valid).is_none());
        // ...but its children are still live and still name it as parent
        for grandchild in grandchildren {
            assert!(chain.node(&grandchild).is_some());
            assert_eq!(chain.prev_hash_of(&grandchild), Some(valid));
        }
    }

    #[test]
    fn test_stake_lifecycle() {
        let mut chain = new_chain();
        let root = chain.latest_confirmed_hash();
        let children = assert_on(&mut chain, root, disputable(1), &StubMachine::from_byte(2));
        let addr = Buf20::from([0xaa; 20]);

        chain.create_stake(addr, root, RollupTime::from_blocks(1));
        assert_eq!(chain.staker_location(&addr), Some(root));
        assert_eq!(
            chain.stakers().get(&addr).unwrap().creation_time(),
            RollupTime::from_blocks(1)
        );

        chain.move_stake(addr, children[0]);
        assert_eq!(chain.staker_location(&addr), Some(children[0]));

        chain.remove_stake(addr);
        assert!(chain.stakers().get(&addr).is_none());
    }

    #[test]
    #[should_panic(expected = "inserted twice")]
    fn test_duplicate_stake_panics() {
        let mut chain = new_chain();
        let root = chain.latest_confirmed_hash();
        chain.create_stake(Buf20::from([0xaa; 20]), root, RollupTime::from_blocks(1));
        chain.create_stake(Buf20::from([0xaa; 20]), root, RollupTime::from_blocks(2));
    }

    #[test]
    #[should_panic(expected = "not a known node")]
    fn test_stake_on_unknown_node_panics() {
        let mut chain = new_chain();
        chain.create_stake(
            Buf20::from([0xaa; 20]),
            Buf32::from([0xee; 32]),
            RollupTime::from_blocks(1),
        );
    }

    fn chain_with_challenge() -> (Chain, Buf20, Buf20, Buf20) {
        let mut chain = new_chain();
        let root = chain.latest_confirmed_hash();
        let children = assert_on(&mut chain, root, disputable(1), &StubMachine::from_byte(2));
        let asserter = Buf20::from([0xaa; 20]);
        let challenger = Buf20::from([0xbb; 20]);
        let contract = Buf20::from([0xdd; 20]);
        chain.create_stake(asserter, root, RollupTime::from_blocks(1));
        chain.create_stake(challenger, children[0], RollupTime::from_blocks(2));
        chain.new_challenge(
            contract,
            asserter,
            challenger,
            ChallengeKind::InvalidExecution,
        );
        (chain, contract, asserter, challenger)
    }

    #[test]
    fn test_challenge_binds_both_stakers() {
        let (chain, contract, asserter, challenger) = chain_with_challenge();

        let challenge = chain.challenge(&contract).unwrap();
        assert_eq!(challenge.asserter(), asserter);
        assert_eq!(challenge.challenger(), challenger);
        assert_eq!(challenge.kind(), ChallengeKind::InvalidExecution);
        assert_eq!(
            chain.stakers().get(&asserter).unwrap().challenge(),
            Some(contract)
        );
        assert_eq!(
            chain.stakers().get(&challenger).unwrap().challenge(),
            Some(contract)
        );
    }

    #[test]
    fn test_challenge_resolution_removes_loser_and_clears_winner() {
        let (mut chain, contract, asserter, challenger) = chain_with_challenge();

        chain.challenge_resolved(contract, asserter, challenger);

        assert!(chain.stakers().get(&challenger).is_none());
        assert!(chain.challenge(&contract).is_none());
        assert_eq!(chain.stakers().get(&asserter).unwrap().challenge(), None);
    }

    #[test]
    #[should_panic(expected = "already in challenge")]
    fn test_staker_cannot_enter_two_challenges() {
        let (mut chain, _, asserter, _) = chain_with_challenge();
        let third = Buf20::from([0xee; 20]);
        chain.create_stake(third, chain.latest_confirmed_hash(), RollupTime::from_blocks(3));
        chain.new_challenge(
            Buf20::from([0xd2; 20]),
            asserter,
            third,
            ChallengeKind::InvalidMessages,
        );
    }

    #[test]
    #[should_panic(expected = "can't move while in challenge")]
    fn test_move_stake_is_frozen_during_challenge() {
        let (mut chain, _, asserter, _) = chain_with_challenge();
        let destination = chain.latest_confirmed_hash();
        chain.move_stake(asserter, destination);
    }

    #[test]
    fn test_notify_new_block_number_records_height() {
        let mut chain = new_chain();
        assert_eq!(chain.latest_block_height(), 0);
        chain.notify_new_block_number(1234);
        assert_eq!(chain.latest_block_height(), 1234);
    }

    // Consistency conditions that must hold between any two event-handler
    // calls, checked wholesale by the property tests below.
    fn check_invariants(chain: &Chain) {
        // every allocated arena slot is reachable from the live roots
        let mut stack: Vec<NodeId> = vec![chain.latest_confirmed];
        stack.extend(chain.leaves.ids());
        stack.extend(chain.stakers.iter().map(|s| s.location()));
        let mut live = HashSet::new();
        while let Some(id) = stack.pop() {
            if !live.insert(id) {
                continue;
            }
            if let Some(prev) = chain.arena.get(id).expect("live slot allocated").prev() {
                stack.push(prev);
            }
        }
        assert_eq!(live.len(), chain.arena.len());

        for (hash, &id) in &chain.node_from_hash {
            let node = chain.arena.get(id).expect("indexed node allocated");
            assert_eq!(node.hash(), *hash);

            if let Some(prev_id) = node.prev() {
                let prev = chain.arena.get(prev_id).expect("prev allocated");
                assert_eq!(prev.hash(), node.prev_hash());
                assert_eq!(prev.successor_hash(node.link_type()), *hash);
            }

            for kind in ChildType::ALL {
                let successor = node.successor_hash(kind);
                if successor.is_zero() {
                    continue;
                }
                let child_id = chain.node_from_hash[&successor];
                let child = chain.arena.get(child_id).expect("child allocated");
                assert_eq!(child.prev(), Some(id));
                assert_eq!(child.link_type(), kind);
            }
        }

        for leaf_hash in chain.leaves.hashes() {
            let id = chain.node_from_hash.get(leaf_hash).expect("leaf indexed");
            assert!(!chain.arena.get(*id).unwrap().has_successors());
        }

        for staker in chain.stakers.iter() {
            assert!(chain.arena.get(staker.location()).is_some());
            if let Some(contract) = staker.challenge() {
                let challenge = chain.challenges.get(&contract).expect("challenge registered");
                assert!(
                    challenge.asserter() == staker.address()
                        || challenge.challenger() == staker.address()
                );
            }
        }

        for (contract, challenge) in &chain.challenges {
            assert_eq!(challenge.contract(), *contract);
            for party in [challenge.asserter(), challenge.challenger()] {
                let staker = chain.stakers.get(&party).expect("challenge party staked");
                assert_eq!(staker.challenge(), Some(*contract));
            }
        }
    }

    fn assert_equivalent(a: &Chain, b: &Chain) {
        let sorted = |hashes: Vec<Buf32>| {
            let mut hashes = hashes;
            hashes.sort();
            hashes
        };
        assert_eq!(a.rollup_addr(), b.rollup_addr());
        assert_eq!(a.params(), b.params());
        assert_eq!(a.pending_inbox(), b.pending_inbox());
        assert_eq!(a.latest_confirmed_hash(), b.latest_confirmed_hash());
        assert_eq!(
            sorted(a.node_from_hash.keys().copied().collect()),
            sorted(b.node_from_hash.keys().copied().collect()),
        );
        for node_hash in a.node_from_hash.keys() {
            let ours = a.node(node_hash).unwrap();
            let theirs = b.node(node_hash).unwrap();
            assert_eq!(ours.prev_hash(), theirs.prev_hash());
            assert_eq!(ours.is_detached(), theirs.is_detached());
            assert_eq!(a.prev_hash_of(node_hash), b.prev_hash_of(node_hash));
            for kind in ChildType::ALL {
                assert_eq!(ours.successor_hash(kind), theirs.successor_hash(kind));
            }
        }
        assert_eq!(
            sorted(a.leaves.hashes().copied().collect()),
            sorted(b.leaves.hashes().copied().collect()),
        );
        assert_eq!(a.stakers.len(), b.stakers.len());
        for staker in a.stakers.iter() {
            let addr = staker.address();
            let twin = b.stakers.get(&addr).expect("staker survives roundtrip");
            assert_eq!(twin.creation_time(), staker.creation_time());
            assert_eq!(twin.challenge(), staker.challenge());
            assert_eq!(a.staker_location(&addr), b.staker_location(&addr));
        }
        assert_eq!(a.challenges.len(), b.challenges.len());
        for (contract, challenge) in &a.challenges {
            assert_eq!(b.challenges.get(contract), Some(challenge));
        }
    }

    /// Drives a chain through an arbitrary but protocol-valid event
    /// sequence derived from the seed triples.
    fn apply_random_events(seeds: &[(u8, u8, u8)]) -> Chain {
        let mut chain = new_chain();
        let mut next_staker: u8 = 1;
        let mut next_disp: u8 = 1;
        let mut next_contract: u8 = 200;

        for &(op, a, b) in seeds {
            match op % 6 {
                // assert on some leaf
                0 => {
                    let mut leaves: Vec<Buf32> = chain.leaves.hashes().copied().collect();
                    if leaves.is_empty() {
                        continue;
                    }
                    leaves.sort();
                    let prev = leaves[a as usize % leaves.len()];
                    let disp = DisputableNode::new(
                        Buf32::from([next_disp; 32]),
                        Buf32::from([b; 32]),
                        RollupTime::from_blocks(u64::from(next_disp)),
                    );
                    next_disp = next_disp.wrapping_add(1).max(1);
                    let machine = StubMachine::from_byte(b ^ 0x5a);
                    chain.create_nodes_on_assert(
                        prev,
                        disp,
                        machine.hash(),
                        Some(&machine),
                        Buf32::from([b; 32]),
                    );
                }
                // confirm some leaf
                1 => {
                    let mut leaves: Vec<Buf32> = chain.leaves.hashes().copied().collect();
                    if leaves.is_empty() {
                        continue;
                    }
                    leaves.sort();
                    chain.confirm_node(leaves[a as usize % leaves.len()]);
                }
                // prune some unstaked, unconfirmed leaf
                2 => {
                    let staked: HashSet<Buf32> = chain
                        .stakers
                        .iter()
                        .map(|s| chain.arena.get(s.location()).unwrap().hash())
                        .collect();
                    let confirmed = chain.latest_confirmed_hash();
                    let mut leaves: Vec<Buf32> = chain
                        .leaves
                        .hashes()
                        .copied()
                        .filter(|h| *h != confirmed && !staked.contains(h))
                        .collect();
                    if leaves.is_empty() {
                        continue;
                    }
                    leaves.sort();
                    chain.prune_node(leaves[a as usize % leaves.len()]);
                }
                // stake on some node
                3 => {
                    let mut nodes: Vec<Buf32> = chain.node_from_hash.keys().copied().collect();
                    nodes.sort();
                    let location = nodes[a as usize % nodes.len()];
                    chain.create_stake(
                        Buf20::from([next_staker; 20]),
                        location,
                        RollupTime::from_blocks(u64::from(next_staker)),
                    );
                    next_staker += 1;
                }
                // open a challenge between two free stakers
                4 => {
                    let mut free: Vec<Buf20> = chain
                        .stakers
                        .iter()
                        .filter(|s| s.challenge().is_none())
                        .map(|s| s.address())
                        .collect();
                    if free.len() < 2 {
                        continue;
                    }
                    free.sort();
                    let asserter = free[a as usize % free.len()];
                    let challenger = free[(a as usize + 1) % free.len()];
                    if asserter == challenger {
                        continue;
                    }
                    let kind = ChallengeKind::from_wire(u32::from(b) % 3).unwrap();
                    chain.new_challenge(Buf20::from([next_contract; 20]), asserter, challenger, kind);
                    next_contract = next_contract.wrapping_add(1).max(200);
                }
                // resolve some open challenge
                5 => {
                    let mut contracts: Vec<Buf20> = chain.challenges.keys().copied().collect();
                    if contracts.is_empty() {
                        continue;
                    }
                    contracts.sort();
                    let contract = contracts[a as usize % contracts.len()];
                    let challenge = chain.challenges[&contract].clone();
                    let (winner, loser) = if b % 2 == 0 {
                        (challenge.asserter(), challenge.challenger())
                    } else {
                        (challenge.challenger(), challenge.asserter())
                    };
                    chain.challenge_resolved(contract, winner, loser);
                }
                _ => unreachable!(),
            }
        }
        chain
    }

    proptest! {
        #[test]
        fn prop_event_sequences_preserve_invariants(
            seeds in proptest::collection::vec(any::<(u8, u8, u8)>(), 0..40)
        ) {
            let chain = apply_random_events(&seeds);
            check_invariants(&chain);
        }

        #[test]
        fn prop_snapshot_roundtrip(
            seeds in proptest::collection::vec(any::<(u8, u8, u8)>(), 0..40)
        ) {
            let chain = apply_random_events(&seeds);
            let snapshot = chain.marshal();
            let rebuilt = Chain::unmarshal(&snapshot).unwrap();
            check_invariants(&rebuilt);
            assert_equivalent(&chain, &rebuilt);

            let bytes = snapshot.to_bytes();
            let decoded = crate::snapshot::ChainSnapshot::from_bytes(&bytes).unwrap();
            prop_assert_eq!(decoded, snapshot);
        }
    }
}
