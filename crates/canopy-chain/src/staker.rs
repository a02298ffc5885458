//! Stakers bonded to positions on the rollup tree.

use std::collections::HashMap;

use canopy_primitives::{Buf20, RollupTime};

use crate::arena::NodeId;

/// An on-chain actor bonded to a node position.
///
/// The challenge link, when set, is the address of the challenge contract
/// the staker is a party to; the [`Chain`](crate::Chain) resolves it
/// through its challenge map on demand.
#[derive(Clone, Debug)]
pub struct Staker {
    address: Buf20,
    location: NodeId,
    creation_time: RollupTime,
    challenge: Option<Buf20>,
}

impl Staker {
    pub(crate) fn new(address: Buf20, location: NodeId, creation_time: RollupTime) -> Self {
        Self {
            address,
            location,
            creation_time,
            challenge: None,
        }
    }

    pub fn address(&self) -> Buf20 {
        self.address
    }

    pub fn creation_time(&self) -> RollupTime {
        self.creation_time
    }

    /// Address of the challenge contract this staker is disputing under,
    /// if any.
    pub fn challenge(&self) -> Option<Buf20> {
        self.challenge
    }

    pub(crate) fn location(&self) -> NodeId {
        self.location
    }

    pub(crate) fn set_location(&mut self, location: NodeId) {
        self.location = location;
    }

    pub(crate) fn set_challenge(&mut self, challenge: Option<Buf20>) {
        self.challenge = challenge;
    }
}

/// Uniqueness set of stakers keyed by address.
///
/// Inserting an existing address is a programmer error and aborts;
/// deleting an absent address is a no-op. Iteration order is unspecified.
#[derive(Debug, Default)]
pub struct StakerSet {
    idx: HashMap<Buf20, Staker>,
}

impl StakerSet {
    pub fn get(&self, address: &Buf20) -> Option<&Staker> {
        self.idx.get(address)
    }

    pub fn len(&self) -> usize {
        self.idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.idx.is_empty()
    }

    /// All stakers, in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &Staker> {
        self.idx.values()
    }

    pub(crate) fn add(&mut self, staker: Staker) {
        let address = staker.address();
        if self.idx.insert(address, staker).is_some() {
            panic!("staker {address} inserted twice");
        }
    }

    pub(crate) fn delete(&mut self, address: &Buf20) {
        self.idx.remove(address);
    }

    pub(crate) fn get_mut(&mut self, address: &Buf20) -> Option<&mut Staker> {
        self.idx.get_mut(address)
    }
}
