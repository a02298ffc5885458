//! Dispute records binding pairs of stakers to a challenge contract.

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use canopy_primitives::Buf20;
use serde::{Deserialize, Serialize};

/// What an open challenge is disputing. Wire values are fixed by the
/// on-chain contract and correspond to the invalid child kinds.
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Hash,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum ChallengeKind {
    InvalidPendingTop = 0,
    InvalidMessages = 1,
    InvalidExecution = 2,
}

impl ChallengeKind {
    pub fn from_wire(value: u32) -> Option<Self> {
        match value {
            0 => Some(ChallengeKind::InvalidPendingTop),
            1 => Some(ChallengeKind::InvalidMessages),
            2 => Some(ChallengeKind::InvalidExecution),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u32 {
        self as u32
    }
}

/// An open dispute between two stakers, identified by the address of the
/// challenge contract deployed for it.
#[derive(
    Clone, Debug, Eq, PartialEq, Arbitrary, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct Challenge {
    contract: Buf20,
    asserter: Buf20,
    challenger: Buf20,
    kind: ChallengeKind,
}

impl Challenge {
    pub fn new(contract: Buf20, asserter: Buf20, challenger: Buf20, kind: ChallengeKind) -> Self {
        Self {
            contract,
            asserter,
            challenger,
            kind,
        }
    }

    pub fn contract(&self) -> Buf20 {
        self.contract
    }

    pub fn asserter(&self) -> Buf20 {
        self.asserter
    }

    pub fn challenger(&self) -> Buf20 {
        self.challenger
    }

    pub fn kind(&self) -> ChallengeKind {
        self.kind
    }
}
