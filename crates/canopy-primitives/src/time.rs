//! Protocol timestamps.

use std::fmt;

use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Opaque protocol timestamp, counted in L1 block heights.
///
/// Totally ordered; the chain core only ever stores and compares these.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Arbitrary,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct RollupTime(u64);

impl RollupTime {
    pub const fn from_blocks(blocks: u64) -> Self {
        Self(blocks)
    }

    pub const fn blocks(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RollupTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
