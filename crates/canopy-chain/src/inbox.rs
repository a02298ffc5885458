//! Pending-inbox commitment accumulator.

use borsh::{BorshDeserialize, BorshSerialize};
use canopy_primitives::{hash, Buf32};
use serde::{Deserialize, Serialize};

/// The sequence of messages waiting to be included in the rollup,
/// tracked by its running top-hash commitment.
///
/// Delivering a message folds its hash into the top:
/// `top' = keccak(top || messageHash)`, starting from the empty-inbox
/// sentinel. The chain core never inspects message contents; the inbox
/// driver owns delivery.
#[derive(Clone, Debug, Eq, PartialEq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct PendingInbox {
    top: Buf32,
    count: u64,
}

impl PendingInbox {
    pub fn new() -> Self {
        Self {
            top: hash::empty_inbox_hash(),
            count: 0,
        }
    }

    /// Folds a delivered message's hash into the top commitment.
    pub fn deliver_message(&mut self, message_hash: Buf32) {
        self.top = hash::keccak_iter([self.top.as_slice(), message_hash.as_slice()]);
        self.count += 1;
    }

    /// The current top-hash commitment.
    pub fn top_hash(&self) -> Buf32 {
        self.top
    }

    /// Number of messages delivered so far.
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Default for PendingInbox {
    fn default() -> Self {
        Self::new()
    }
}
