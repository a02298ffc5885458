//! Keccak-256 hashing matching the on-chain contract's packed-field
//! convention (`keccak256(abi.encodePacked(...))`).

use alloy_primitives::U256;
use sha3::{Digest, Keccak256};

use crate::buf::Buf32;

/// Direct untagged hash of a byte slice.
pub fn keccak(buf: &[u8]) -> Buf32 {
    Buf32::from(<[u8; 32]>::from(Keccak256::digest(buf)))
}

/// Computes a Keccak-256 hash over a sequence of byte slices.
///
/// Updates the hasher incrementally for each slice, reproducing the tight
/// packing of `abi.encodePacked` without concatenating the inputs into a
/// temporary buffer.
pub fn keccak_iter<'a>(bufs: impl IntoIterator<Item = &'a [u8]>) -> Buf32 {
    let mut hasher = Keccak256::new();
    for buf in bufs {
        hasher.update(buf);
    }
    Buf32::from(<[u8; 32]>::from(hasher.finalize()))
}

/// Packs an integer field as a 256-bit big-endian word, the way Solidity
/// packs `int256`/`uint256` arguments.
pub fn uint256_word(value: u64) -> [u8; 32] {
    U256::from(value).to_be_bytes::<32>()
}

/// Commitment of the empty pending inbox, assigned to the chain's initial
/// node before any message is delivered.
pub fn empty_inbox_hash() -> Buf32 {
    keccak(&[])
}
