//! Shared primitive types for the canopy rollup validator: fixed-width
//! buffers, protocol time, Keccak-256 packed-field hashing, and the opaque
//! VM-handle seam.

mod buf;
pub mod hash;
mod machine;
mod time;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use buf::{Buf20, Buf32};
pub use machine::Machine;
pub use time::RollupTime;
