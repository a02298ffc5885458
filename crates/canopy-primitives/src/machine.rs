//! Opaque handle to the deterministic VM state.

use std::fmt::Debug;

use crate::buf::Buf32;

/// Handle to a deterministic virtual machine state.
///
/// The chain core never executes the VM; it identifies states by content
/// hash and snapshots handles when a node is created. Both operations must
/// be deterministic.
pub trait Machine: Debug + Send + Sync {
    /// Content hash of this VM state.
    fn hash(&self) -> Buf32;

    /// Snapshots the state into a new owned handle.
    fn clone_handle(&self) -> Box<dyn Machine>;
}
