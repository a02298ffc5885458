//! Helpers for exercising the chain core in tests.

use crate::{Buf32, Machine};

/// Machine handle with a fixed state hash.
#[derive(Clone, Debug)]
pub struct StubMachine {
    state: Buf32,
}

impl StubMachine {
    pub fn new(state: Buf32) -> Self {
        Self { state }
    }

    /// Stub whose state hash is the given byte repeated 32 times.
    pub fn from_byte(byte: u8) -> Self {
        Self::new(Buf32::from([byte; 32]))
    }
}

impl Machine for StubMachine {
    fn hash(&self) -> Buf32 {
        self.state
    }

    fn clone_handle(&self) -> Box<dyn Machine> {
        Box::new(self.clone())
    }
}
