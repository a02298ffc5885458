//! Protocol parameters fixed at rollup deployment.

use alloy_primitives::U256;
use arbitrary::Arbitrary;
use borsh::{io, BorshDeserialize, BorshSerialize};
use canopy_primitives::RollupTime;
use serde::{Deserialize, Serialize};

/// Parameters of the rollup's on-chain contract that the validator must
/// mirror.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Arbitrary, Serialize, Deserialize)]
pub struct ChainParams {
    /// Bond required to place a stake, in wei.
    pub stake_requirement: U256,
    /// How long a disputable assertion stays open to challenges.
    pub grace_period: RollupTime,
    /// Cap on VM steps a single assertion may claim.
    pub max_execution_steps: u32,
}

impl ChainParams {
    pub fn new(stake_requirement: U256, grace_period: RollupTime, max_execution_steps: u32) -> Self {
        Self {
            stake_requirement,
            grace_period,
            max_execution_steps,
        }
    }
}

// `U256` marshals as a fixed 32-byte big-endian word, so the impl is
// written out instead of derived.
impl BorshSerialize for ChainParams {
    fn serialize<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.stake_requirement.to_be_bytes::<32>())?;
        BorshSerialize::serialize(&self.grace_period, writer)?;
        BorshSerialize::serialize(&self.max_execution_steps, writer)
    }
}

impl BorshDeserialize for ChainParams {
    fn deserialize_reader<R: io::Read>(reader: &mut R) -> io::Result<Self> {
        let mut word = [0u8; 32];
        reader.read_exact(&mut word)?;
        Ok(Self {
            stake_requirement: U256::from_be_bytes(word),
            grace_period: RollupTime::deserialize_reader(reader)?,
            max_execution_steps: u32::deserialize_reader(reader)?,
        })
    }
}
