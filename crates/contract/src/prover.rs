//! Prover registry snapshot.

use provenet_core::Address;

use crate::Snapshot;

/// An off-chain worker registered on the prover contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prover {
    pub id: u64,
    /// Zero address means unset
    pub operator: Address,
    /// Bitmask of supported workload classes
    pub node_types: u64,
    /// Absent means inherit the previous value
    pub paused: Option<bool>,
    pub block_number: u64,
}

impl Prover {
    pub fn is_paused(&self) -> bool {
        self.paused.unwrap_or(false)
    }

    /// Whether the prover supports a workload class bit.
    pub fn supports(&self, node_type: u64) -> bool {
        self.node_types & node_type != 0
    }
}

impl Snapshot for Prover {
    fn id(&self) -> u64 {
        self.id
    }

    fn block_number(&self) -> u64 {
        self.block_number
    }

    fn set_block_number(&mut self, block_number: u64) {
        self.block_number = block_number;
    }

    fn merge(&mut self, diff: &Self) {
        if diff.id != 0 {
            self.id = diff.id;
        }
        if diff.operator != Address::default() {
            self.operator = diff.operator;
        }
        if diff.block_number != 0 {
            self.block_number = diff.block_number;
        }
        if let Some(paused) = diff.paused {
            self.paused = Some(paused);
        }
        if diff.node_types != 0 {
            self.node_types = diff.node_types;
        }
    }
}
