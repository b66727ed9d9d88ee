//! Registry getters batched through the multicall contract.
//!
//! Each read aggregates the block-number helper with the entity getters so
//! the decoded snapshot carries the block number it was observed at. A
//! read of an id past the end of the registry reverts with an invalid
//! token id, which terminates listing.

use std::sync::Arc;

use provenet_core::{Address, Hash32};

use crate::{abi, ChainClient, Result};

/// Project registry state as read from the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectState {
    pub uri: String,
    pub hash: Hash32,
    pub paused: bool,
}

/// Prover registry state as read from the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProverState {
    pub operator: Address,
    pub paused: bool,
    pub node_types: u64,
}

/// Reader for the project registry contract.
pub struct ProjectReader {
    client: Arc<ChainClient>,
    contract: Address,
    block_number_contract: Address,
    multicall: Address,
}

impl ProjectReader {
    pub fn new(
        client: Arc<ChainClient>,
        contract: Address,
        block_number_contract: Address,
        multicall: Address,
    ) -> Self {
        Self { client, contract, block_number_contract, multicall }
    }

    /// Read the current state of a project id, tagged with the effective
    /// block number. Returns `None` once the id is past the registry end.
    pub async fn read(&self, id: u64) -> Result<Option<(ProjectState, u64)>> {
        let calls = vec![
            (self.block_number_contract, abi::encode_call("blockNumber()")),
            (self.contract, abi::encode_call_u64("config(uint256)", id)),
            (self.contract, abi::encode_call_u64("isPaused(uint256)", id)),
        ];
        let raw = match self.client.call(&self.multicall, &abi::encode_aggregate(&calls)).await {
            Ok(raw) => raw,
            Err(e) if e.is_invalid_token() => return Ok(None),
            Err(e) => return Err(e),
        };
        let (_, results) = abi::decode_aggregate(&raw)?;
        let block_number = abi::decode_u64(result(&results, 0)?, 0)?;
        let config = result(&results, 1)?;
        let state = ProjectState {
            uri: abi::decode_dyn_string(config, 0)?,
            hash: abi::decode_b32(config, 1)?,
            paused: abi::decode_bool(result(&results, 2)?, 0)?,
        };
        Ok(Some((state, block_number)))
    }
}

/// Reader for the prover registry contract.
pub struct ProverReader {
    client: Arc<ChainClient>,
    contract: Address,
    block_number_contract: Address,
    multicall: Address,
}

impl ProverReader {
    pub fn new(
        client: Arc<ChainClient>,
        contract: Address,
        block_number_contract: Address,
        multicall: Address,
    ) -> Self {
        Self { client, contract, block_number_contract, multicall }
    }

    /// Read the current state of a prover id, tagged with the effective
    /// block number. Returns `None` once the id is past the registry end.
    pub async fn read(&self, id: u64) -> Result<Option<(ProverState, u64)>> {
        let calls = vec![
            (self.block_number_contract, abi::encode_call("blockNumber()")),
            (self.contract, abi::encode_call_u64("operator(uint256)", id)),
            (self.contract, abi::encode_call_u64("isPaused(uint256)", id)),
            (self.contract, abi::encode_call_u64("nodeType(uint256)", id)),
        ];
        let raw = match self.client.call(&self.multicall, &abi::encode_aggregate(&calls)).await {
            Ok(raw) => raw,
            Err(e) if e.is_invalid_token() => return Ok(None),
            Err(e) => return Err(e),
        };
        let (_, results) = abi::decode_aggregate(&raw)?;
        let block_number = abi::decode_u64(result(&results, 0)?, 0)?;
        let state = ProverState {
            operator: abi::decode_address(result(&results, 1)?, 0)?,
            paused: abi::decode_bool(result(&results, 2)?, 0)?,
            node_types: abi::decode_u64(result(&results, 3)?, 0)?,
        };
        Ok(Some((state, block_number)))
    }
}

fn result(results: &[Vec<u8>], index: usize) -> Result<&[u8]> {
    results
        .get(index)
        .map(|r| r.as_slice())
        .ok_or_else(|| crate::ChainError::Abi(format!("missing aggregate result {}", index)))
}
