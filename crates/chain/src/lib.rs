//! ProveNet Chain
//!
//! JSON-RPC plumbing for the contract projection engine.
//!
//! ## Components
//!
//! - **ChainClient**: `eth_blockNumber`, `eth_getLogs`, `eth_call` over HTTP
//! - **abi**: word-level codec for the handful of getters and event payloads
//!   the coordinator decodes (the full ABI machinery lives upstream)
//! - **ProjectReader / ProverReader**: registry getters batched through the
//!   multicall contract so each snapshot carries its effective block number

pub mod abi;
mod client;
mod registry;
mod types;

pub use client::ChainClient;
pub use registry::{ProjectReader, ProjectState, ProverReader, ProverState};
pub use types::{format_address, format_quantity, parse_address, Log, LogFilter};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),

    #[error("ABI decode error: {0}")]
    Abi(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl ChainError {
    /// The node reported that the queried range starts past its tip.
    /// The watch loop backs off silently on this.
    pub fn is_ahead_of_tip(&self) -> bool {
        matches!(self, Self::Rpc { message, .. } if message.contains("start block > tip height"))
    }

    /// The registry reverted with an invalid token id: the probed id is past
    /// the end of the registry, which terminates listing.
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, Self::Rpc { message, .. } if message.contains("invalid token ID"))
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
