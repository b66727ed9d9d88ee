//! Contract log decoding.
//!
//! Logs are classified by `topics[0]` against the precomputed Keccak-256
//! hashes of the canonical event signatures, then folded into per-block
//! diffs. Unknown topics are skipped for forward compatibility; a malformed
//! known event fails the whole batch so the caller never advances a
//! partially decoded projection.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use thiserror::Error;

use provenet_chain::{abi, ChainError, Log};
use provenet_core::Hash32;

use crate::{BlockDiff, Project, Prover};

pub static ATTRIBUTE_SET_TOPIC: Lazy<Hash32> =
    Lazy::new(|| abi::event_topic("AttributeSet(uint256,bytes32,bytes)"));
pub static PROJECT_PAUSED_TOPIC: Lazy<Hash32> =
    Lazy::new(|| abi::event_topic("ProjectPaused(uint256)"));
pub static PROJECT_RESUMED_TOPIC: Lazy<Hash32> =
    Lazy::new(|| abi::event_topic("ProjectResumed(uint256)"));
pub static PROJECT_CONFIG_UPDATED_TOPIC: Lazy<Hash32> =
    Lazy::new(|| abi::event_topic("ProjectConfigUpdated(uint256,string,bytes32)"));

pub static OPERATOR_SET_TOPIC: Lazy<Hash32> =
    Lazy::new(|| abi::event_topic("OperatorSet(uint256,address)"));
pub static NODE_TYPE_UPDATED_TOPIC: Lazy<Hash32> =
    Lazy::new(|| abi::event_topic("NodeTypeUpdated(uint256,uint256)"));
pub static PROVER_PAUSED_TOPIC: Lazy<Hash32> =
    Lazy::new(|| abi::event_topic("ProverPaused(uint256)"));
pub static PROVER_RESUMED_TOPIC: Lazy<Hash32> =
    Lazy::new(|| abi::event_topic("ProverResumed(uint256)"));

/// Every topic the projection engine subscribes to.
pub static ALL_TOPICS: Lazy<Vec<Hash32>> = Lazy::new(|| {
    vec![
        *ATTRIBUTE_SET_TOPIC,
        *PROJECT_PAUSED_TOPIC,
        *PROJECT_RESUMED_TOPIC,
        *PROJECT_CONFIG_UPDATED_TOPIC,
        *OPERATOR_SET_TOPIC,
        *NODE_TYPE_UPDATED_TOPIC,
        *PROVER_PAUSED_TOPIC,
        *PROVER_RESUMED_TOPIC,
    ]
});

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("log is missing the indexed entity id topic")]
    MissingIdTopic,

    #[error("bad event payload: {0}")]
    Payload(#[from] ChainError),
}

/// Typed project registry event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectEvent {
    AttributeSet { id: u64, key: Hash32, value: Vec<u8> },
    Paused { id: u64 },
    Resumed { id: u64 },
    ConfigUpdated { id: u64, uri: String, hash: Hash32 },
}

/// Typed prover registry event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProverEvent {
    OperatorSet { id: u64, operator: provenet_core::Address },
    NodeTypeUpdated { id: u64, node_types: u64 },
    Paused { id: u64 },
    Resumed { id: u64 },
}

fn indexed_id(log: &Log) -> Result<u64, DecodeError> {
    let topic = log.topics.get(1).ok_or(DecodeError::MissingIdTopic)?;
    Ok(abi::decode_u64(topic, 0)?)
}

/// Decode a log into a project event, or `None` when the topic does not
/// belong to the project registry.
pub fn decode_project_event(log: &Log) -> Result<Option<ProjectEvent>, DecodeError> {
    let Some(topic) = log.topics.first() else {
        return Ok(None);
    };
    let event = if topic == &*ATTRIBUTE_SET_TOPIC {
        ProjectEvent::AttributeSet {
            id: indexed_id(log)?,
            key: abi::decode_b32(&log.data, 0)?,
            value: abi::decode_dyn_bytes(&log.data, 1)?,
        }
    } else if topic == &*PROJECT_PAUSED_TOPIC {
        ProjectEvent::Paused { id: indexed_id(log)? }
    } else if topic == &*PROJECT_RESUMED_TOPIC {
        ProjectEvent::Resumed { id: indexed_id(log)? }
    } else if topic == &*PROJECT_CONFIG_UPDATED_TOPIC {
        ProjectEvent::ConfigUpdated {
            id: indexed_id(log)?,
            uri: abi::decode_dyn_string(&log.data, 0)?,
            hash: abi::decode_b32(&log.data, 1)?,
        }
    } else {
        return Ok(None);
    };
    Ok(Some(event))
}

/// Decode a log into a prover event, or `None` when the topic does not
/// belong to the prover registry.
pub fn decode_prover_event(log: &Log) -> Result<Option<ProverEvent>, DecodeError> {
    let Some(topic) = log.topics.first() else {
        return Ok(None);
    };
    let event = if topic == &*OPERATOR_SET_TOPIC {
        ProverEvent::OperatorSet {
            id: indexed_id(log)?,
            operator: abi::decode_address(&log.data, 0)?,
        }
    } else if topic == &*NODE_TYPE_UPDATED_TOPIC {
        ProverEvent::NodeTypeUpdated {
            id: indexed_id(log)?,
            node_types: abi::decode_u64(&log.data, 0)?,
        }
    } else if topic == &*PROVER_PAUSED_TOPIC {
        ProverEvent::Paused { id: indexed_id(log)? }
    } else if topic == &*PROVER_RESUMED_TOPIC {
        ProverEvent::Resumed { id: indexed_id(log)? }
    } else {
        return Ok(None);
    };
    Ok(Some(event))
}

fn sorted<'a>(logs: &'a [Log]) -> Vec<&'a Log> {
    let mut ordered: Vec<&Log> = logs.iter().collect();
    ordered.sort_by_key(|log| (log.block_number, log.tx_index));
    ordered
}

/// Fold project logs into per-block diffs, ordered by block number.
/// Intra-block ordering follows the transaction index, so a set-then-pause
/// in a single block resolves deterministically.
pub fn fold_project_logs(logs: &[Log]) -> Result<Vec<BlockDiff<Project>>, DecodeError> {
    let mut diffs: BTreeMap<u64, BlockDiff<Project>> = BTreeMap::new();
    for log in sorted(logs) {
        let Some(event) = decode_project_event(log)? else {
            continue;
        };
        let diff = diffs
            .entry(log.block_number)
            .or_insert_with(|| BlockDiff::empty(log.block_number));
        apply_project_event(diff, event);
    }
    Ok(diffs.into_values().collect())
}

/// Fold prover logs into per-block diffs, ordered by block number.
pub fn fold_prover_logs(logs: &[Log]) -> Result<Vec<BlockDiff<Prover>>, DecodeError> {
    let mut diffs: BTreeMap<u64, BlockDiff<Prover>> = BTreeMap::new();
    for log in sorted(logs) {
        let Some(event) = decode_prover_event(log)? else {
            continue;
        };
        let diff = diffs
            .entry(log.block_number)
            .or_insert_with(|| BlockDiff::empty(log.block_number));
        apply_prover_event(diff, event);
    }
    Ok(diffs.into_values().collect())
}

fn apply_project_event(diff: &mut BlockDiff<Project>, event: ProjectEvent) {
    let id = match &event {
        ProjectEvent::AttributeSet { id, .. }
        | ProjectEvent::Paused { id }
        | ProjectEvent::Resumed { id }
        | ProjectEvent::ConfigUpdated { id, .. } => *id,
    };
    let entry = diff
        .entries
        .entry(id)
        .or_insert_with(|| Project { id, ..Default::default() });
    match event {
        ProjectEvent::AttributeSet { key, value, .. } => {
            entry.attributes.insert(key, value);
        }
        ProjectEvent::Paused { .. } => entry.paused = Some(true),
        ProjectEvent::Resumed { .. } => entry.paused = Some(false),
        ProjectEvent::ConfigUpdated { uri, hash, .. } => {
            entry.uri = uri;
            entry.hash = hash;
        }
    }
}

fn apply_prover_event(diff: &mut BlockDiff<Prover>, event: ProverEvent) {
    let id = match &event {
        ProverEvent::OperatorSet { id, .. }
        | ProverEvent::NodeTypeUpdated { id, .. }
        | ProverEvent::Paused { id }
        | ProverEvent::Resumed { id } => *id,
    };
    let entry = diff
        .entries
        .entry(id)
        .or_insert_with(|| Prover { id, ..Default::default() });
    match event {
        ProverEvent::OperatorSet { operator, .. } => entry.operator = operator,
        ProverEvent::NodeTypeUpdated { node_types, .. } => entry.node_types = node_types,
        ProverEvent::Paused { .. } => entry.paused = Some(true),
        ProverEvent::Resumed { .. } => entry.paused = Some(false),
    }
}
