//! Project registry snapshot.

use std::collections::HashMap;

use provenet_core::Hash32;

use crate::Snapshot;

/// A registered workload definition.
///
/// `paused` is tri-state so that a resume can overwrite an earlier pause
/// when diffs merge; lookups read it through [`Project::is_paused`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Project {
    pub id: u64,
    /// Content address of the workload artifact
    pub uri: String,
    /// Integrity hash of the artifact
    pub hash: Hash32,
    pub paused: Option<bool>,
    pub attributes: HashMap<Hash32, Vec<u8>>,
    pub block_number: u64,
}

impl Project {
    pub fn is_paused(&self) -> bool {
        self.paused.unwrap_or(false)
    }

    pub fn attribute(&self, key: &Hash32) -> Option<&[u8]> {
        self.attributes.get(key).map(|v| v.as_slice())
    }
}

impl Snapshot for Project {
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
        if !diff.uri.is_empty() {
            self.uri = diff.uri.clone();
        }
        if diff.hash != Hash32::default() {
            self.hash = diff.hash;
        }
        if diff.block_number != 0 {
            self.block_number = diff.block_number;
        }
        if let Some(paused) = diff.paused {
            self.paused = Some(paused);
        }
        for (key, value) in &diff.attributes {
            if !value.is_empty() {
                self.attributes.insert(*key, value.clone());
            }
        }
    }
}
