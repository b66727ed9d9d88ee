//! Bounded block-indexed diff history.

use std::collections::{HashMap, VecDeque};

/// A registry entity that can absorb partial updates.
///
/// Merging follows non-default-wins: a diff field overwrites the
/// accumulator only when it carries a real value (non-zero id, non-zero
/// address, non-null paused flag, non-empty attribute bytes). Conflicting
/// updates therefore resolve to the latest one in merge order.
pub trait Snapshot: Clone + Default {
    /// Entity id; 0 is the zero value and never a valid entity.
    fn id(&self) -> u64;

    /// Block the snapshot is valid at; 0 means unset.
    fn block_number(&self) -> u64;

    fn set_block_number(&mut self, block_number: u64);

    /// Field-wise merge of a newer partial value into `self`.
    fn merge(&mut self, diff: &Self);
}

/// What changed at a single block: a partial snapshot per touched entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockDiff<S> {
    pub block_number: u64,
    pub entries: HashMap<u64, S>,
}

impl<S: Snapshot> BlockDiff<S> {
    /// A diff carrying no changes, used to keep the block timeline dense.
    pub fn empty(block_number: u64) -> Self {
        Self { block_number, entries: HashMap::new() }
    }

    /// Merge a newer diff into this accumulator.
    pub fn merge(&mut self, diff: &BlockDiff<S>) {
        self.block_number = diff.block_number;
        for (id, partial) in &diff.entries {
            match self.entries.get_mut(id) {
                Some(entry) => entry.merge(partial),
                None => {
                    let mut entry = S::default();
                    entry.merge(partial);
                    self.entries.insert(*id, entry);
                }
            }
        }
    }
}

/// Ordered sequence of per-block diffs with capacity `epoch`.
///
/// On overflow the two oldest diffs are replaced by their merge at the
/// front, so the front always holds the accumulated prior state at the
/// oldest retained block and any block in the retained range can still be
/// reconstructed exactly.
#[derive(Debug)]
pub struct BlockHistory<S> {
    epoch: u64,
    blocks: VecDeque<BlockDiff<S>>,
}

impl<S: Snapshot> BlockHistory<S> {
    pub fn new(epoch: u64) -> Self {
        Self { epoch, blocks: VecDeque::new() }
    }

    /// Append a diff, collapsing the two oldest entries when the window
    /// overflows.
    pub fn add(&mut self, diff: BlockDiff<S>) {
        self.blocks.push_back(diff);

        if self.blocks.len() as u64 > self.epoch {
            if let (Some(oldest), Some(second)) = (self.blocks.pop_front(), self.blocks.pop_front())
            {
                let mut collapsed = oldest;
                collapsed.merge(&second);
                self.blocks.push_front(collapsed);
            }
        }
    }

    /// Accumulated state at `block_number`: the left-fold merge of every
    /// retained diff up to and including it. On equal block numbers the
    /// later-added diff wins by fold order. The front diff is the baseline
    /// and is always included, so queries below the oldest retained block
    /// clamp to it.
    pub fn at(&self, block_number: u64) -> BlockDiff<S> {
        let mut accumulator = BlockDiff::default();
        for (i, diff) in self.blocks.iter().enumerate() {
            if i > 0 && diff.block_number > block_number {
                break;
            }
            accumulator.merge(diff);
        }
        accumulator
    }

    /// Accumulated state at the newest retained block.
    pub fn latest(&self) -> BlockDiff<S> {
        self.at(u64::MAX)
    }

    /// Accumulated state of a single entity at `block_number`, or `None`
    /// when the entity is unknown there. The returned snapshot is stamped
    /// with the fold's block number.
    pub fn entry_at(&self, id: u64, block_number: u64) -> Option<S> {
        let mut accumulator = S::default();
        let mut fold_block = 0;
        for (i, diff) in self.blocks.iter().enumerate() {
            if i > 0 && diff.block_number > block_number {
                break;
            }
            fold_block = diff.block_number;
            if let Some(partial) = diff.entries.get(&id) {
                accumulator.merge(partial);
            }
        }
        if accumulator.id() == 0 {
            return None;
        }
        accumulator.set_block_number(fold_block);
        Some(accumulator)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Block number of the oldest retained diff.
    pub fn oldest_block(&self) -> Option<u64> {
        self.blocks.front().map(|d| d.block_number)
    }

    /// Block number of the newest retained diff.
    pub fn newest_block(&self) -> Option<u64> {
        self.blocks.back().map(|d| d.block_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Project;

    fn diff(block_number: u64, id: u64, uri: &str) -> BlockDiff<Project> {
        let mut d = BlockDiff::empty(block_number);
        d.entries.insert(
            id,
            Project { id, uri: uri.to_string(), ..Default::default() },
        );
        d
    }

    #[test]
    fn test_at_equals_left_fold() {
        let mut history = BlockHistory::new(10);
        history.add(diff(1, 5, "a"));
        history.add(diff(2, 5, "b"));
        history.add(diff(3, 6, "c"));

        let at2 = history.at(2);
        assert_eq!(at2.block_number, 2);
        assert_eq!(at2.entries[&5].uri, "b");
        assert!(!at2.entries.contains_key(&6));

        let at3 = history.at(3);
        assert_eq!(at3.entries[&5].uri, "b");
        assert_eq!(at3.entries[&6].uri, "c");
    }

    #[test]
    fn test_overflow_collapse_preserves_history() {
        // epoch=3: blocks 10..=14 overflow twice.
        let mut history = BlockHistory::new(3);
        let mut reference = BlockHistory::new(100);
        for (block, uri) in [(10, "a"), (11, "b"), (12, "c"), (13, "d"), (14, "e")] {
            history.add(diff(block, 5, uri));
            reference.add(diff(block, 5, uri));
        }

        assert!(history.len() <= 4);
        assert_eq!(history.oldest_block(), Some(12));

        // Anything at or after the oldest retained block is unchanged vs.
        // an uncollapsed history.
        for block in [12, 13, 14] {
            assert_eq!(history.at(block), reference.at(block));
        }
        // Queries before the retained range see the collapsed baseline.
        assert_eq!(history.at(10).entries[&5].uri, "c");
        assert_eq!(history.at(14).entries[&5].uri, "e");
    }

    #[test]
    fn test_equal_block_number_later_wins() {
        let mut history = BlockHistory::new(10);
        history.add(diff(7, 5, "first"));
        history.add(diff(7, 5, "second"));
        assert_eq!(history.at(7).entries[&5].uri, "second");
    }

    #[test]
    fn test_entry_at() {
        let mut history = BlockHistory::new(10);
        history.add(diff(1, 5, "a"));
        history.add(BlockDiff::empty(2));

        let project = history.entry_at(5, 2).unwrap();
        assert_eq!(project.uri, "a");
        assert_eq!(project.block_number, 2);
        assert!(history.entry_at(6, 2).is_none());
        // Queries below the oldest block clamp to the front baseline.
        let clamped = history.entry_at(5, 0).unwrap();
        assert_eq!(clamped.uri, "a");
        assert_eq!(clamped.block_number, 1);
    }

    #[test]
    fn test_merge_deep_copies_new_entries() {
        let mut accumulator: BlockDiff<Project> = BlockDiff::default();
        let source = diff(1, 5, "a");
        accumulator.merge(&source);

        // Mutating the accumulator must not affect the source diff.
        accumulator.entries.get_mut(&5).unwrap().uri = "changed".to_string();
        assert_eq!(source.entries[&5].uri, "a");
    }
}
